use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use tracing::info;

use super::relations::expand_relations;
use super::{
    exclude_fields, prepare_new, sanitize_patch, PageRequest, ReadOptions, Relations, StorageError,
    StorageHandle, ValidationError, Validator, CREATED_AT_FIELD, ID_FIELD,
};
use crate::config::DatabaseConfig;
use crate::query::{order_by, Criteria, FilterWhere, SqlFragment, SqlParam};

const DOC_COLUMN: &str = "doc";
const UNIQUE_VIOLATION: &str = "23505";

/// Open a connection pool for the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StorageError> {
    let database_url = config
        .url
        .as_deref()
        .ok_or_else(|| StorageError::Connection("DATABASE_URL is not configured".to_string()))?;
    url::Url::parse(database_url).map_err(|_| StorageError::Connection("Invalid database URL".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(database_url)
        .await?;

    info!("Created database pool (max {} connections)", config.max_connections);
    Ok(pool)
}

/// Document collection stored as `jsonb` rows in a Postgres table.
pub struct PgDocumentStore {
    model_name: String,
    table: String,
    pool: PgPool,
    relations: Relations,
    validator: Option<Validator>,
}

impl PgDocumentStore {
    /// The table name is derived from the model name and must be a plain
    /// identifier.
    pub fn new(model_name: impl Into<String>, pool: PgPool) -> Result<Self, StorageError> {
        let model_name = model_name.into();
        let table = format!("{}s", model_name.to_lowercase());
        if !Self::is_valid_table_name(&table) {
            return Err(StorageError::InvalidCollection(model_name));
        }
        Ok(Self {
            model_name,
            table,
            pool,
            relations: Relations::new(),
            validator: None,
        })
    }

    pub fn with_relation(mut self, field: impl Into<String>, related: Arc<dyn StorageHandle>) -> Self {
        self.relations.insert(field.into(), related);
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Create the backing table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (\
                \"id\" TEXT PRIMARY KEY, \
                \"{c}\" JSONB NOT NULL, \
                \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now())",
            t = self.table,
            c = DOC_COLUMN
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn is_valid_table_name(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
            && name.len() <= 63
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    fn where_clause(&self, query: &Criteria, starting_param_index: usize) -> Result<SqlFragment, StorageError> {
        Ok(FilterWhere::generate(DOC_COLUMN, query, starting_param_index)?)
    }

    async fn select(
        &self,
        query: &Criteria,
        options: &ReadOptions,
        page: Option<PageRequest>,
    ) -> Result<Vec<Value>, StorageError> {
        let filter = self.where_clause(query, 0)?;
        let mut sql = format!("SELECT \"{}\" FROM \"{}\" WHERE {}", DOC_COLUMN, self.table, filter.clause);
        let mut params = filter.params;

        if let Some(sort) = &options.sort {
            let order = order_by(DOC_COLUMN, sort, params.len());
            sql.push(' ');
            sql.push_str(&order.clause);
            params.extend(order.params);
        }
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT ${} OFFSET ${}", params.len() + 1, params.len() + 2));
            params.push(SqlParam::Int(i64::from(page.limit)));
            params.push(SqlParam::Int(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
        }

        let rows = bind_params(sqlx::query(&sql), &params).fetch_all(&self.pool).await?;
        let mut docs = rows.iter().map(read_doc).collect::<Result<Vec<_>, _>>()?;

        expand_relations(&mut docs, &options.populate, &self.relations).await?;
        exclude_fields(&mut docs, &options.exclude);
        Ok(docs)
    }
}

fn read_doc(row: &PgRow) -> Result<Value, StorageError> {
    let Json(doc) = row.try_get::<Json<Value>, _>(DOC_COLUMN)?;
    Ok(doc)
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Path(path) => query.bind(path.clone()),
            SqlParam::Json(value) => query.bind(Json(value.clone())),
            SqlParam::Int(n) => query.bind(*n),
        };
    }
    query
}

#[async_trait]
impl StorageHandle for PgDocumentStore {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn find(&self, query: &Criteria, options: &ReadOptions) -> Result<Vec<Value>, StorageError> {
        self.select(query, options, None).await
    }

    async fn count_documents(&self, query: &Criteria) -> Result<u64, StorageError> {
        let filter = self.where_clause(query, 0)?;
        let sql = format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", self.table, filter.clause);
        let row = bind_params(sqlx::query(&sql), &filter.params).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn paginate(
        &self,
        query: &Criteria,
        page: PageRequest,
        options: &ReadOptions,
    ) -> Result<Vec<Value>, StorageError> {
        self.select(query, options, Some(page)).await
    }

    async fn create(&self, entity: Value) -> Result<Value, StorageError> {
        let doc = prepare_new(entity)?;
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StorageError::InvalidDocument("missing _id".to_string()))?;
        let created_at = doc
            .get(CREATED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now);

        let sql = format!(
            "INSERT INTO \"{}\" (\"id\", \"{c}\", \"created_at\") VALUES ($1, $2, $3) RETURNING \"{c}\"",
            self.table,
            c = DOC_COLUMN
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(Json(Value::Object(doc)))
            .bind(created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e.as_database_error().and_then(|db| db.code()) {
                Some(code) if code == UNIQUE_VIOLATION => StorageError::DuplicateId(id.clone()),
                _ => StorageError::from(e),
            })?;
        read_doc(&row)
    }

    async fn find_one_and_update(&self, selector: &Criteria, patch: Value) -> Result<Option<Value>, StorageError> {
        let patch = sanitize_patch(patch)?;
        let filter = self.where_clause(selector, 1)?;
        // Shallow merge of the patch into the first matching row, atomically
        let sql = format!(
            "UPDATE \"{t}\" SET \"{c}\" = \"{c}\" || $1::jsonb \
             WHERE \"id\" = (SELECT \"id\" FROM \"{t}\" WHERE {w} LIMIT 1 FOR UPDATE) \
             RETURNING \"{c}\"",
            t = self.table,
            c = DOC_COLUMN,
            w = filter.clause
        );
        let query = sqlx::query(&sql).bind(Json(Value::Object(patch)));
        let row = bind_params(query, &filter.params).fetch_optional(&self.pool).await?;
        row.as_ref().map(read_doc).transpose()
    }

    async fn delete_one(&self, selector: &Criteria) -> Result<u64, StorageError> {
        let filter = self.where_clause(selector, 0)?;
        let sql = format!(
            "DELETE FROM \"{t}\" WHERE \"id\" = (SELECT \"id\" FROM \"{t}\" WHERE {w} LIMIT 1)",
            t = self.table,
            w = filter.clause
        );
        let result = bind_params(sqlx::query(&sql), &filter.params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    fn validate(&self, entity: &Value) -> Result<(), ValidationError> {
        match &self.validator {
            Some(validator) => validator(entity),
            None => Ok(()),
        }
    }
}
