use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{ExistingPermissions, PermissionStore};
use crate::storage::StorageError;

/// Permission records in a `permissions (key, users jsonb)` table.
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS \"permissions\" (\
                \"key\" TEXT PRIMARY KEY, \
                \"users\" JSONB NOT NULL DEFAULT '[]'::jsonb)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn ensure(&self, key: &str, existing: ExistingPermissions) -> Result<(), StorageError> {
        let sql = match existing {
            ExistingPermissions::Preserve => {
                "INSERT INTO \"permissions\" (\"key\", \"users\") VALUES ($1, '[]'::jsonb) \
                 ON CONFLICT (\"key\") DO NOTHING"
            }
            ExistingPermissions::Reset => {
                "INSERT INTO \"permissions\" (\"key\", \"users\") VALUES ($1, '[]'::jsonb) \
                 ON CONFLICT (\"key\") DO UPDATE SET \"users\" = '[]'::jsonb"
            }
        };
        sqlx::query(sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn grant(&self, key: &str, user: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO \"permissions\" (\"key\", \"users\") VALUES ($1, jsonb_build_array($2::text)) \
             ON CONFLICT (\"key\") DO UPDATE SET \"users\" = CASE \
                WHEN \"permissions\".\"users\" @> jsonb_build_array($2::text) THEN \"permissions\".\"users\" \
                ELSE \"permissions\".\"users\" || jsonb_build_array($2::text) END",
        )
        .bind(key)
        .bind(user)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn users(&self, key: &str) -> Result<Option<Vec<String>>, StorageError> {
        let row = sqlx::query("SELECT \"users\" FROM \"permissions\" WHERE \"key\" = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let Json(users) = row.try_get::<Json<Value>, _>("users")?;
        Ok(Some(
            users
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
        ))
    }
}
