//! Storage Handle interface consumed by the dispatcher, plus the two
//! document-store backends that implement it.

pub mod memory;
pub mod postgres;
pub mod relations;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::{Criteria, QueryError, SortOrder};

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Identifier field of every stored document.
pub const ID_FIELD: &str = "_id";
/// Creation timestamp (RFC 3339) assigned by the store on insert.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Errors raised by a storage backend. All of them surface to clients as the
/// generic storage failure class.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Duplicate key: a document with _id '{0}' already exists")]
    DuplicateId(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Rejection produced by an entity validator.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Entity validator attached to a store.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), ValidationError> + Send + Sync>;

/// Read-path options: ordering, relation expansion and field exclusion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    pub sort: Option<SortOrder>,
    pub populate: Vec<String>,
    pub exclude: Vec<String>,
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Persistence operations over one named entity collection.
///
/// Documents are JSON objects carrying an `_id`; their shape is otherwise
/// owned by the caller.
#[async_trait]
pub trait StorageHandle: Send + Sync {
    /// Entity name used in client-facing messages.
    fn model_name(&self) -> &str;

    async fn find(&self, query: &Criteria, options: &ReadOptions) -> Result<Vec<Value>, StorageError>;

    async fn count_documents(&self, query: &Criteria) -> Result<u64, StorageError>;

    /// One page of matching documents. The total is left to
    /// `count_documents` so callers count exactly once.
    async fn paginate(
        &self,
        query: &Criteria,
        page: PageRequest,
        options: &ReadOptions,
    ) -> Result<Vec<Value>, StorageError>;

    /// Insert a new document, returning it with server-assigned fields.
    async fn create(&self, entity: Value) -> Result<Value, StorageError>;

    /// Patch the first document matching `selector` and return its new state.
    async fn find_one_and_update(&self, selector: &Criteria, patch: Value) -> Result<Option<Value>, StorageError>;

    /// Delete at most one document; returns the number removed.
    async fn delete_one(&self, selector: &Criteria) -> Result<u64, StorageError>;

    /// Structural validation run before create and update. Stores without a
    /// validator accept everything.
    fn validate(&self, _entity: &Value) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Related collections keyed by the referencing field name.
pub type Relations = HashMap<String, Arc<dyn StorageHandle>>;

/// Normalise a new entity: must be an object; keeps a caller `_id` when it is
/// a string, otherwise assigns one; always stamps `createdAt`.
pub fn prepare_new(entity: Value) -> Result<Map<String, Value>, StorageError> {
    let mut doc = match entity {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::InvalidDocument(format!(
                "expected object, got {}",
                json_kind(&other)
            )))
        }
    };

    if !matches!(doc.get(ID_FIELD), Some(Value::String(_))) {
        doc.insert(ID_FIELD.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    doc.insert(
        CREATED_AT_FIELD.to_string(),
        Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
    );
    Ok(doc)
}

/// Strip the fields a patch is never allowed to rewrite.
pub fn sanitize_patch(patch: Value) -> Result<Map<String, Value>, StorageError> {
    match patch {
        Value::Object(mut map) => {
            map.remove(ID_FIELD);
            map.remove(CREATED_AT_FIELD);
            Ok(map)
        }
        other => Err(StorageError::InvalidDocument(format!(
            "expected object patch, got {}",
            json_kind(&other)
        ))),
    }
}

/// Remove excluded top-level fields from read results.
pub fn exclude_fields(docs: &mut [Value], exclude: &[String]) {
    if exclude.is_empty() {
        return;
    }
    for doc in docs.iter_mut() {
        if let Value::Object(map) = doc {
            for field in exclude {
                map.remove(field);
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
