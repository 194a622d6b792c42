use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use super::context::RequestContext;

/// Caller-supplied reply builder. It receives the raw operation result and
/// owns the single reply for the request.
pub type ResponseHook = Box<dyn FnOnce(OperationResult, &RequestContext) -> Response + Send>;

/// Raw outcome of a dispatcher operation, before any reply is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    /// List and paginate: the page of documents plus the matching total.
    Listing { data: Vec<Value>, count: u64 },
    /// Create and update; `None` when an update matched nothing.
    Entity(Option<Value>),
    /// Search results.
    Entities(Vec<Value>),
    Deleted { deleted: u64 },
}

impl OperationResult {
    pub fn to_value(&self) -> Value {
        match self {
            OperationResult::Listing { data, count } => json!({ "data": data, "count": count }),
            OperationResult::Entity(entity) => entity.clone().unwrap_or(Value::Null),
            OperationResult::Entities(docs) => Value::Array(docs.clone()),
            OperationResult::Deleted { deleted } => json!({ "deleted": deleted }),
        }
    }
}

/// Strategy that writes the reply. Consumed on use, so a request gets
/// exactly one reply from exactly one writer.
pub enum Responder {
    Default,
    Custom(ResponseHook),
}

impl Responder {
    pub fn respond(self, result: OperationResult, ctx: &RequestContext) -> Response {
        match self {
            Responder::Default => default_reply(result),
            Responder::Custom(hook) => hook(result, ctx),
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Responder::Default => f.write_str("Responder::Default"),
            Responder::Custom(_) => f.write_str("Responder::Custom(<hook>)"),
        }
    }
}

/// Standard envelopes: `{data, count}` for listings, the raw entity (or
/// `null`) for create/update, the raw array for search, an empty 200 for
/// delete.
fn default_reply(result: OperationResult) -> Response {
    match result {
        OperationResult::Deleted { .. } => StatusCode::OK.into_response(),
        other => (StatusCode::OK, Json(other)).into_response(),
    }
}
