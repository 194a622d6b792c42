use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::RawPathParamsRejection, FromRequest, FromRequestParts, Query, RawPathParams, Request},
    http::{HeaderMap, Method, Uri},
};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::query::Criteria;
use crate::service::CrudService;

/// Everything a domain logic function or response hook may inspect about
/// the inbound request. The body is parsed once as JSON (`null` when empty).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub body: Value,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            body: Value::Null,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Object-valued body field; absent or `null` yields `None`, any other
    /// non-object value is malformed input.
    pub fn body_object(&self, name: &str) -> Result<Option<&Map<String, Value>>, ApiError> {
        match self.body_field(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(ApiError::malformed_input(format!("'{}' must be an object", name))),
        }
    }

    /// Caller-supplied query terms: URL query parameters (as strings)
    /// overlaid with an optional `query` object in the body.
    pub fn query_terms(&self) -> Result<Criteria, ApiError> {
        let mut terms: Criteria = self
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if let Some(body_query) = self.body_object("query")? {
            terms.extend(body_query.clone());
        }
        Ok(terms)
    }
}

#[async_trait]
impl FromRequest<Arc<CrudService>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<CrudService>) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let path_params = match RawPathParams::from_request_parts(&mut parts, state).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            // Routes without captures carry no params at all
            Err(RawPathParamsRejection::MissingPathParams(_)) => HashMap::new(),
            Err(e) => return Err(ApiError::malformed_input(e.to_string())),
        };

        let Query(query_params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::malformed_input(e.to_string()))?;

        let bytes = axum::body::to_bytes(body, state.config().max_body_bytes)
            .await
            .map_err(|e| ApiError::malformed_input(format!("Unreadable request body: {}", e)))?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| ApiError::malformed_input(format!("Invalid JSON body: {}", e)))?
        };

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            path_params,
            query_params,
            body,
        })
    }
}
