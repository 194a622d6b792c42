use std::sync::Arc;

use axum::{extract::State, response::Response};

use crate::error::ApiError;
use crate::middleware::RequestContext;
use crate::service::CrudService;

/// GET / - list every permitted document, newest first
pub async fn list(State(service): State<Arc<CrudService>>, ctx: RequestContext) -> Result<Response, ApiError> {
    service.list(ctx).await
}

/// GET /paginate/:page/:limit - one page plus the total matching count
pub async fn paginate(State(service): State<Arc<CrudService>>, ctx: RequestContext) -> Result<Response, ApiError> {
    service.paginate(ctx).await
}

/// POST /create - validate and insert `body.model`
pub async fn create(State(service): State<Arc<CrudService>>, ctx: RequestContext) -> Result<Response, ApiError> {
    service.create(ctx).await
}

/// PUT / - validate and patch the document identified by `body.model._id`
pub async fn update(State(service): State<Arc<CrudService>>, ctx: RequestContext) -> Result<Response, ApiError> {
    service.update(ctx).await
}

/// DELETE /:id - delete at most one document
pub async fn remove(State(service): State<Arc<CrudService>>, ctx: RequestContext) -> Result<Response, ApiError> {
    service.remove(ctx).await
}

/// POST /search - documents matching `body.query`
pub async fn search(State(service): State<Arc<CrudService>>, ctx: RequestContext) -> Result<Response, ApiError> {
    service.search(ctx).await
}
