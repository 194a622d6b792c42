//! The permission-gated CRUD dispatcher.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    response::Response,
    routing::{delete, get, post},
    Router,
};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::decision::{Action, CrudDomainLogic, Decision};
use crate::error::ApiError;
use crate::handlers::crud;
use crate::middleware::{OperationResult, RequestContext};
use crate::query::{merge_scoped_query, parse as parse_query, Criteria, SortOrder};
use crate::storage::{PageRequest, StorageHandle, ID_FIELD};

/// Binds one storage handle and its domain logic to the six CRUD routes.
/// Immutable once built; every request is handled independently.
pub struct CrudService {
    storage: Arc<dyn StorageHandle>,
    logic: CrudDomainLogic,
    config: DispatchConfig,
}

impl CrudService {
    pub fn new(storage: Arc<dyn StorageHandle>, logic: CrudDomainLogic) -> Self {
        Self {
            storage,
            logic,
            config: crate::config::config().dispatch.clone(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.storage.model_name()
    }

    /// Routes relative to the caller's mount point:
    ///
    /// - `GET /` list
    /// - `GET /paginate/:page/:limit` paginate
    /// - `POST /create` create
    /// - `PUT /` update
    /// - `DELETE /:id` delete
    /// - `POST /search` search
    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(crud::list).put(crud::update))
            .route("/paginate/:page/:limit", get(crud::paginate))
            .route("/create", post(crud::create))
            .route("/search", post(crud::search))
            .route("/:id", delete(crud::remove))
            .with_state(Arc::new(self))
    }

    pub async fn list(&self, ctx: RequestContext) -> Result<Response, ApiError> {
        let mut decision = self.authorize(Action::Read, &ctx).await?;
        let query = scoped_query(ctx.query_terms()?, &decision)?;
        let options = decision.read_options(Some(SortOrder::newest_first()));

        let data = self.storage.find(&query, &options).await?;
        let count = data.len() as u64;
        Ok(decision
            .take_responder()
            .respond(OperationResult::Listing { data, count }, &ctx))
    }

    pub async fn paginate(&self, ctx: RequestContext) -> Result<Response, ApiError> {
        let mut decision = self.authorize(Action::Read, &ctx).await?;
        let page = self.page_request(&ctx)?;
        let query = scoped_query(ctx.query_terms()?, &decision)?;
        let options = decision.read_options(Some(SortOrder::newest_first()));

        // Total is counted separately so it does not depend on the slice
        let count = self.storage.count_documents(&query).await?;
        let data = self.storage.paginate(&query, page, &options).await?;
        Ok(decision
            .take_responder()
            .respond(OperationResult::Listing { data, count }, &ctx))
    }

    pub async fn create(&self, ctx: RequestContext) -> Result<Response, ApiError> {
        let mut decision = self.authorize(Action::Create, &ctx).await?;
        let model = model_payload(&ctx)?;
        self.validate(Action::Create, &model)?;

        let created = self.storage.create(model).await?;
        Ok(decision
            .take_responder()
            .respond(OperationResult::Entity(Some(created)), &ctx))
    }

    pub async fn update(&self, ctx: RequestContext) -> Result<Response, ApiError> {
        let mut decision = self.authorize(Action::Update, &ctx).await?;
        let model = model_payload(&ctx)?;
        self.validate(Action::Update, &model)?;

        // Only a literal identifier; an operator object would widen the selector
        let id = model
            .get(ID_FIELD)
            .filter(|id| id.is_string() || id.is_number())
            .cloned()
            .ok_or_else(|| ApiError::malformed_input(format!("model.{} must be a string or number", ID_FIELD)))?;
        let selector = scoped_query(id_selector(id), &decision)?;

        let updated = self.storage.find_one_and_update(&selector, model).await?;
        Ok(decision
            .take_responder()
            .respond(OperationResult::Entity(updated), &ctx))
    }

    pub async fn remove(&self, ctx: RequestContext) -> Result<Response, ApiError> {
        let mut decision = self.authorize(Action::Del, &ctx).await?;
        let id = ctx
            .path_param("id")
            .ok_or_else(|| ApiError::malformed_input("missing identifier"))?;
        let selector = scoped_query(id_selector(Value::String(id.to_string())), &decision)?;

        // Zero matches is still a successful delete
        let deleted = self.storage.delete_one(&selector).await?;
        Ok(decision
            .take_responder()
            .respond(OperationResult::Deleted { deleted }, &ctx))
    }

    pub async fn search(&self, ctx: RequestContext) -> Result<Response, ApiError> {
        let mut decision = self.authorize(Action::Search, &ctx).await?;
        let request_query = ctx.body_object("query")?.cloned().unwrap_or_default();
        let query = scoped_query(request_query, &decision)?;
        let options = decision.read_options(None);

        let results = self.storage.find(&query, &options).await?;
        Ok(decision
            .take_responder()
            .respond(OperationResult::Entities(results), &ctx))
    }

    /// Resolve the decision for `action`. Storage is never touched before
    /// this returns; a failing or panicking provider counts as a denial.
    async fn authorize(&self, action: Action, ctx: &RequestContext) -> Result<Decision, ApiError> {
        let logic = self.logic.for_action(action);
        let decision = match AssertUnwindSafe(logic.decide(ctx)).catch_unwind().await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!("Domain logic for {} {} failed, denying: {:#}", self.model_name(), action, e);
                Decision::deny()
            }
            Err(_) => {
                warn!("Domain logic for {} {} panicked, denying", self.model_name(), action);
                Decision::deny()
            }
        };

        if !decision.is_permitted {
            debug!("Denied {} on {} ({} {})", action, self.model_name(), ctx.method, ctx.uri);
            return Err(ApiError::not_authorized(action, self.model_name()));
        }
        Ok(decision)
    }

    fn validate(&self, action: Action, model: &Value) -> Result<(), ApiError> {
        self.storage.validate(model).map_err(|e| {
            debug!("Rejected {} on {}: {}", action, self.model_name(), e);
            ApiError::from(e)
        })
    }

    fn page_request(&self, ctx: &RequestContext) -> Result<PageRequest, ApiError> {
        let page = parse_positive(ctx.path_param("page"), "page")?;
        let limit = parse_positive(ctx.path_param("limit"), "limit")?;
        Ok(PageRequest {
            page,
            limit: limit.min(self.config.max_page_limit.max(1)),
        })
    }
}

fn model_payload(ctx: &RequestContext) -> Result<Value, ApiError> {
    ctx.body_object("model")?
        .map(|model| Value::Object(model.clone()))
        .ok_or_else(|| ApiError::malformed_input("body must contain a 'model' object"))
}

/// Merge caller terms under the decision's criteria and check the result
/// parses, so a bad operator is rejected before storage sees it.
fn scoped_query(request: Criteria, decision: &Decision) -> Result<Criteria, ApiError> {
    let query = merge_scoped_query(request, decision.criteria.as_ref());
    parse_query(&query).map_err(|e| ApiError::malformed_input(format!("invalid query: {}", e)))?;
    Ok(query)
}

fn id_selector(id: Value) -> Criteria {
    let mut selector = Criteria::new();
    selector.insert(ID_FIELD.to_string(), id);
    selector
}

fn parse_positive(raw: Option<&str>, name: &str) -> Result<u32, ApiError> {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::malformed_input(format!("{} must be a positive integer", name)))
}
