//! Authorization contract between the dispatcher and domain logic.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;

use crate::middleware::context::RequestContext;
use crate::middleware::response::{OperationResult, Responder, ResponseHook};
use crate::query::{Criteria, SortOrder};
use crate::storage::ReadOptions;

/// The fixed set of dispatcher actions, each bound to one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Del,
    Search,
}

impl Action {
    pub const ALL: [Action; 5] = [Action::Create, Action::Read, Action::Update, Action::Del, Action::Search];

    /// Stable key used for permission records and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Del => "del",
            Action::Search => "search",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request answer of a domain logic function.
///
/// `is_permitted` gates the request. `criteria` is ANDed into every storage
/// selector and always wins over caller input. `on_response` replaces the
/// default reply. `populate` and `exclude` only affect read paths.
#[derive(Default)]
pub struct Decision {
    pub is_permitted: bool,
    pub criteria: Option<Criteria>,
    pub on_response: Option<ResponseHook>,
    pub populate: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl Decision {
    pub fn permit() -> Self {
        Self { is_permitted: true, ..Default::default() }
    }

    pub fn deny() -> Self {
        Self::default()
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_populate<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.populate = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Take over reply construction for this request.
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(OperationResult, &RequestContext) -> Response + Send + 'static,
    {
        self.on_response = Some(Box::new(hook));
        self
    }

    pub(crate) fn read_options(&self, sort: Option<SortOrder>) -> ReadOptions {
        ReadOptions {
            sort,
            populate: self.populate.clone().unwrap_or_default(),
            exclude: self.exclude.clone().unwrap_or_default(),
        }
    }

    /// Consume the response hook, leaving exactly one writer for the reply.
    pub(crate) fn take_responder(&mut self) -> Responder {
        match self.on_response.take() {
            Some(hook) => Responder::Custom(hook),
            None => Responder::Default,
        }
    }
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("is_permitted", &self.is_permitted)
            .field("criteria", &self.criteria)
            .field("on_response", &self.on_response.as_ref().map(|_| "<hook>"))
            .field("populate", &self.populate)
            .field("exclude", &self.exclude)
            .finish()
    }
}

/// Computes the authorization decision for one action.
///
/// Plain closures `Fn(&RequestContext) -> Decision` implement this trait.
/// An `Err` is treated by the dispatcher as a denial.
#[async_trait]
pub trait DomainLogic: Send + Sync {
    async fn decide(&self, ctx: &RequestContext) -> anyhow::Result<Decision>;
}

#[async_trait]
impl<F> DomainLogic for F
where
    F: Fn(&RequestContext) -> Decision + Send + Sync,
{
    async fn decide(&self, ctx: &RequestContext) -> anyhow::Result<Decision> {
        Ok(self(ctx))
    }
}

/// One domain logic function per action. All five are required.
#[derive(Clone)]
pub struct CrudDomainLogic {
    create: Arc<dyn DomainLogic>,
    read: Arc<dyn DomainLogic>,
    update: Arc<dyn DomainLogic>,
    del: Arc<dyn DomainLogic>,
    search: Arc<dyn DomainLogic>,
}

impl CrudDomainLogic {
    pub fn new(
        create: impl DomainLogic + 'static,
        read: impl DomainLogic + 'static,
        update: impl DomainLogic + 'static,
        del: impl DomainLogic + 'static,
        search: impl DomainLogic + 'static,
    ) -> Self {
        Self {
            create: Arc::new(create),
            read: Arc::new(read),
            update: Arc::new(update),
            del: Arc::new(del),
            search: Arc::new(search),
        }
    }

    /// Bind the same function to every action.
    pub fn uniform(logic: impl DomainLogic + 'static) -> Self {
        let shared: Arc<dyn DomainLogic> = Arc::new(logic);
        Self {
            create: shared.clone(),
            read: shared.clone(),
            update: shared.clone(),
            del: shared.clone(),
            search: shared,
        }
    }

    pub fn for_action(&self, action: Action) -> &Arc<dyn DomainLogic> {
        match action {
            Action::Create => &self.create,
            Action::Read => &self.read,
            Action::Update => &self.update,
            Action::Del => &self.del,
            Action::Search => &self.search,
        }
    }
}

impl fmt::Debug for CrudDomainLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudDomainLogic").finish_non_exhaustive()
    }
}
