pub mod acl;
pub mod config;
pub mod decision;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod service;
pub mod storage;

pub use decision::{Action, CrudDomainLogic, Decision, DomainLogic};
pub use error::ApiError;
pub use middleware::{OperationResult, RequestContext};
pub use query::{merge_scoped_query, Criteria};
pub use service::CrudService;
pub use storage::{StorageError, StorageHandle};
