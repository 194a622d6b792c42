pub mod context;
pub mod response;

pub use context::RequestContext;
pub use response::{OperationResult, Responder, ResponseHook};
