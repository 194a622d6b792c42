pub mod error;
pub mod matcher;
pub mod merge;
pub mod parse;
pub mod sql;
pub mod types;

pub use error::QueryError;
pub use matcher::{all_hold, lookup, matches};
pub use merge::merge_scoped_query;
pub use parse::parse;
pub use sql::{order_by, FilterWhere, SqlFragment, SqlParam};
pub use types::*;
