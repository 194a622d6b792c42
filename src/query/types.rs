use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage query: field paths mapped to a value (implicit equality) or an
/// operator object such as `{ "$gte": 3 }`.
pub type Criteria = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,
    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,
    #[serde(rename = "$exists")] Exists,
}

/// One parsed predicate of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Field {
        path: Vec<String>,
        operator: FilterOp,
        data: Value,
    },
    /// Every branch must hold; each branch is itself a conjunction.
    And(Vec<Vec<Condition>>),
    /// At least one branch must hold.
    Or(Vec<Vec<Condition>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Single-field ordering applied to read paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    /// Newest-created-first, the default ordering of list and paginate.
    pub fn newest_first() -> Self {
        Self {
            field: crate::storage::CREATED_AT_FIELD.to_string(),
            direction: SortDirection::Desc,
        }
    }
}
