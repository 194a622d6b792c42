use std::cmp::Ordering;

use serde_json::Value;

use super::error::QueryError;
use super::parse::parse;
use super::types::{Condition, Criteria, FilterOp};

/// Evaluate `query` against an in-memory document.
pub fn matches(document: &Value, query: &Criteria) -> Result<bool, QueryError> {
    let conditions = parse(query)?;
    Ok(all_hold(document, &conditions))
}

/// Resolve a field path inside a document.
pub fn lookup<'a, S: AsRef<str>>(document: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter().try_fold(document, |current, segment| current.get(segment.as_ref()))
}

/// Evaluate already-parsed conditions, so a query is parsed once per scan.
pub fn all_hold(document: &Value, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| holds(document, c))
}

fn holds(document: &Value, condition: &Condition) -> bool {
    match condition {
        Condition::And(branches) => branches.iter().all(|b| all_hold(document, b)),
        Condition::Or(branches) => branches.iter().any(|b| all_hold(document, b)),
        Condition::Field { path, operator, data } => {
            let found = lookup(document, path.as_slice());
            match operator {
                // { field: null } matches both a missing field and an explicit null
                FilterOp::Eq => match found {
                    Some(v) => v == data,
                    None => data.is_null(),
                },
                FilterOp::Ne => match found {
                    Some(v) => v != data,
                    None => !data.is_null(),
                },
                FilterOp::Gt => compare(found, data) == Some(Ordering::Greater),
                FilterOp::Gte => matches!(compare(found, data), Some(Ordering::Greater | Ordering::Equal)),
                FilterOp::Lt => compare(found, data) == Some(Ordering::Less),
                FilterOp::Lte => matches!(compare(found, data), Some(Ordering::Less | Ordering::Equal)),
                FilterOp::In => contains(data, found),
                FilterOp::NIn => !contains(data, found),
                FilterOp::Exists => found.is_some() == data.as_bool().unwrap_or(true),
            }
        }
    }
}

fn contains(candidates: &Value, found: Option<&Value>) -> bool {
    let value = found.unwrap_or(&Value::Null);
    candidates
        .as_array()
        .map(|values| values.iter().any(|v| v == value))
        .unwrap_or(false)
}

/// Order two scalars of the same kind; mixed kinds do not compare.
fn compare(found: Option<&Value>, data: &Value) -> Option<Ordering> {
    match (found?, data) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
