use serde_json::Value;

use super::error::QueryError;
use super::types::{Condition, Criteria, FilterOp};

/// Parse a query map into a conjunction of conditions.
pub fn parse(query: &Criteria) -> Result<Vec<Condition>, QueryError> {
    let mut conditions = Vec::with_capacity(query.len());
    for (key, value) in query {
        if key.starts_with('$') {
            conditions.push(parse_logical_operator(key, value)?);
        } else {
            parse_field_condition(key, value, &mut conditions)?;
        }
    }
    Ok(conditions)
}

fn parse_logical_operator(op: &str, value: &Value) -> Result<Condition, QueryError> {
    let branches = value
        .as_array()
        .ok_or_else(|| QueryError::InvalidOperatorData(format!("{} requires array", op)))?;

    let mut parsed = Vec::with_capacity(branches.len());
    for branch in branches {
        let obj = branch
            .as_object()
            .ok_or_else(|| QueryError::InvalidOperatorData(format!("{} branches must be objects", op)))?;
        parsed.push(parse(obj)?);
    }

    match op {
        "$and" => Ok(Condition::And(parsed)),
        "$or" => Ok(Condition::Or(parsed)),
        other => Err(QueryError::UnsupportedOperator(other.to_string())),
    }
}

fn parse_field_condition(field: &str, value: &Value, out: &mut Vec<Condition>) -> Result<(), QueryError> {
    let path = split_path(field)?;

    match value {
        // Operator object, e.g. { "age": { "$gte": 18, "$lt": 65 } }
        Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => {
            for (op_key, op_val) in obj {
                let operator = map_operator(op_key)?;
                validate_operator_data(operator, op_val)?;
                out.push(Condition::Field { path: path.clone(), operator, data: op_val.clone() });
            }
        }
        // Implicit equality: { field: value }
        _ => out.push(Condition::Field { path, operator: FilterOp::Eq, data: value.clone() }),
    }
    Ok(())
}

fn map_operator(op_key: &str) -> Result<FilterOp, QueryError> {
    Ok(match op_key {
        "$eq" => FilterOp::Eq,
        "$ne" | "$neq" => FilterOp::Ne,
        "$gt" => FilterOp::Gt,
        "$gte" => FilterOp::Gte,
        "$lt" => FilterOp::Lt,
        "$lte" => FilterOp::Lte,
        "$in" => FilterOp::In,
        "$nin" => FilterOp::NIn,
        "$exists" => FilterOp::Exists,
        other => return Err(QueryError::UnsupportedOperator(other.to_string())),
    })
}

fn validate_operator_data(operator: FilterOp, data: &Value) -> Result<(), QueryError> {
    match operator {
        FilterOp::In | FilterOp::NIn if !data.is_array() => {
            Err(QueryError::InvalidOperatorData("$in/$nin require an array".to_string()))
        }
        FilterOp::Exists if !data.is_boolean() => {
            Err(QueryError::InvalidOperatorData("$exists requires a boolean".to_string()))
        }
        _ => Ok(()),
    }
}

/// Split a dotted field path (`owner.id`) into segments.
pub fn split_path(field: &str) -> Result<Vec<String>, QueryError> {
    let segments: Vec<String> = field.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(QueryError::InvalidField(field.to_string()));
    }
    Ok(segments)
}
