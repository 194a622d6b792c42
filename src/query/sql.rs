use serde_json::Value;

use super::error::QueryError;
use super::parse::parse;
use super::types::{Condition, Criteria, FilterOp, SortOrder};

/// Bind value for a rendered fragment, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Field path, bound as `text[]` for the `#>` operator.
    Path(Vec<String>),
    /// Operand, bound as `jsonb`.
    Json(Value),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

/// Renders a document query as a Postgres predicate over a `jsonb` column.
pub struct FilterWhere {
    column: String,
    param_values: Vec<SqlParam>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(column: impl Into<String>, starting_param_index: usize) -> Self {
        Self {
            column: column.into(),
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Render `query` with placeholders numbered from `starting_param_index + 1`.
    pub fn generate(column: &str, query: &Criteria, starting_param_index: usize) -> Result<SqlFragment, QueryError> {
        let conditions = parse(query)?;
        let mut filter_where = Self::new(column, starting_param_index);
        let clause = filter_where.conjunction(&conditions);
        Ok(SqlFragment { clause, params: filter_where.param_values })
    }

    fn conjunction(&mut self, conditions: &[Condition]) -> String {
        if conditions.is_empty() {
            return "1=1".to_string();
        }
        let parts: Vec<String> = conditions.iter().map(|c| self.condition(c)).collect();
        parts.join(" AND ")
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::And(branches) | Condition::Or(branches) => {
                if branches.is_empty() {
                    // Empty $and is vacuously true, empty $or never holds
                    return if matches!(condition, Condition::And(_)) { "1=1" } else { "1=0" }.to_string();
                }
                let joiner = if matches!(condition, Condition::And(_)) { " AND " } else { " OR " };
                let parts: Vec<String> = branches
                    .iter()
                    .map(|b| format!("({})", self.conjunction(b)))
                    .collect();
                format!("({})", parts.join(joiner))
            }
            Condition::Field { path, operator, data } => self.field_condition(path, *operator, data),
        }
    }

    fn field_condition(&mut self, path: &[String], operator: FilterOp, data: &Value) -> String {
        let path_param = self.param(SqlParam::Path(path.to_vec()));
        let field = format!("(\"{}\" #> {}::text[])", self.column, path_param);
        match operator {
            FilterOp::Eq if data.is_null() => format!("({field} IS NULL OR {field} = 'null'::jsonb)"),
            FilterOp::Eq => format!("{field} = {}::jsonb", self.json(data)),
            FilterOp::Ne if data.is_null() => format!("({field} IS NOT NULL AND {field} <> 'null'::jsonb)"),
            FilterOp::Ne => format!("{field} IS DISTINCT FROM {}::jsonb", self.json(data)),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let sql_op = match operator {
                    FilterOp::Gt => ">",
                    FilterOp::Gte => ">=",
                    FilterOp::Lt => "<",
                    _ => "<=",
                };
                let operand = self.json(data);
                // jsonb orders across kinds; restrict to same-kind comparisons
                format!("(jsonb_typeof({field}) = jsonb_typeof({operand}::jsonb) AND {field} {sql_op} {operand}::jsonb)")
            }
            FilterOp::In | FilterOp::NIn => {
                let candidates = self.json(data);
                let membership = format!(
                    "COALESCE({field}, 'null'::jsonb) IN (SELECT jsonb_array_elements({candidates}::jsonb))"
                );
                if operator == FilterOp::In { membership } else { format!("NOT ({membership})") }
            }
            FilterOp::Exists => {
                if data.as_bool().unwrap_or(true) {
                    format!("{field} IS NOT NULL")
                } else {
                    format!("{field} IS NULL")
                }
            }
        }
    }

    fn json(&mut self, value: &Value) -> String {
        self.param(SqlParam::Json(value.clone()))
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// Render an ORDER BY over a document field, tie-broken by insertion time.
pub fn order_by(column: &str, sort: &SortOrder, param_index: usize) -> SqlFragment {
    let path = sort.field.split('.').map(str::to_string).collect();
    SqlFragment {
        clause: format!(
            "ORDER BY (\"{}\" #> ${}::text[]) {}, \"created_at\" {}",
            column,
            param_index + 1,
            sort.direction.to_sql(),
            sort.direction.to_sql()
        ),
        params: vec![SqlParam::Path(path)],
    }
}
