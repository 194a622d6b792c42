use super::types::Criteria;

/// Combine caller-supplied query terms with the scoping criteria of an
/// authorization decision.
///
/// Both maps are ANDed field by field. On a key collision the criteria value
/// wins: criteria is the authoritative scope and a caller can only narrow it,
/// never replace it.
pub fn merge_scoped_query(request_query: Criteria, criteria: Option<&Criteria>) -> Criteria {
    let mut merged = request_query;
    if let Some(criteria) = criteria {
        for (key, value) in criteria {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
