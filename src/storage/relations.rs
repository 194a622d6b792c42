use std::collections::HashMap;

use futures::future::try_join_all;
use serde_json::{json, Map, Value};

use super::{ReadOptions, Relations, StorageError, ID_FIELD};

/// Replace reference ids with the referenced documents for every populated
/// field that has a registered relation. A field may hold one id or an array
/// of ids; ids with no matching document are left as they are.
pub async fn expand_relations(
    docs: &mut [Value],
    populate: &[String],
    relations: &Relations,
) -> Result<(), StorageError> {
    if populate.is_empty() || docs.is_empty() {
        return Ok(());
    }

    let mut lookups = Vec::new();
    for field in populate {
        let Some(related) = relations.get(field) else {
            tracing::debug!("No relation registered for populated field '{}'", field);
            continue;
        };
        let ids = referenced_ids(docs, field);
        if ids.is_empty() {
            continue;
        }
        lookups.push(async move {
            let mut query = Map::new();
            query.insert(ID_FIELD.to_string(), json!({ "$in": ids }));
            let found = related.find(&query, &ReadOptions::default()).await?;
            let by_id: HashMap<String, Value> = found
                .into_iter()
                .filter_map(|doc| {
                    let id = doc.get(ID_FIELD)?.as_str()?.to_string();
                    Some((id, doc))
                })
                .collect();
            Ok::<_, StorageError>((field.as_str(), by_id))
        });
    }

    for (field, by_id) in try_join_all(lookups).await? {
        for doc in docs.iter_mut() {
            if let Some(slot) = doc.get_mut(field) {
                replace_refs(slot, &by_id);
            }
        }
    }
    Ok(())
}

fn referenced_ids(docs: &[Value], field: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for doc in docs {
        match doc.get(field) {
            Some(Value::String(id)) => ids.push(id.clone()),
            Some(Value::Array(items)) => {
                ids.extend(items.iter().filter_map(Value::as_str).map(str::to_string))
            }
            _ => {}
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

fn replace_refs(slot: &mut Value, by_id: &HashMap<String, Value>) {
    match slot {
        Value::String(id) => {
            if let Some(found) = by_id.get(id.as_str()) {
                *slot = found.clone();
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                replace_refs(item, by_id);
            }
        }
        _ => {}
    }
}
