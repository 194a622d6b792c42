use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::relations::expand_relations;
use super::{
    exclude_fields, prepare_new, sanitize_patch, PageRequest, ReadOptions, Relations, StorageError, StorageHandle,
    ValidationError, Validator, ID_FIELD,
};
use crate::query::{self, Criteria, SortDirection, SortOrder};

/// Process-local document collection. Documents keep insertion order; reads
/// clone out of the lock so relation expansion never holds it.
pub struct MemoryStore {
    model_name: String,
    documents: RwLock<Vec<Value>>,
    relations: Relations,
    validator: Option<Validator>,
}

impl MemoryStore {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            documents: RwLock::new(Vec::new()),
            relations: Relations::new(),
            validator: None,
        }
    }

    /// Seed the collection with documents stored as given.
    pub fn with_documents(mut self, documents: Vec<Value>) -> Self {
        self.documents = RwLock::new(documents);
        self
    }

    pub fn with_relation(mut self, field: impl Into<String>, related: Arc<dyn StorageHandle>) -> Self {
        self.relations.insert(field.into(), related);
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn select(&self, query: &Criteria, sort: Option<&SortOrder>) -> Result<Vec<Value>, StorageError> {
        let conditions = query::parse(query)?;
        let documents = self.documents.read().await;
        let mut selected: Vec<(usize, &Value)> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| query::all_hold(doc, &conditions))
            .collect();
        if let Some(sort) = sort {
            sort_documents(&mut selected, sort);
        }
        Ok(selected.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn finish_read(&self, docs: &mut [Value], options: &ReadOptions) -> Result<(), StorageError> {
        expand_relations(docs, &options.populate, &self.relations).await?;
        exclude_fields(docs, &options.exclude);
        Ok(())
    }
}

fn position(documents: &[Value], selector: &Criteria) -> Result<Option<usize>, StorageError> {
    let conditions = query::parse(selector)?;
    Ok(documents.iter().position(|doc| query::all_hold(doc, &conditions)))
}

/// Order by the sort field; ties fall back to insertion order in the same
/// direction so newest-first stays stable for equal timestamps.
fn sort_documents(selected: &mut [(usize, &Value)], sort: &SortOrder) {
    let path: Vec<&str> = sort.field.split('.').collect();
    selected.sort_by(|(ia, a), (ib, b)| {
        let ordering = compare_values(query::lookup(a, path.as_slice()), query::lookup(b, path.as_slice())).then(ia.cmp(ib));
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        // Missing values sort before present ones
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl StorageHandle for MemoryStore {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn find(&self, query: &Criteria, options: &ReadOptions) -> Result<Vec<Value>, StorageError> {
        let mut docs = self.select(query, options.sort.as_ref()).await?;
        self.finish_read(&mut docs, options).await?;
        Ok(docs)
    }

    async fn count_documents(&self, query: &Criteria) -> Result<u64, StorageError> {
        Ok(self.select(query, None).await?.len() as u64)
    }

    async fn paginate(
        &self,
        query: &Criteria,
        page: PageRequest,
        options: &ReadOptions,
    ) -> Result<Vec<Value>, StorageError> {
        let all = self.select(query, options.sort.as_ref()).await?;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let mut docs: Vec<Value> = all.into_iter().skip(offset).take(page.limit as usize).collect();
        self.finish_read(&mut docs, options).await?;
        Ok(docs)
    }

    async fn create(&self, entity: Value) -> Result<Value, StorageError> {
        let doc = Value::Object(prepare_new(entity)?);
        let mut documents = self.documents.write().await;
        if let Some(id) = doc.get(ID_FIELD) {
            if documents.iter().any(|existing| existing.get(ID_FIELD) == Some(id)) {
                return Err(StorageError::DuplicateId(id.as_str().unwrap_or_default().to_string()));
            }
        }
        documents.push(doc.clone());
        Ok(doc)
    }

    async fn find_one_and_update(&self, selector: &Criteria, patch: Value) -> Result<Option<Value>, StorageError> {
        let patch = sanitize_patch(patch)?;
        let mut documents = self.documents.write().await;
        let Some(index) = position(&documents, selector)? else {
            return Ok(None);
        };
        if let Value::Object(map) = &mut documents[index] {
            map.extend(patch);
        }
        Ok(Some(documents[index].clone()))
    }

    async fn delete_one(&self, selector: &Criteria) -> Result<u64, StorageError> {
        let mut documents = self.documents.write().await;
        match position(&documents, selector)? {
            Some(index) => {
                documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn validate(&self, entity: &Value) -> Result<(), ValidationError> {
        match &self.validator {
            Some(validator) => validator(entity),
            None => Ok(()),
        }
    }
}
