#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use serde_json::Value;

use crud_gate::config::DispatchConfig;
use crud_gate::storage::{MemoryStore, PageRequest, ReadOptions, StorageError, StorageHandle, ValidationError};
use crud_gate::{Criteria, CrudDomainLogic, CrudService, Decision, RequestContext};

pub const MAX_PAGE_LIMIT: u32 = 50;

/// One storage call as observed by the recording store.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Find(Criteria, ReadOptions),
    Count(Criteria),
    Paginate(Criteria, PageRequest),
    Create(Value),
    Update(Criteria, Value),
    Delete(Criteria),
}

/// Storage double: records every call, then delegates to a memory store or
/// fails with a fixed message.
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<Call>>,
    failure: Option<String>,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner, calls: Mutex::new(Vec::new()), failure: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            inner: MemoryStore::new("Note"),
            calls: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: Call) -> Result<(), StorageError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match &self.failure {
            Some(message) => Err(StorageError::Connection(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageHandle for RecordingStore {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn find(&self, query: &Criteria, options: &ReadOptions) -> Result<Vec<Value>, StorageError> {
        self.record(Call::Find(query.clone(), options.clone()))?;
        self.inner.find(query, options).await
    }

    async fn count_documents(&self, query: &Criteria) -> Result<u64, StorageError> {
        self.record(Call::Count(query.clone()))?;
        self.inner.count_documents(query).await
    }

    async fn paginate(&self, query: &Criteria, page: PageRequest, options: &ReadOptions) -> Result<Vec<Value>, StorageError> {
        self.record(Call::Paginate(query.clone(), page))?;
        self.inner.paginate(query, page, options).await
    }

    async fn create(&self, entity: Value) -> Result<Value, StorageError> {
        self.record(Call::Create(entity.clone()))?;
        self.inner.create(entity).await
    }

    async fn find_one_and_update(&self, selector: &Criteria, patch: Value) -> Result<Option<Value>, StorageError> {
        self.record(Call::Update(selector.clone(), patch.clone()))?;
        self.inner.find_one_and_update(selector, patch).await
    }

    async fn delete_one(&self, selector: &Criteria) -> Result<u64, StorageError> {
        self.record(Call::Delete(selector.clone()))?;
        self.inner.delete_one(selector).await
    }

    fn validate(&self, entity: &Value) -> Result<(), ValidationError> {
        self.inner.validate(entity)
    }
}

pub struct TestServer {
    pub base_url: String,
    pub store: Arc<RecordingStore>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Serve the dispatcher for `store` under `/api/notes` on a free port.
pub async fn serve(store: RecordingStore, logic: CrudDomainLogic) -> Result<TestServer> {
    let store = Arc::new(store);
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;

    let service = CrudService::new(store.clone(), logic).with_config(DispatchConfig {
        max_page_limit: MAX_PAGE_LIMIT,
        max_body_bytes: 1024 * 1024,
    });
    let app = Router::new().nest("/api/notes", service.router());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind test listener")?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestServer {
        base_url: format!("http://127.0.0.1:{}/api/notes", port),
        store,
        client: reqwest::Client::new(),
    })
}

pub fn criteria(value: Value) -> Criteria {
    value.as_object().cloned().unwrap_or_default()
}

pub fn notes(documents: Vec<Value>) -> RecordingStore {
    RecordingStore::new(MemoryStore::new("Note").with_documents(documents))
}

pub fn permit_all() -> CrudDomainLogic {
    CrudDomainLogic::uniform(|_: &RequestContext| Decision::permit())
}

pub fn deny_all() -> CrudDomainLogic {
    CrudDomainLogic::uniform(|_: &RequestContext| Decision::deny())
}

/// Permit every action, scoped to `scope`.
pub fn scoped(scope: Value) -> CrudDomainLogic {
    CrudDomainLogic::uniform(move |_: &RequestContext| Decision::permit().with_criteria(criteria(scope.clone())))
}
