use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ExistingPermissions, PermissionStore};
use crate::storage::StorageError;

#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    records: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn ensure(&self, key: &str, existing: ExistingPermissions) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let users = records.entry(key.to_string()).or_default();
        if existing == ExistingPermissions::Reset {
            users.clear();
        }
        Ok(())
    }

    async fn grant(&self, key: &str, user: &str) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let users = records.entry(key.to_string()).or_default();
        if !users.iter().any(|u| u == user) {
            users.push(user.to_string());
        }
        Ok(())
    }

    async fn users(&self, key: &str) -> Result<Option<Vec<String>>, StorageError> {
        Ok(self.records.read().await.get(key).cloned())
    }
}
