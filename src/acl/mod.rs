//! Permission record bootstrap for dispatcher actions.
//!
//! Each action of a registered entity gets a permission record keyed
//! `"{key}_{action}"` holding the users allowed to perform it. Domain logic
//! is free to consult these records when computing its decision.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use tracing::info;

use crate::decision::Action;
use crate::storage::StorageError;

pub use memory::MemoryPermissionStore;
pub use postgres::PgPermissionStore;

/// What registration does to a permission record that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingPermissions {
    /// Leave customised user lists untouched.
    #[default]
    Preserve,
    /// Reset the user list to empty.
    Reset,
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Make sure a record for `key` exists, starting with no users.
    async fn ensure(&self, key: &str, existing: ExistingPermissions) -> Result<(), StorageError>;

    /// Add `user` to the record, creating it when missing.
    async fn grant(&self, key: &str, user: &str) -> Result<(), StorageError>;

    /// Users on the record, or `None` when it does not exist.
    async fn users(&self, key: &str) -> Result<Option<Vec<String>>, StorageError>;
}

pub fn permission_key(key: &str, action: Action) -> String {
    format!("{}_{}", key, action.as_str())
}

/// Populate default permission records for every action of `key`.
///
/// Nothing is written unless `default_permission` is set. Returns the keys
/// that were ensured.
pub async fn register_action(
    store: &dyn PermissionStore,
    key: &str,
    default_permission: bool,
    existing: ExistingPermissions,
) -> Result<Vec<String>, StorageError> {
    if !default_permission {
        return Ok(Vec::new());
    }

    let mut ensured = Vec::with_capacity(Action::ALL.len());
    for action in Action::ALL {
        let lookup_key = permission_key(key, action);
        store.ensure(&lookup_key, existing).await?;
        ensured.push(lookup_key);
    }
    info!("Permissions set for {} ({:?})", key, existing);
    Ok(ensured)
}
