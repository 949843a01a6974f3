use std::collections::BTreeMap;

use serde_json::Value;

/// Flat key-value map, the shape of every storage read and write.
pub type StorageMap = serde_json::Map<String, Value>;

/// Name of the storage area the extension uses.
pub const LOCAL_AREA: &str = "local";

/// Error type for storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// An asynchronous key-value storage area.
///
/// Implementations notify every other context about successful writes; the
/// content script learns about rule edits that way.
#[allow(async_fn_in_trait)]
pub trait StorageArea {
    /// Read the given keys. Missing keys are absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError>;

    /// Write every key in `items`.
    async fn set(&self, items: StorageMap) -> Result<(), StorageError>;

    /// Delete the given keys.
    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;
}

impl<T: StorageArea> StorageArea for &T {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError> {
        (**self).get(keys).await
    }

    async fn set(&self, items: StorageMap) -> Result<(), StorageError> {
        (**self).set(items).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        (**self).remove(keys).await
    }
}

/// Old and new value of one key. `None` means absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// One change notification: every key touched by a single write.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChanges {
    pub area: String,
    pub changes: BTreeMap<String, ValueChange>,
}

impl StorageChanges {
    pub fn local(changes: BTreeMap<String, ValueChange>) -> Self {
        Self {
            area: LOCAL_AREA.to_string(),
            changes,
        }
    }

    pub fn is_local(&self) -> bool {
        self.area == LOCAL_AREA
    }

    pub fn get(&self, key: &str) -> Option<&ValueChange> {
        self.changes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
