//! In-memory storage area
//!
//! Behaves like the extension's local storage area: writes are visible to
//! every clone and each successful write that changes a value is broadcast to
//! all subscribers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{StorageArea, StorageChanges, StorageError, StorageMap, ValueChange};

#[derive(Default)]
struct Inner {
    data: Mutex<StorageMap>,
    listeners: Mutex<Vec<Sender<StorageChanges>>>,
    failing: AtomicBool,
}

/// Shared in-memory storage area. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage area pre-populated with `data`.
    pub fn with_data(data: StorageMap) -> Self {
        let storage = Self::new();
        if let Ok(mut guard) = storage.inner.data.lock() {
            *guard = data;
        }
        storage
    }

    /// Receive a [`StorageChanges`] for every write from now on.
    pub fn subscribe(&self) -> Receiver<StorageChanges> {
        let (tx, rx) = channel();
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    /// Make every operation fail, as a revoked extension context would.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> StorageMap {
        self.lock_data().map(|data| data.clone()).unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "Extension context invalidated".to_string(),
            ));
        }
        Ok(())
    }

    fn lock_data(&self) -> Result<MutexGuard<'_, StorageMap>, StorageError> {
        self.inner
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
    }

    fn notify(&self, changes: BTreeMap<String, ValueChange>) {
        if changes.is_empty() {
            return;
        }
        let event = StorageChanges::local(changes);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl StorageArea for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError> {
        self.check_available()?;
        let data = self.lock_data()?;
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: StorageMap) -> Result<(), StorageError> {
        self.check_available()?;
        let mut changes = BTreeMap::new();
        {
            let mut data = self.lock_data()?;
            for (key, value) in items {
                let old_value = data.insert(key.clone(), value.clone());
                if old_value.as_ref() != Some(&value) {
                    changes.insert(
                        key,
                        ValueChange {
                            old_value,
                            new_value: Some(value),
                        },
                    );
                }
            }
        }
        self.notify(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.check_available()?;
        let mut changes = BTreeMap::new();
        {
            let mut data = self.lock_data()?;
            for key in keys {
                if let Some(old_value) = data.remove(*key) {
                    changes.insert(
                        key.to_string(),
                        ValueChange {
                            old_value: Some(old_value),
                            new_value: None,
                        },
                    );
                }
            }
        }
        self.notify(changes);
        Ok(())
    }
}
