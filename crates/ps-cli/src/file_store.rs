//! JSON file storage area
//!
//! The whole store is one JSON object on disk, read on every call and
//! rewritten on every write. A missing file is an empty store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use ps_core::resolver::{BundledRules, ResourceError};
use ps_core::store::{StorageArea, StorageError, StorageMap};
use ps_core::types::RuleFile;

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<StorageMap, StorageError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StorageMap::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(StorageMap::new());
        }
        match serde_json::from_str(&text)? {
            Value::Object(values) => Ok(values),
            _ => Err(StorageError::Unavailable(format!(
                "'{}' does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write_all(&self, values: &StorageMap) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }
}

impl StorageArea for JsonFileStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError> {
        let mut all = self.read_all().await?;
        Ok(keys
            .iter()
            .filter_map(|key| all.remove(*key).map(|value| (key.to_string(), value)))
            .collect())
    }

    async fn set(&self, items: StorageMap) -> Result<(), StorageError> {
        let mut all = self.read_all().await?;
        all.extend(items);
        self.write_all(&all).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut all = self.read_all().await?;
        for key in keys {
            all.remove(*key);
        }
        self.write_all(&all).await
    }
}

/// Rule file given on the command line, if any.
#[derive(Debug, Clone, Default)]
pub struct FileRules {
    path: Option<PathBuf>,
}

impl FileRules {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl BundledRules for FileRules {
    async fn load(&self) -> Result<RuleFile, ResourceError> {
        let Some(path) = &self.path else {
            return Err(ResourceError::Missing("no --rules-file given".to_string()));
        };
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::store::RuleStore;
    use ps_core::types::{RuleEntry, UserRules};
    use serde_json::json;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("missing.json"));
        assert!(storage.get(&["isPaused"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_merges_and_remove_deletes() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path();
        let storage = JsonFileStorage::new(path);

        let mut first = StorageMap::new();
        first.insert("isPaused".into(), json!(true));
        storage.set(first).await.unwrap();
        let mut second = StorageMap::new();
        second.insert("hiddenCount".into(), json!(2));
        storage.set(second).await.unwrap();

        let values = storage.get(&["isPaused", "hiddenCount", "absent"]).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["isPaused"], json!(true));

        storage.remove(&["isPaused"]).await.unwrap();
        assert!(storage.get(&["isPaused"]).await.unwrap().is_empty());

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"hiddenCount": 2}));
    }

    #[tokio::test]
    async fn test_rule_store_over_file() {
        let file = NamedTempFile::new().unwrap();
        let store = RuleStore::new(JsonFileStorage::new(file.path()));
        let rules = UserRules {
            keywords: vec![RuleEntry::new("ships to")],
            patterns: vec![],
        };
        assert!(store.set_user_rules(&rules).await);
        assert_eq!(store.load_user_rules().await, rules);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path();
        std::fs::write(path, "[1, 2]").unwrap();
        let storage = JsonFileStorage::new(path);
        assert!(matches!(
            storage.get(&["isPaused"]).await,
            Err(StorageError::Unavailable(_))
        ));
        std::fs::write(path, "{not json").unwrap();
        assert!(matches!(storage.get(&["isPaused"]).await, Err(StorageError::Json(_))));
    }

    #[tokio::test]
    async fn test_file_rules() {
        assert!(matches!(
            FileRules::default().load().await,
            Err(ResourceError::Missing(_))
        ));
        let bundled = NamedTempFile::new().unwrap();
        std::fs::write(bundled.path(), r#"{"domains": {"shop": {"name": "Shop", "matches": ["shop.example"]}}}"#).unwrap();
        let file = FileRules::new(Some(bundled.path().to_path_buf())).load().await.unwrap();
        assert_eq!(file.domains.len(), 1);
    }
}
