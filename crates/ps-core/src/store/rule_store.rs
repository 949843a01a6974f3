//! Typed accessors over a storage area.
//!
//! Nothing here returns an error: a failed read degrades to the default value
//! and a failed write returns `false`. Callers in page context must never
//! crash because storage went away.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::backend::{StorageArea, StorageMap};
use crate::config::keys;
use crate::types::{DomainRules, GeneralSettings, HiddenRecord, UserRules};

/// Typed view of the extension's persistent store.
pub struct RuleStore<S> {
    area: S,
}

impl<S: StorageArea> RuleStore<S> {
    pub fn new(area: S) -> Self {
        Self { area }
    }

    /// The underlying storage area.
    pub fn area(&self) -> &S {
        &self.area
    }

    // =========================================================================
    // Raw access
    // =========================================================================

    /// Read keys; an empty map on failure.
    pub async fn get(&self, keys: &[&str]) -> StorageMap {
        match self.area.get(keys).await {
            Ok(values) => values,
            Err(e) => {
                log::error!("Failed to get {:?} from storage: {}", keys, e);
                StorageMap::new()
            }
        }
    }

    /// Write items; false on failure.
    pub async fn set(&self, items: StorageMap) -> bool {
        match self.area.set(items).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to set storage: {}", e);
                false
            }
        }
    }

    /// Remove keys; false on failure.
    pub async fn remove(&self, keys: &[&str]) -> bool {
        match self.area.remove(keys).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to remove {:?} from storage: {}", keys, e);
                false
            }
        }
    }

    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(&[key]).await.remove(key)?;
        decode_value(key, value)
    }

    async fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => {
                let mut items = StorageMap::new();
                items.insert(key.to_string(), value);
                self.set(items).await
            }
            Err(e) => {
                log::error!("Failed to encode `{}`: {}", key, e);
                false
            }
        }
    }

    // =========================================================================
    // Pause state
    // =========================================================================

    pub async fn get_is_paused(&self) -> bool {
        self.get_typed(keys::IS_PAUSED).await.unwrap_or(false)
    }

    pub async fn set_is_paused(&self, is_paused: bool) -> bool {
        self.set_typed(keys::IS_PAUSED, &is_paused).await
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Stored user rules as-is, or empty rules.
    pub async fn get_user_rules(&self) -> UserRules {
        self.get_typed(keys::USER_RULES).await.unwrap_or_default()
    }

    pub async fn set_user_rules(&self, user_rules: &UserRules) -> bool {
        self.set_typed(keys::USER_RULES, user_rules).await
    }

    /// Stored user rules with legacy string entries normalized.
    ///
    /// The normalized form is written back before it is returned, so every
    /// later load sees object entries only.
    pub async fn load_user_rules(&self) -> UserRules {
        let mut user_rules = self.get_user_rules().await;
        if user_rules.migrate() {
            log::info!("Migrated user rules to object format");
            if !self.set_user_rules(&user_rules).await {
                log::warn!("Migrated user rules could not be persisted");
            }
        }
        user_rules
    }

    /// Stored domain overrides, if any were ever saved.
    pub async fn get_domain_rules(&self) -> Option<DomainRules> {
        self.get_typed(keys::DOMAIN_RULES).await
    }

    pub async fn set_domain_rules(&self, domain_rules: &DomainRules) -> bool {
        self.set_typed(keys::DOMAIN_RULES, domain_rules).await
    }

    // =========================================================================
    // Hidden items
    // =========================================================================

    pub async fn get_hidden_count(&self) -> usize {
        self.get_typed(keys::HIDDEN_COUNT).await.unwrap_or(0)
    }

    pub async fn get_hidden_items(&self) -> Vec<String> {
        self.get_typed(keys::HIDDEN_ITEMS).await.unwrap_or_default()
    }

    /// Count and items in one read.
    pub async fn get_hidden_record(&self) -> HiddenRecord {
        let mut values = self.get(&[keys::HIDDEN_COUNT, keys::HIDDEN_ITEMS]).await;
        HiddenRecord {
            count: values
                .remove(keys::HIDDEN_COUNT)
                .and_then(|v| decode_value(keys::HIDDEN_COUNT, v))
                .unwrap_or(0),
            items: values
                .remove(keys::HIDDEN_ITEMS)
                .and_then(|v| decode_value(keys::HIDDEN_ITEMS, v))
                .unwrap_or_default(),
        }
    }

    /// Write count and items in a single storage call.
    pub async fn set_hidden_data(&self, count: usize, items: &[String]) -> bool {
        let mut values = StorageMap::new();
        values.insert(keys::HIDDEN_COUNT.to_string(), Value::from(count));
        values.insert(
            keys::HIDDEN_ITEMS.to_string(),
            Value::Array(items.iter().cloned().map(Value::String).collect()),
        );
        self.set(values).await
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub async fn get_general_settings(&self) -> GeneralSettings {
        self.get_typed(keys::GENERAL_SETTINGS)
            .await
            .unwrap_or_default()
    }

    pub async fn set_general_settings(&self, settings: &GeneralSettings) -> bool {
        self.set_typed(keys::GENERAL_SETTINGS, settings).await
    }

    /// Seed empty user rules and the unpaused state on first install.
    ///
    /// Does nothing if user rules already exist. A failed read aborts instead
    /// of seeding, so a flaky backend cannot wipe existing rules.
    pub async fn initialize(&self) -> bool {
        let existing = match self.area.get(&[keys::USER_RULES]).await {
            Ok(values) => values,
            Err(e) => {
                log::error!("Failed to initialize storage: {}", e);
                return false;
            }
        };
        if existing.get(keys::USER_RULES).is_some_and(|v| !v.is_null()) {
            return true;
        }

        let mut defaults = StorageMap::new();
        match serde_json::to_value(UserRules::default()) {
            Ok(value) => {
                defaults.insert(keys::USER_RULES.to_string(), value);
            }
            Err(e) => {
                log::error!("Failed to encode default user rules: {}", e);
                return false;
            }
        }
        defaults.insert(keys::IS_PAUSED.to_string(), Value::Bool(false));
        self.set(defaults).await
    }
}

fn decode_value<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            log::warn!("Ignoring malformed `{}` in storage: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;
    use crate::types::{DomainRuleSet, RuleEntry};
    use serde_json::json;

    fn store_with(value: Value) -> (MemoryStorage, RuleStore<MemoryStorage>) {
        let storage = MemoryStorage::with_data(value.as_object().cloned().unwrap());
        (storage.clone(), RuleStore::new(storage))
    }

    #[tokio::test]
    async fn test_defaults_on_empty_store() {
        let (_, store) = store_with(json!({}));
        assert!(!store.get_is_paused().await);
        assert_eq!(store.get_user_rules().await, UserRules::default());
        assert_eq!(store.get_domain_rules().await, None);
        assert_eq!(store.get_hidden_count().await, 0);
        assert!(store.get_hidden_items().await.is_empty());
        assert_eq!(store.get_general_settings().await, GeneralSettings::default());
    }

    #[tokio::test]
    async fn test_storage_fault_degrades() {
        let (storage, store) = store_with(json!({"isPaused": true}));
        storage.set_failing(true);
        assert!(!store.get_is_paused().await);
        assert!(store.get(&["isPaused"]).await.is_empty());
        assert!(!store.set_is_paused(true).await);
        assert!(!store.remove(&["isPaused"]).await);
        assert!(!store.initialize().await);
    }

    #[tokio::test]
    async fn test_malformed_value_degrades() {
        let (_, store) = store_with(json!({"userRules": 42, "hiddenCount": "many"}));
        assert_eq!(store.get_user_rules().await, UserRules::default());
        assert_eq!(store.get_hidden_count().await, 0);
    }

    #[tokio::test]
    async fn test_initialize_seeds_once() {
        let (storage, store) = store_with(json!({}));
        assert!(store.initialize().await);
        assert_eq!(storage.snapshot()["userRules"], json!({"keywords": [], "patterns": []}));
        assert_eq!(storage.snapshot()["isPaused"], json!(false));

        let mut rules = UserRules::default();
        rules.keywords.push(RuleEntry::new("ships to"));
        store.set_user_rules(&rules).await;
        store.set_is_paused(true).await;

        assert!(store.initialize().await);
        assert_eq!(store.get_user_rules().await, rules);
        assert!(store.get_is_paused().await);
    }

    #[tokio::test]
    async fn test_legacy_migration_persists_once() {
        let (storage, store) = store_with(json!({
            "userRules": {"keywords": ["ships to", "Main St"], "patterns": []}
        }));
        let rx = storage.subscribe();

        let rules = store.load_user_rules().await;
        assert_eq!(rules.keywords, vec![RuleEntry::new("ships to"), RuleEntry::new("Main St")]);
        assert_eq!(
            storage.snapshot()["userRules"]["keywords"],
            json!([{"value": "ships to", "enabled": true}, {"value": "Main St", "enabled": true}])
        );
        assert!(rx.try_recv().is_ok());

        let again = store.load_user_rules().await;
        assert_eq!(again, rules);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hidden_data_roundtrip() {
        let (_, store) = store_with(json!({}));
        let items = vec!["Main St".to_string(), "Selector: #addr".to_string()];
        assert!(store.set_hidden_data(items.len(), &items).await);
        let record = store.get_hidden_record().await;
        assert_eq!(record.count, 2);
        assert_eq!(record.items, items);
    }

    #[tokio::test]
    async fn test_domain_rules_roundtrip() {
        let (_, store) = store_with(json!({}));
        let mut rules = DomainRules::new();
        rules.insert("shop", DomainRuleSet::new("Shop", &["shop.example"], &["#addr"]));
        assert!(store.set_domain_rules(&rules).await);
        assert_eq!(store.get_domain_rules().await, Some(rules));
    }
}
