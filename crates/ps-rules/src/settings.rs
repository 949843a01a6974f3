//! Settings editing
//!
//! [`RuleEditor`] holds the options page's working copy of the user rules,
//! the domain rule sets and the general settings. Edits are validated here;
//! callers commit them to the store and show the returned [`Outcome`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use ps_core::config::builtin_domains;
use ps_core::resolver::is_valid_pattern;
use ps_core::store::{RuleStore, StorageArea};
use ps_core::types::{DomainRuleSet, DomainRules, GeneralSettings, RuleEntry, UserRules};

use crate::transfer::{create_export, parse_import, ExportData, ImportData};

/// User-facing notification texts.
pub mod messages {
    pub const KEYWORD_ADDED: &str = "キーワードを追加しました";
    pub const KEYWORD_DUPLICATE: &str = "このキーワードは既に登録されています";
    pub const PATTERN_ADDED: &str = "正規表現を追加しました";
    pub const PATTERN_DUPLICATE: &str = "この正規表現は既に登録されています";
    pub const PATTERN_INVALID: &str = "無効な正規表現です";
    pub const SAVED: &str = "設定を保存しました";
    pub const SAVE_FAILED: &str = "保存に失敗しました";
    pub const RESET_DONE: &str = "設定を初期化しました";
    pub const RESET_FAILED: &str = "リセットに失敗しました";
    pub const EXPORTED: &str = "設定をエクスポートしました";
    pub const EXPORT_FAILED: &str = "エクスポートに失敗しました";
    pub const IMPORTED: &str = "設定をインポートしました";
    pub const IMPORT_INVALID: &str = "無効なファイル形式です";
    pub const IMPORT_FAILED: &str = "インポートに失敗しました: ";
}

// =============================================================================
// Outcomes
// =============================================================================

/// Toast class of a user-visible outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Warning,
    Error,
}

/// What the settings surface tells the user after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub kind: ToastKind,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == ToastKind::Success
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Which user rule list an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Keyword,
    Pattern,
}

impl RuleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Keyword => "キーワード",
            Self::Pattern => "正規表現",
        }
    }
}

/// Error type for rejected edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleEditError {
    #[error("Rule text is empty")]
    Empty,
    #[error("Invalid regular expression: {0}")]
    InvalidPattern(String),
    #[error("Duplicate {kind:?}: {value}")]
    Duplicate { kind: RuleKind, value: String },
    #[error("No {kind:?} at index {index}")]
    OutOfRange { kind: RuleKind, index: usize },
    #[error("Unknown domain rule set: {0}")]
    UnknownDomain(String),
}

impl From<&RuleEditError> for Outcome {
    fn from(err: &RuleEditError) -> Self {
        match err {
            RuleEditError::Duplicate {
                kind: RuleKind::Keyword,
                ..
            } => Outcome::warning(messages::KEYWORD_DUPLICATE),
            RuleEditError::Duplicate {
                kind: RuleKind::Pattern,
                ..
            } => Outcome::warning(messages::PATTERN_DUPLICATE),
            RuleEditError::InvalidPattern(_) => Outcome::error(messages::PATTERN_INVALID),
            other => Outcome::error(other.to_string()),
        }
    }
}

// =============================================================================
// Editor
// =============================================================================

/// Working copy of everything the options page edits.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEditor {
    user_rules: UserRules,
    domain_rules: DomainRules,
    general: GeneralSettings,
}

impl Default for RuleEditor {
    fn default() -> Self {
        Self::new(UserRules::default(), builtin_domains(), GeneralSettings::default())
    }
}

impl RuleEditor {
    pub fn new(user_rules: UserRules, domain_rules: DomainRules, general: GeneralSettings) -> Self {
        Self {
            user_rules,
            domain_rules,
            general,
        }
    }

    /// Load from the store. Legacy entries are migrated and persisted; with
    /// no stored domain rules the built-in table is edited instead.
    pub async fn load<S: StorageArea>(store: &RuleStore<S>) -> Self {
        let user_rules = store.load_user_rules().await;
        let domain_rules = store.get_domain_rules().await.unwrap_or_else(builtin_domains);
        let general = store.get_general_settings().await;
        Self::new(user_rules, domain_rules, general)
    }

    pub fn user_rules(&self) -> &UserRules {
        &self.user_rules
    }

    pub fn domain_rules(&self) -> &DomainRules {
        &self.domain_rules
    }

    pub fn general_settings(&self) -> &GeneralSettings {
        &self.general
    }

    pub fn general_settings_mut(&mut self) -> &mut GeneralSettings {
        &mut self.general
    }

    fn list(&self, kind: RuleKind) -> &Vec<RuleEntry> {
        match kind {
            RuleKind::Keyword => &self.user_rules.keywords,
            RuleKind::Pattern => &self.user_rules.patterns,
        }
    }

    fn list_mut(&mut self, kind: RuleKind) -> &mut Vec<RuleEntry> {
        match kind {
            RuleKind::Keyword => &mut self.user_rules.keywords,
            RuleKind::Pattern => &mut self.user_rules.patterns,
        }
    }

    // =========================================================================
    // User rules
    // =========================================================================

    /// Add an enabled keyword. Input is trimmed; duplicates are exact,
    /// case-sensitive matches.
    pub fn add_keyword(&mut self, input: &str) -> Result<(), RuleEditError> {
        self.add(RuleKind::Keyword, input)
    }

    /// Add an enabled pattern after checking that it compiles.
    pub fn add_pattern(&mut self, input: &str) -> Result<(), RuleEditError> {
        self.add(RuleKind::Pattern, input)
    }

    fn add(&mut self, kind: RuleKind, input: &str) -> Result<(), RuleEditError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(RuleEditError::Empty);
        }
        if kind == RuleKind::Pattern && !is_valid_pattern(value) {
            return Err(RuleEditError::InvalidPattern(value.to_string()));
        }
        if self.list(kind).iter().any(|entry| entry.value() == value) {
            return Err(RuleEditError::Duplicate {
                kind,
                value: value.to_string(),
            });
        }
        self.list_mut(kind).push(RuleEntry::new(value));
        Ok(())
    }

    pub fn delete(&mut self, kind: RuleKind, index: usize) -> Result<RuleEntry, RuleEditError> {
        let list = self.list_mut(kind);
        if index >= list.len() {
            return Err(RuleEditError::OutOfRange { kind, index });
        }
        Ok(list.remove(index))
    }

    /// Remove every listed index. Duplicates and out-of-range indices are
    /// ignored. Returns how many entries were removed.
    pub fn delete_many(&mut self, kind: RuleKind, indices: &[usize]) -> usize {
        let mut indices = indices.to_vec();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        let list = self.list_mut(kind);
        let mut removed = 0;
        for index in indices {
            if index < list.len() {
                list.remove(index);
                removed += 1;
            }
        }
        removed
    }

    pub fn set_enabled(&mut self, kind: RuleKind, index: usize, enabled: bool) -> Result<(), RuleEditError> {
        let entry = self
            .list_mut(kind)
            .get_mut(index)
            .ok_or(RuleEditError::OutOfRange { kind, index })?;
        entry.set_enabled(enabled);
        Ok(())
    }

    /// Move the entry at `from` so it ends up at `to`.
    pub fn move_rule(&mut self, kind: RuleKind, from: usize, to: usize) -> Result<(), RuleEditError> {
        let list = self.list_mut(kind);
        let len = list.len();
        if from >= len {
            return Err(RuleEditError::OutOfRange { kind, index: from });
        }
        if to >= len {
            return Err(RuleEditError::OutOfRange { kind, index: to });
        }
        let entry = list.remove(from);
        list.insert(to, entry);
        Ok(())
    }

    /// Entries whose value contains `query`, ignoring case, with their
    /// indices in the full list. An empty query matches everything.
    pub fn filter(&self, kind: RuleKind, query: &str) -> Vec<(usize, &RuleEntry)> {
        let query = query.to_lowercase();
        self.list(kind)
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.value().to_lowercase().contains(&query))
            .collect()
    }

    // =========================================================================
    // Domain rules
    // =========================================================================

    /// Rule sets whose name or any match string contains `query`, ignoring case.
    pub fn filter_domains(&self, query: &str) -> Vec<(&str, &DomainRuleSet)> {
        let query = query.to_lowercase();
        self.domain_rules
            .iter()
            .filter(|(_, set)| {
                set.name.to_lowercase().contains(&query)
                    || set.matches.iter().any(|m| m.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn set_domain_enabled(&mut self, key: &str, enabled: bool) -> Result<Outcome, RuleEditError> {
        let set = self
            .domain_rules
            .get_mut(key)
            .ok_or_else(|| RuleEditError::UnknownDomain(key.to_string()))?;
        set.enabled = Some(enabled);
        let state = if enabled { "有効" } else { "無効" };
        Ok(Outcome::success(format!("{} を{}にしました", set.name, state)))
    }

    // =========================================================================
    // Whole-state operations
    // =========================================================================

    /// Empty user rules, the built-in domain table and default settings.
    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }

    /// Replace user rules wholesale and merge domain rule sets shallowly.
    /// Fields missing from the file are left alone.
    pub fn apply_import(&mut self, data: ImportData) {
        if let Some(mut user_rules) = data.user_rules {
            user_rules.migrate();
            self.user_rules = user_rules;
        }
        if let Some(domain_rules) = data.domain_rules {
            self.domain_rules.merge(domain_rules);
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write user and domain rules.
    pub async fn save<S: StorageArea>(&self, store: &RuleStore<S>) -> bool {
        let user_ok = store.set_user_rules(&self.user_rules).await;
        let domain_ok = store.set_domain_rules(&self.domain_rules).await;
        if !(user_ok && domain_ok) {
            log::error!("Failed to save rules");
        }
        user_ok && domain_ok
    }

    pub async fn save_general<S: StorageArea>(&self, store: &RuleStore<S>) -> bool {
        store.set_general_settings(&self.general).await
    }

    /// Save the rules and report `message` on success.
    pub async fn commit<S: StorageArea>(&self, store: &RuleStore<S>, message: &str) -> Outcome {
        if self.save(store).await {
            Outcome::success(message)
        } else {
            Outcome::error(messages::SAVE_FAILED)
        }
    }

    /// Validate, apply and save an addition in one step.
    pub async fn add_and_commit<S: StorageArea>(
        &mut self,
        store: &RuleStore<S>,
        kind: RuleKind,
        input: &str,
    ) -> Option<Outcome> {
        match self.add(kind, input) {
            Ok(()) => {
                let message = match kind {
                    RuleKind::Keyword => messages::KEYWORD_ADDED,
                    RuleKind::Pattern => messages::PATTERN_ADDED,
                };
                Some(self.commit(store, message).await)
            }
            // Blank input is ignored without a toast.
            Err(RuleEditError::Empty) => None,
            Err(e) => Some(Outcome::from(&e)),
        }
    }

    /// Bulk delete and save, reporting how many were removed.
    pub async fn delete_many_and_commit<S: StorageArea>(
        &mut self,
        store: &RuleStore<S>,
        kind: RuleKind,
        indices: &[usize],
    ) -> Outcome {
        let removed = self.delete_many(kind, indices);
        let message = format!("{}件の{}を削除しました", removed, kind.label());
        self.commit(store, &message).await
    }

    /// Parse a settings file, apply it and save. A file that fails to parse
    /// leaves the working copy untouched.
    pub async fn import_and_commit<S: StorageArea>(&mut self, store: &RuleStore<S>, text: &str) -> Outcome {
        match parse_import(text) {
            Ok(data) => {
                self.apply_import(data);
                if self.save(store).await {
                    Outcome::success(messages::IMPORTED)
                } else {
                    Outcome::error(format!("{}{}", messages::IMPORT_FAILED, messages::SAVE_FAILED))
                }
            }
            Err(e) if e.is_invalid_format() => {
                log::warn!("Rejected settings file: {}", e);
                Outcome::error(messages::IMPORT_INVALID)
            }
            Err(e) => {
                log::error!("Failed to import settings: {}", e);
                Outcome::error(format!("{}{}", messages::IMPORT_FAILED, e))
            }
        }
    }

    /// Snapshot of the rules for an export file.
    pub fn export(&self, now: DateTime<Utc>) -> ExportData {
        create_export(&self.user_rules, &self.domain_rules, now)
    }

    /// Reset everything and persist it.
    pub async fn reset_and_commit<S: StorageArea>(&mut self, store: &RuleStore<S>) -> Outcome {
        self.reset_to_defaults();
        let rules_ok = self.save(store).await;
        let general_ok = self.save_general(store).await;
        if rules_ok && general_ok {
            Outcome::success(messages::RESET_DONE)
        } else {
            Outcome::error(messages::RESET_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::store::MemoryStorage;
    use ps_core::types::Theme;
    use serde_json::json;

    fn editor_with(keywords: &[&str]) -> RuleEditor {
        RuleEditor::new(
            UserRules {
                keywords: keywords.iter().map(|k| RuleEntry::new(*k)).collect(),
                patterns: vec![],
            },
            builtin_domains(),
            GeneralSettings::default(),
        )
    }

    fn values(editor: &RuleEditor, kind: RuleKind) -> Vec<&str> {
        editor.list(kind).iter().map(RuleEntry::value).collect()
    }

    #[test]
    fn test_add_keyword_trims_and_rejects_duplicates() {
        let mut editor = RuleEditor::default();
        editor.add_keyword("  ships to ").unwrap();
        assert_eq!(values(&editor, RuleKind::Keyword), vec!["ships to"]);
        assert_eq!(editor.add_keyword("   "), Err(RuleEditError::Empty));

        let err = editor.add_keyword("ships to").unwrap_err();
        assert_eq!(Outcome::from(&err), Outcome::warning(messages::KEYWORD_DUPLICATE));

        // Case-sensitive.
        editor.add_keyword("Ships To").unwrap();
        assert_eq!(editor.user_rules().keywords.len(), 2);
    }

    #[test]
    fn test_add_pattern_validates() {
        let mut editor = RuleEditor::default();
        let err = editor.add_pattern("(").unwrap_err();
        assert_eq!(err, RuleEditError::InvalidPattern("(".into()));
        assert_eq!(Outcome::from(&err).kind, ToastKind::Error);
        assert!(editor.user_rules().patterns.is_empty());

        editor.add_pattern(r"\d{3}-\d{4}").unwrap();
        assert!(matches!(
            editor.add_pattern(r"\d{3}-\d{4}"),
            Err(RuleEditError::Duplicate {
                kind: RuleKind::Pattern,
                ..
            })
        ));
    }

    #[test]
    fn test_delete_and_bulk_delete() {
        let mut editor = editor_with(&["a", "b", "c", "d"]);
        assert_eq!(editor.delete(RuleKind::Keyword, 1).unwrap(), RuleEntry::new("b"));
        assert!(editor.delete(RuleKind::Keyword, 9).is_err());
        assert_eq!(editor.delete_many(RuleKind::Keyword, &[0, 2, 2, 7]), 2);
        assert_eq!(values(&editor, RuleKind::Keyword), vec!["c"]);
    }

    #[test]
    fn test_toggle_and_move() {
        let mut editor = editor_with(&["a", "b", "c"]);
        editor.set_enabled(RuleKind::Keyword, 0, false).unwrap();
        assert!(!editor.user_rules().keywords[0].is_enabled());

        editor.move_rule(RuleKind::Keyword, 0, 2).unwrap();
        assert_eq!(values(&editor, RuleKind::Keyword), vec!["b", "c", "a"]);
        editor.move_rule(RuleKind::Keyword, 2, 0).unwrap();
        assert_eq!(values(&editor, RuleKind::Keyword), vec!["a", "b", "c"]);
        assert!(editor.move_rule(RuleKind::Keyword, 0, 3).is_err());
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let editor = editor_with(&["Main St", "ships to", "MAINE"]);
        let hits: Vec<usize> = editor
            .filter(RuleKind::Keyword, "main")
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hits, vec![0, 2]);
        assert_eq!(editor.filter(RuleKind::Keyword, "").len(), 3);

        let domains: Vec<&str> = editor
            .filter_domains("GOOGLE")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(domains, vec!["google", "gemini"]);
    }

    #[test]
    fn test_domain_toggle() {
        let mut editor = RuleEditor::default();
        let outcome = editor.set_domain_enabled("amazon", false).unwrap();
        assert_eq!(outcome.message, "Amazon.co.jp を無効にしました");
        assert!(!editor.domain_rules().get("amazon").unwrap().is_enabled());
        assert!(editor.set_domain_enabled("nope", true).is_err());
    }

    #[test]
    fn test_apply_import_merges_domains_and_replaces_rules() {
        let mut editor = editor_with(&["old"]);
        let mut incoming = DomainRules::new();
        incoming.insert("amazon", DomainRuleSet::new("Amazon custom", &["amazon.co.jp"], &[]));
        incoming.insert("shop", DomainRuleSet::new("Shop", &["shop.example"], &["#addr"]));

        editor.apply_import(ImportData {
            user_rules: Some(UserRules {
                keywords: vec![RuleEntry::Legacy("new".into())],
                patterns: vec![],
            }),
            domain_rules: Some(incoming),
        });
        assert_eq!(editor.user_rules().keywords, vec![RuleEntry::new("new")]);
        let keys: Vec<&str> = editor.domain_rules().keys().collect();
        assert_eq!(keys, vec!["google", "gemini", "amazon", "shop"]);
        assert_eq!(editor.domain_rules().get("amazon").unwrap().name, "Amazon custom");

        let before = editor.clone();
        editor.apply_import(ImportData::default());
        assert_eq!(editor, before);
    }

    #[tokio::test]
    async fn test_load_defaults_to_builtin_domains() {
        let storage = MemoryStorage::with_data(
            json!({"userRules": {"keywords": ["legacy"], "patterns": []}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let store = RuleStore::new(storage.clone());
        let editor = RuleEditor::load(&store).await;
        assert_eq!(editor.domain_rules(), &builtin_domains());
        assert_eq!(editor.user_rules().keywords, vec![RuleEntry::new("legacy")]);
        assert_eq!(
            storage.snapshot()["userRules"]["keywords"],
            json!([{"value": "legacy", "enabled": true}])
        );
    }

    #[tokio::test]
    async fn test_commit_outcomes() {
        let storage = MemoryStorage::new();
        let store = RuleStore::new(storage.clone());
        let mut editor = RuleEditor::default();

        let outcome = editor
            .add_and_commit(&store, RuleKind::Keyword, "ships to")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::success(messages::KEYWORD_ADDED));
        assert_eq!(store.get_user_rules().await, *editor.user_rules());
        assert!(store.get_domain_rules().await.is_some());

        assert!(editor.add_and_commit(&store, RuleKind::Keyword, " ").await.is_none());

        let outcome = editor
            .delete_many_and_commit(&store, RuleKind::Keyword, &[0])
            .await;
        assert_eq!(outcome.message, "1件のキーワードを削除しました");

        storage.set_failing(true);
        let outcome = editor
            .add_and_commit(&store, RuleKind::Pattern, r"\d+")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::error(messages::SAVE_FAILED));
    }

    #[tokio::test]
    async fn test_import_and_commit() {
        let store = RuleStore::new(MemoryStorage::new());
        let mut editor = editor_with(&["keep"]);

        let outcome = editor.import_and_commit(&store, "[1]").await;
        assert_eq!(outcome, Outcome::error(messages::IMPORT_INVALID));
        let outcome = editor
            .import_and_commit(&store, r#"{"userRules": {"keywords": [1]}}"#)
            .await;
        assert_eq!(outcome.kind, ToastKind::Error);
        assert!(outcome.message.starts_with(messages::IMPORT_FAILED));
        assert_eq!(values(&editor, RuleKind::Keyword), vec!["keep"]);

        let exported = editor.export(chrono::Utc::now()).to_pretty_json().unwrap();
        let mut other = RuleEditor::default();
        let outcome = other.import_and_commit(&store, &exported).await;
        assert_eq!(outcome, Outcome::success(messages::IMPORTED));
        assert_eq!(other.user_rules(), editor.user_rules());
        assert_eq!(store.get_user_rules().await, *editor.user_rules());
    }

    #[tokio::test]
    async fn test_reset_and_commit() {
        let store = RuleStore::new(MemoryStorage::new());
        let mut editor = editor_with(&["a"]);
        editor.general_settings_mut().theme = Theme::Light;
        editor.set_domain_enabled("google", false).unwrap();

        let outcome = editor.reset_and_commit(&store).await;
        assert!(outcome.is_success());
        assert_eq!(editor, RuleEditor::default());
        assert_eq!(store.get_general_settings().await, GeneralSettings::default());
        assert_eq!(store.get_domain_rules().await, Some(builtin_domains()));
    }
}
