//! Core type definitions for Privacy Shield
//!
//! These types map directly to the JSON values kept in extension storage and
//! exchanged between extension contexts.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Rule Entries
// =============================================================================

/// A keyword or pattern rule that can be switched on and off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleEntry {
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A user rule as stored.
///
/// Older versions stored bare strings; those are always enabled and are
/// normalized to [`ToggleEntry`] on first load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    Toggle(ToggleEntry),
    Legacy(String),
}

impl RuleEntry {
    /// Create an enabled entry.
    pub fn new(value: impl Into<String>) -> Self {
        Self::Toggle(ToggleEntry {
            value: value.into(),
            enabled: true,
        })
    }

    /// Create an entry with an explicit enabled flag.
    pub fn with_enabled(value: impl Into<String>, enabled: bool) -> Self {
        Self::Toggle(ToggleEntry {
            value: value.into(),
            enabled,
        })
    }

    /// The keyword or pattern text.
    pub fn value(&self) -> &str {
        match self {
            Self::Toggle(entry) => &entry.value,
            Self::Legacy(value) => value,
        }
    }

    /// Legacy entries are always enabled.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Toggle(entry) => entry.enabled,
            Self::Legacy(_) => true,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// Set the enabled flag, upgrading a legacy entry on the way.
    pub fn set_enabled(&mut self, enabled: bool) {
        match self {
            Self::Toggle(entry) => entry.enabled = enabled,
            Self::Legacy(value) => {
                *self = Self::with_enabled(std::mem::take(value), enabled);
            }
        }
    }

    /// Convert a legacy entry into its toggleable form. Returns true if the
    /// entry changed.
    pub fn normalize(&mut self) -> bool {
        if let Self::Legacy(value) = self {
            *self = Self::new(std::mem::take(value));
            true
        } else {
            false
        }
    }
}

// =============================================================================
// User Rules
// =============================================================================

/// Keyword and pattern rules supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRules {
    #[serde(default)]
    pub keywords: Vec<RuleEntry>,
    #[serde(default)]
    pub patterns: Vec<RuleEntry>,
}

impl UserRules {
    /// True if any entry in either list still uses the legacy string form.
    pub fn needs_migration(&self) -> bool {
        self.keywords
            .iter()
            .chain(self.patterns.iter())
            .any(RuleEntry::is_legacy)
    }

    /// Normalize every legacy entry. Returns true if anything changed.
    pub fn migrate(&mut self) -> bool {
        let mut changed = false;
        for entry in self.keywords.iter_mut().chain(self.patterns.iter_mut()) {
            changed |= entry.normalize();
        }
        changed
    }

    /// Enabled keyword values, in list order.
    pub fn enabled_keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .iter()
            .filter(|entry| entry.is_enabled())
            .map(RuleEntry::value)
            .filter(|value| !value.is_empty())
    }
}

// =============================================================================
// Domain Rules
// =============================================================================

/// Selector rules for one site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRuleSet {
    #[serde(default)]
    pub name: String,
    /// Hostname substrings, not URL patterns.
    #[serde(default)]
    pub matches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub selectors: Vec<String>,
}

impl DomainRuleSet {
    pub fn new(name: &str, matches: &[&str], selectors: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            matches: matches.iter().map(|m| m.to_string()).collect(),
            enabled: Some(true),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Enabled unless explicitly set to false.
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    /// True if the hostname contains any of the match strings.
    pub fn matches_host(&self, hostname: &str) -> bool {
        self.matches
            .iter()
            .any(|m| !m.is_empty() && hostname.contains(m.as_str()))
    }
}

/// Domain rule sets keyed by identifier, in insertion order.
///
/// Lookup order matters: the first set whose match strings hit a hostname wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRules {
    entries: Vec<(String, DomainRuleSet)>,
}

impl DomainRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace a set. A replaced set keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, rules: DomainRuleSet) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = rules;
        } else {
            self.entries.push((key, rules));
        }
    }

    pub fn get(&self, key: &str) -> Option<&DomainRuleSet> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DomainRuleSet> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<DomainRuleSet> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DomainRuleSet)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// First set (in order) whose match strings are contained in `hostname`.
    pub fn find_for_host(&self, hostname: &str) -> Option<(&str, &DomainRuleSet)> {
        self.iter().find(|(_, rules)| rules.matches_host(hostname))
    }

    /// Shallow merge: entries from `other` replace same-key entries, new keys
    /// are appended.
    pub fn merge(&mut self, other: DomainRules) {
        for (key, rules) in other.entries {
            self.insert(key, rules);
        }
    }
}

impl FromIterator<(String, DomainRuleSet)> for DomainRules {
    fn from_iter<I: IntoIterator<Item = (String, DomainRuleSet)>>(iter: I) -> Self {
        let mut rules = DomainRules::new();
        for (key, set) in iter {
            rules.insert(key, set);
        }
        rules
    }
}

impl Serialize for DomainRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, rules) in &self.entries {
            map.serialize_entry(key, rules)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DomainRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DomainRulesVisitor;

        impl<'de> Visitor<'de> for DomainRulesVisitor {
            type Value = DomainRules;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of domain rule sets")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DomainRules, A::Error> {
                let mut rules = DomainRules::new();
                while let Some((key, set)) = access.next_entry::<String, DomainRuleSet>()? {
                    rules.insert(key, set);
                }
                Ok(rules)
            }
        }

        deserializer.deserialize_map(DomainRulesVisitor)
    }
}

/// Bundled rule resource shipped with the extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub domains: DomainRules,
}

// =============================================================================
// Hidden Items & Settings
// =============================================================================

/// Hidden-item summary persisted for the popup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenRecord {
    pub count: usize,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Settings owned by the options page; the engine never reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_enabled")]
    pub show_badge: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            show_badge: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_entry_accepts_both_forms() {
        let entries: Vec<RuleEntry> =
            serde_json::from_str(r#"["ships to", {"value": "Main St", "enabled": false}]"#).unwrap();
        assert_eq!(entries[0], RuleEntry::Legacy("ships to".into()));
        assert!(entries[0].is_enabled());
        assert_eq!(entries[1].value(), "Main St");
        assert!(!entries[1].is_enabled());
    }

    #[test]
    fn test_toggle_entry_defaults_enabled() {
        let entry: RuleEntry = serde_json::from_str(r#"{"value": "zip"}"#).unwrap();
        assert!(entry.is_enabled());
        assert!(!entry.is_legacy());
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut rules = UserRules {
            keywords: vec![RuleEntry::Legacy("a".into()), RuleEntry::new("b")],
            patterns: vec![RuleEntry::Legacy(r"\d+".into())],
        };
        assert!(rules.needs_migration());
        assert!(rules.migrate());
        assert!(!rules.needs_migration());
        assert_eq!(rules.keywords[0], RuleEntry::new("a"));
        assert_eq!(rules.patterns[0], RuleEntry::new(r"\d+"));
        assert!(!rules.migrate());
    }

    #[test]
    fn test_set_enabled_upgrades_legacy() {
        let mut entry = RuleEntry::Legacy("x".into());
        entry.set_enabled(false);
        assert_eq!(entry, RuleEntry::with_enabled("x", false));
    }

    #[test]
    fn test_enabled_keywords_skips_disabled() {
        let rules = UserRules {
            keywords: vec![
                RuleEntry::new("one"),
                RuleEntry::with_enabled("two", false),
                RuleEntry::Legacy("three".into()),
            ],
            patterns: vec![],
        };
        let active: Vec<&str> = rules.enabled_keywords().collect();
        assert_eq!(active, vec!["one", "three"]);
    }

    #[test]
    fn test_domain_enabled_defaults_true() {
        let set: DomainRuleSet =
            serde_json::from_str(r#"{"name": "x", "matches": ["x.com"], "selectors": []}"#).unwrap();
        assert!(set.is_enabled());
        let set: DomainRuleSet = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert!(!set.is_enabled());
    }

    #[test]
    fn test_domain_rules_keep_order() {
        let json = r#"{"zeta": {"matches": ["a.com"]}, "alpha": {"matches": ["a.com"]}}"#;
        let rules: DomainRules = serde_json::from_str(json).unwrap();
        assert_eq!(rules.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(rules.find_for_host("www.a.com").map(|(k, _)| k), Some("zeta"));

        let out = serde_json::to_string(&rules).unwrap();
        assert!(out.find("zeta").unwrap() < out.find("alpha").unwrap());
    }

    #[test]
    fn test_domain_rules_merge_is_shallow() {
        let mut base: DomainRules = [
            ("a".to_string(), DomainRuleSet::new("A", &["a.com"], &[".x"])),
            ("b".to_string(), DomainRuleSet::new("B", &["b.com"], &[".y"])),
        ]
        .into_iter()
        .collect();
        let incoming: DomainRules = [
            ("b".to_string(), DomainRuleSet::new("B2", &["b.org"], &[])),
            ("c".to_string(), DomainRuleSet::new("C", &["c.com"], &[])),
        ]
        .into_iter()
        .collect();
        base.merge(incoming);
        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(base.get("b").unwrap().name, "B2");
        assert!(base.get("b").unwrap().selectors.is_empty());
    }

    #[test]
    fn test_general_settings_wire_names() {
        let json = serde_json::to_value(GeneralSettings::default()).unwrap();
        assert_eq!(json, serde_json::json!({"theme": "dark", "showBadge": true}));
    }
}
