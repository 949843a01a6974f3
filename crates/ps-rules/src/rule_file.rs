//! Bundled rule file parsing and validation.

use std::fmt;

use ps_core::config::builtin_domains;
use ps_core::dom::{SelectorError, SelectorList};
use ps_core::types::{DomainRuleSet, DomainRules, RuleFile};

pub fn parse_rule_file(text: &str) -> Result<RuleFile, serde_json::Error> {
    serde_json::from_str(text)
}

/// The built-in table in rule file form.
pub fn builtin_rule_file() -> RuleFile {
    RuleFile {
        domains: builtin_domains(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Works in a browser but not everywhere, or never takes effect.
    Warning,
    /// The rule set cannot work as written.
    Error,
}

/// One problem found in a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleIssue {
    EmptyName { key: String },
    NoMatches { key: String },
    EmptyMatch { key: String },
    EmptySelector { key: String },
    InvalidSelector { key: String, selector: String, reason: String },
    UnsupportedSelector { key: String, selector: String, reason: String },
    /// Every hostname containing `pattern` also contains an earlier set's
    /// match string, so the earlier set always wins.
    ShadowedMatch { key: String, pattern: String, by: String },
}

impl RuleIssue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::EmptyName { .. } | Self::UnsupportedSelector { .. } | Self::ShadowedMatch { .. } => {
                Severity::Warning
            }
            Self::NoMatches { .. }
            | Self::EmptyMatch { .. }
            | Self::EmptySelector { .. }
            | Self::InvalidSelector { .. } => Severity::Error,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::EmptyName { key }
            | Self::NoMatches { key }
            | Self::EmptyMatch { key }
            | Self::EmptySelector { key }
            | Self::InvalidSelector { key, .. }
            | Self::UnsupportedSelector { key, .. }
            | Self::ShadowedMatch { key, .. } => key,
        }
    }
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName { key } => write!(f, "{}: rule set has no name", key),
            Self::NoMatches { key } => write!(f, "{}: rule set matches no hostname", key),
            Self::EmptyMatch { key } => write!(f, "{}: empty match string", key),
            Self::EmptySelector { key } => write!(f, "{}: empty selector", key),
            Self::InvalidSelector { key, selector, reason } => {
                write!(f, "{}: invalid selector `{}`: {}", key, selector, reason)
            }
            Self::UnsupportedSelector { key, selector, reason } => {
                write!(f, "{}: selector `{}` only works in a browser: {}", key, selector, reason)
            }
            Self::ShadowedMatch { key, pattern, by } => {
                write!(f, "{}: match `{}` is always claimed by `{}` first", key, pattern, by)
            }
        }
    }
}

/// Check one rule set on its own.
pub fn validate_rule_set(key: &str, set: &DomainRuleSet) -> Vec<RuleIssue> {
    let mut issues = Vec::new();
    let key_owned = || key.to_string();

    if set.name.trim().is_empty() {
        issues.push(RuleIssue::EmptyName { key: key_owned() });
    }
    if set.matches.is_empty() {
        issues.push(RuleIssue::NoMatches { key: key_owned() });
    }
    if set.matches.iter().any(|m| m.trim().is_empty()) {
        issues.push(RuleIssue::EmptyMatch { key: key_owned() });
    }

    for selector in &set.selectors {
        match SelectorList::parse(selector) {
            Ok(_) => {}
            Err(SelectorError::Empty) => issues.push(RuleIssue::EmptySelector { key: key_owned() }),
            Err(SelectorError::Unsupported { reason, .. }) => {
                issues.push(RuleIssue::UnsupportedSelector {
                    key: key_owned(),
                    selector: selector.clone(),
                    reason: reason.to_string(),
                })
            }
            Err(e) => issues.push(RuleIssue::InvalidSelector {
                key: key_owned(),
                selector: selector.clone(),
                reason: e.to_string(),
            }),
        }
    }
    issues
}

/// Check every rule set, plus match strings shadowed by earlier sets.
pub fn validate_domains(domains: &DomainRules) -> Vec<RuleIssue> {
    let mut issues = Vec::new();
    let entries: Vec<(&str, &DomainRuleSet)> = domains.iter().collect();

    for (index, (key, set)) in entries.iter().enumerate() {
        issues.extend(validate_rule_set(key, set));

        for pattern in set.matches.iter().filter(|m| !m.is_empty()) {
            let shadow = entries[..index].iter().find(|(_, earlier)| {
                earlier
                    .matches
                    .iter()
                    .any(|m| !m.is_empty() && pattern.contains(m.as_str()))
            });
            if let Some((by, _)) = shadow {
                issues.push(RuleIssue::ShadowedMatch {
                    key: key.to_string(),
                    pattern: pattern.clone(),
                    by: by.to_string(),
                });
            }
        }
    }
    issues
}

/// True if no issue is an error.
pub fn is_usable(issues: &[RuleIssue]) -> bool {
    issues.iter().all(|issue| issue.severity() < Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLED: &str = include_str!("../../../assets/rules.json");

    #[test]
    fn test_bundled_file_matches_builtin_table() {
        let file = parse_rule_file(BUNDLED).unwrap();
        assert_eq!(file, builtin_rule_file());
        assert!(validate_domains(&file.domains).is_empty());
    }

    #[test]
    fn test_reports_broken_sets() {
        let set = DomainRuleSet::new("", &[""], &["", "a:hover", "[x", "#ok"]);
        let issues = validate_rule_set("broken", &set);
        assert_eq!(issues.len(), 5);
        assert!(matches!(&issues[4], RuleIssue::InvalidSelector { selector, .. } if selector == "[x"));
        assert_eq!(issues[4].severity(), Severity::Error);
        assert_eq!(
            issues[..4].to_vec(),
            vec![
                RuleIssue::EmptyName { key: "broken".into() },
                RuleIssue::EmptyMatch { key: "broken".into() },
                RuleIssue::EmptySelector { key: "broken".into() },
                RuleIssue::UnsupportedSelector {
                    key: "broken".into(),
                    selector: "a:hover".into(),
                    reason: "pseudo-classes and pseudo-elements".into(),
                },
            ]
        );
        assert!(!is_usable(&issues));
        assert_eq!(issues[0].key(), "broken");
    }

    #[test]
    fn test_detects_shadowed_matches() {
        let mut domains = DomainRules::new();
        domains.insert("google", DomainRuleSet::new("Google", &["google.com"], &[]));
        domains.insert("gemini", DomainRuleSet::new("Gemini", &["gemini.google.com"], &[]));
        let issues = validate_domains(&domains);
        assert_eq!(
            issues,
            vec![RuleIssue::ShadowedMatch {
                key: "gemini".into(),
                pattern: "gemini.google.com".into(),
                by: "google".into(),
            }]
        );
        assert!(is_usable(&issues));
        assert!(issues[0].to_string().contains("always claimed"));
    }

    #[test]
    fn test_no_matches_is_error() {
        let set = DomainRuleSet::new("x", &[], &[]);
        let issues = validate_rule_set("x", &set);
        assert_eq!(issues, vec![RuleIssue::NoMatches { key: "x".into() }]);
        assert_eq!(issues[0].severity(), Severity::Error);
    }
}
