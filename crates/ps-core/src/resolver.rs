//! Domain Rule Resolution
//!
//! Finds the selector rules for a hostname by consulting, in order, the rules
//! the user saved, the rule file bundled with the extension and the built-in
//! table. Also validates and compiles user patterns.

use fancy_regex::Regex;

use crate::config::builtin_domains;
use crate::store::{RuleStore, StorageArea};
use crate::types::{DomainRuleSet, DomainRules, RuleEntry, RuleFile};

// =============================================================================
// Bundled Rules
// =============================================================================

/// Error type for loading the bundled rule resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Bundled rules not available: {0}")]
    Missing(String),
    #[error("Failed to fetch bundled rules: {0}")]
    Fetch(String),
    #[error("Bundled rules are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read bundled rules: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the rule file shipped with the extension.
#[allow(async_fn_in_trait)]
pub trait BundledRules {
    async fn load(&self) -> Result<RuleFile, ResourceError>;
}

/// No bundled resource; resolution goes straight to the built-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBundledRules;

impl BundledRules for NoBundledRules {
    async fn load(&self) -> Result<RuleFile, ResourceError> {
        Err(ResourceError::Missing("no rule resource configured".to_string()))
    }
}

impl BundledRules for RuleFile {
    async fn load(&self) -> Result<RuleFile, ResourceError> {
        Ok(self.clone())
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Where a resolved rule set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTier {
    Stored,
    Bundled,
    BuiltIn,
}

impl RuleTier {
    /// Lookup order, highest priority first.
    pub const ORDER: [RuleTier; 3] = [RuleTier::Stored, RuleTier::Bundled, RuleTier::BuiltIn];
}

/// Three-tier domain rule resolver.
pub struct Resolver<B> {
    bundled: B,
}

impl<B: BundledRules> Resolver<B> {
    pub fn new(bundled: B) -> Self {
        Self { bundled }
    }

    /// Resolve the rule set for `hostname`, or `None` if no tier knows it.
    ///
    /// Within a tier the first entry in stored order wins. Never fails: a tier
    /// that cannot be loaded is skipped.
    pub async fn resolve_domain_rules<S: StorageArea>(
        &self,
        store: &RuleStore<S>,
        hostname: &str,
    ) -> Option<DomainRuleSet> {
        self.resolve_with_tier(store, hostname)
            .await
            .map(|(_, rules)| rules)
    }

    /// Same as [`Self::resolve_domain_rules`], also reporting the tier.
    pub async fn resolve_with_tier<S: StorageArea>(
        &self,
        store: &RuleStore<S>,
        hostname: &str,
    ) -> Option<(RuleTier, DomainRuleSet)> {
        for tier in RuleTier::ORDER {
            let Some(rules) = self.load_tier(store, tier).await else {
                continue;
            };
            if let Some((key, set)) = rules.find_for_host(hostname) {
                log::debug!("Resolved `{}` to rule set `{}` ({:?})", hostname, key, tier);
                return Some((tier, set.clone()));
            }
        }
        None
    }

    async fn load_tier<S: StorageArea>(
        &self,
        store: &RuleStore<S>,
        tier: RuleTier,
    ) -> Option<DomainRules> {
        match tier {
            RuleTier::Stored => store.get_domain_rules().await,
            RuleTier::Bundled => match self.bundled.load().await {
                Ok(file) => Some(file.domains),
                Err(e) => {
                    log::warn!("Failed to fetch default rules, using built-in config: {}", e);
                    None
                }
            },
            RuleTier::BuiltIn => Some(builtin_domains()),
        }
    }
}

/// Enabled unless the set explicitly says otherwise.
pub fn is_domain_enabled(rules: &DomainRuleSet) -> bool {
    rules.is_enabled()
}

// =============================================================================
// Patterns
// =============================================================================

/// Compile one pattern string. Lookaround and backreferences are accepted.
pub fn compile_pattern(pattern: &str) -> Result<Regex, fancy_regex::Error> {
    Regex::new(pattern)
}

/// Run a compiled pattern against one text node. A match that gives up on
/// its backtracking limit counts as no match.
pub fn pattern_matches(regex: &Regex, text: &str) -> bool {
    regex.is_match(text).unwrap_or_else(|e| {
        log::debug!("Pattern `{}` gave up: {}", regex.as_str(), e);
        false
    })
}

/// True if `pattern` compiles.
pub fn is_valid_pattern(pattern: &str) -> bool {
    compile_pattern(pattern).is_ok()
}

/// Compile the enabled entries, in order. Entries that fail to compile are
/// logged and skipped; they never abort the batch.
pub fn compile_patterns(entries: &[RuleEntry]) -> Vec<Regex> {
    entries
        .iter()
        .filter(|entry| entry.is_enabled() && !entry.value().is_empty())
        .filter_map(|entry| match compile_pattern(entry.value()) {
            Ok(regex) => Some(regex),
            Err(e) => {
                log::warn!("Invalid pattern `{}`: {}", entry.value(), e);
                None
            }
        })
        .collect()
}

/// Every match of `pattern` in `text`, for the pattern tester. `None` if the
/// pattern is invalid.
pub fn test_pattern(pattern: &str, text: &str) -> Option<Vec<String>> {
    match compile_pattern(pattern) {
        Ok(regex) => Some(
            regex
                .find_iter(text)
                .filter_map(Result::ok)
                .map(|m| m.as_str().to_string())
                .collect(),
        ),
        Err(e) => {
            log::warn!("Pattern test failed: {}", e);
            None
        }
    }
}
