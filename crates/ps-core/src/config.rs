//! Constants and the built-in domain table.

use crate::types::{DomainRuleSet, DomainRules};

// =============================================================================
// Engine Tuning
// =============================================================================

/// A matched element is widened to its parent only while its own text stays
/// under this many characters...
pub const MAX_TEXT_LENGTH_SMALL: usize = 100;

/// ...and the parent's text stays under this many.
pub const MAX_TEXT_LENGTH_LARGE: usize = 200;

/// Maximum descriptor length shown in the popup.
pub const PREVIEW_TEXT_LENGTH: usize = 50;

/// Quiet period before the hidden-item set is persisted.
pub const SAVE_DEBOUNCE_DELAY_MS: u64 = 500;

/// How long the "protected" toast stays on screen.
pub const TOAST_DURATION_MS: u64 = 3000;

/// Fade-out time before the toast element is removed.
pub const TOAST_ANIMATION_DURATION_MS: u64 = 300;

pub const TOAST_MESSAGE: &str = "プライバシーを保護しました";

// =============================================================================
// DOM Conventions
// =============================================================================

pub const HIDDEN_MARKER_ATTR: &str = "data-privacy-hidden";
pub const PAUSED_BODY_CLASS: &str = "privacy-guard-paused";
pub const TOAST_ELEMENT_ID: &str = "privacy-guard-toast";
pub const TOAST_CONTENT_CLASS: &str = "pg-toast-content";
pub const TOAST_SHOW_CLASS: &str = "pg-toast-show";
pub const TOAST_HIDE_CLASS: &str = "pg-toast-hide";
pub const LANDMARK_ROLE: &str = "contentinfo";
pub const FALLBACK_ITEM_TEXT: &str = "Hidden Item";

// =============================================================================
// Extension Surface
// =============================================================================

pub const BADGE_COLOR: &str = "#6366f1";
pub const CONFIG_VERSION: &str = "1.0";
pub const BUNDLED_RULES_PATH: &str = "rules.json";

/// Keys in the extension's local storage area.
pub mod keys {
    pub const IS_PAUSED: &str = "isPaused";
    pub const HIDDEN_COUNT: &str = "hiddenCount";
    pub const HIDDEN_ITEMS: &str = "hiddenItems";
    pub const USER_RULES: &str = "userRules";
    pub const DOMAIN_RULES: &str = "domainRules";
    pub const GENERAL_SETTINGS: &str = "generalSettings";
}

// =============================================================================
// Built-in Domains
// =============================================================================

/// Friendly names for the popup, matched by hostname substring in order.
pub const DOMAIN_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("gemini.google.com", "Google Gemini"),
    ("google.com", "Google Search"),
    ("google.co.jp", "Google Search"),
    ("amazon.co.jp", "Amazon.co.jp"),
];

/// Last-resort rule table used when neither storage nor the bundled rule file
/// knows the hostname.
pub fn builtin_domains() -> DomainRules {
    let mut rules = DomainRules::new();
    rules.insert(
        "google",
        DomainRuleSet::new(
            "Google Search",
            &["www.google.com", "www.google.co.jp"],
            &[".O4T6Pe", ".vqkKIe", ".eKPi4", "update-location", ".dfB0uf"],
        ),
    );
    rules.insert(
        "gemini",
        DomainRuleSet::new(
            "Google Gemini",
            &["gemini.google.com"],
            &["location-footer", ".location-menu-item-container"],
        ),
    );
    rules.insert(
        "amazon",
        DomainRuleSet::new(
            "Amazon.co.jp",
            &["www.amazon.co.jp"],
            &[
                "#nav-global-location-popover-link",
                "#glow-ingress-block",
                "#contextualIngressPtLink",
                "#contextualIngressPtLabel",
                "#contextualIngressPtLabel_deliveryShortLine",
                ".insert-encrypted-trigger-text",
                "[data-component=\"shippingAddress\"]",
            ],
        ),
    );
    rules
}

/// Friendly display name for a hostname, or the hostname itself.
pub fn domain_display_name(domain: &str) -> &str {
    DOMAIN_DISPLAY_NAMES
        .iter()
        .find(|(key, _)| domain.contains(key))
        .map(|(_, name)| *name)
        .unwrap_or(domain)
}

/// True if any built-in domain matches the hostname.
pub fn is_supported_domain(domain: &str) -> bool {
    builtin_domains()
        .iter()
        .any(|(_, rules)| rules.matches_host(domain))
}
