//! Popup view model
//!
//! What the toolbar popup shows for the active tab: the domain and whether it
//! has built-in rules, the global protection switch, and the hidden-item
//! summary the content script last persisted.

use serde_json::Value;

use ps_core::config::{domain_display_name, is_supported_domain, keys, BADGE_COLOR};
use ps_core::message::BadgeRenderer;
use ps_core::store::{RuleStore, StorageArea, StorageChanges};

pub const STATUS_ACTIVE: &str = "保護中";
pub const STATUS_PAUSED: &str = "一時停止";
pub const UNSUPPORTED_LABEL: &str = "未対応";
pub const UNKNOWN_LABEL: &str = "不明";
pub const NO_ITEMS_LABEL: &str = "隠蔽されたアイテムはありません";

/// Hostname of a tab URL with the first `www.` removed.
///
/// `None` if the URL has no scheme. URLs without an authority, such as
/// `about:blank`, have an empty hostname.
pub fn tab_domain(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once(':')?;
    let valid_scheme = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return None;
    }

    let Some(rest) = rest.strip_prefix("//") else {
        return Some(String::new());
    };
    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if host_port.starts_with('[') {
        // IPv6 literal keeps its brackets.
        match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => return None,
        }
    } else {
        host_port.split(':').next().unwrap_or_default()
    };

    Some(host.to_ascii_lowercase().replacen("www.", "", 1))
}

/// Everything the popup renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    /// `None` when the tab URL could not be read.
    pub domain: Option<String>,
    pub display_name: String,
    pub supported: bool,
    /// Protection switch position: the inverse of the paused flag.
    pub active: bool,
    pub hidden_count: usize,
    pub hidden_items: Vec<String>,
}

impl PopupView {
    pub async fn load<S: StorageArea>(store: &RuleStore<S>, tab_url: Option<&str>) -> Self {
        let domain = tab_url.and_then(tab_domain);
        if domain.is_none() {
            log::warn!("Failed to setup domain info: {:?}", tab_url);
        }
        let display_name = domain
            .as_deref()
            .map_or(UNKNOWN_LABEL, domain_display_name)
            .to_string();
        let supported = domain.as_deref().is_some_and(is_supported_domain);

        let paused = store.get_is_paused().await;
        let record = store.get_hidden_record().await;

        Self {
            domain,
            display_name,
            supported,
            active: !paused,
            hidden_count: record.count,
            hidden_items: record.items,
        }
    }

    pub fn status_text(&self) -> &'static str {
        if self.active {
            STATUS_ACTIVE
        } else {
            STATUS_PAUSED
        }
    }

    /// Label for the domain badge, or `None` for a supported domain.
    pub fn domain_badge(&self) -> Option<&'static str> {
        match (&self.domain, self.supported) {
            (None, _) => Some(UNKNOWN_LABEL),
            (Some(_), false) => Some(UNSUPPORTED_LABEL),
            (Some(_), true) => None,
        }
    }

    /// Follow hidden-item updates from the content script. Returns true if
    /// anything changed.
    pub fn apply_change(&mut self, changes: &StorageChanges) -> bool {
        if !changes.is_local() {
            return false;
        }
        let mut changed = false;
        if let Some(change) = changes.get(keys::HIDDEN_COUNT) {
            self.hidden_count = change
                .new_value
                .as_ref()
                .and_then(Value::as_u64)
                .map_or(0, |n| n as usize);
            changed = true;
        }
        if let Some(change) = changes.get(keys::HIDDEN_ITEMS) {
            self.hidden_items = match &change.new_value {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            changed = true;
        }
        changed
    }

    /// Flip the switch and persist it.
    pub async fn set_active<S: StorageArea, G: BadgeRenderer>(
        &mut self,
        store: &RuleStore<S>,
        badge: &G,
        active: bool,
    ) -> bool {
        let ok = toggle_protection(store, badge, active).await;
        if ok {
            self.active = active;
        }
        ok
    }
}

/// Store the paused flag for a switch position. Turning protection off also
/// clears the global badge.
pub async fn toggle_protection<S: StorageArea, G: BadgeRenderer>(
    store: &RuleStore<S>,
    badge: &G,
    active: bool,
) -> bool {
    let ok = store.set_is_paused(!active).await;
    if !active {
        badge.set_badge("", BADGE_COLOR, None);
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::store::{MemoryStorage, ValueChange};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingBadge {
        calls: RefCell<Vec<(String, Option<i32>)>>,
    }

    impl BadgeRenderer for RecordingBadge {
        fn set_badge(&self, text: &str, _color: &str, tab_id: Option<i32>) {
            self.calls.borrow_mut().push((text.to_string(), tab_id));
        }
    }

    #[test]
    fn test_tab_domain() {
        assert_eq!(tab_domain("https://www.amazon.co.jp/dp/1?x=1").as_deref(), Some("amazon.co.jp"));
        assert_eq!(tab_domain("https://user:pw@Gemini.Google.com:8443/app").as_deref(), Some("gemini.google.com"));
        assert_eq!(tab_domain("http://shop.www.example/").as_deref(), Some("shop.example"));
        assert_eq!(tab_domain("http://[::1]:80/").as_deref(), Some("[::1]"));
        assert_eq!(tab_domain("about:blank").as_deref(), Some(""));
        assert_eq!(tab_domain("not a url"), None);
        assert_eq!(tab_domain(""), None);
    }

    #[tokio::test]
    async fn test_load_supported_tab() {
        let storage = MemoryStorage::new();
        let store = RuleStore::new(storage.clone());
        store
            .set_hidden_data(2, &["123-4567".to_string(), "Tokyo".to_string()])
            .await;

        let view = PopupView::load(&store, Some("https://www.amazon.co.jp/")).await;
        assert_eq!(view.domain.as_deref(), Some("amazon.co.jp"));
        assert_eq!(view.display_name, "Amazon.co.jp");
        // Built-in match strings carry `www.`, so the stripped domain misses them.
        assert!(!view.supported);
        assert!(view.active);
        assert_eq!(view.status_text(), STATUS_ACTIVE);
        assert_eq!(view.hidden_count, 2);
        assert_eq!(view.hidden_items, vec!["123-4567", "Tokyo"]);

        let gemini = PopupView::load(&store, Some("https://gemini.google.com/app")).await;
        assert!(gemini.supported);
        assert_eq!(gemini.domain_badge(), None);
    }

    #[tokio::test]
    async fn test_load_unknown_tab() {
        let store = RuleStore::new(MemoryStorage::new());
        store.set_is_paused(true).await;
        let view = PopupView::load(&store, None).await;
        assert_eq!(view.display_name, UNKNOWN_LABEL);
        assert_eq!(view.domain_badge(), Some(UNKNOWN_LABEL));
        assert_eq!(view.status_text(), STATUS_PAUSED);
        assert_eq!(view.hidden_count, 0);

        let other = PopupView::load(&store, Some("https://example.com/")).await;
        assert_eq!(other.display_name, "example.com");
        assert_eq!(other.domain_badge(), Some(UNSUPPORTED_LABEL));
    }

    #[tokio::test]
    async fn test_toggle_protection() {
        let storage = MemoryStorage::new();
        let store = RuleStore::new(storage.clone());
        let badge = RecordingBadge::default();
        let mut view = PopupView::load(&store, Some("https://gemini.google.com/")).await;

        assert!(view.set_active(&store, &badge, false).await);
        assert!(!view.active);
        assert_eq!(storage.snapshot()["isPaused"], json!(true));
        assert_eq!(*badge.calls.borrow(), vec![(String::new(), None)]);

        assert!(toggle_protection(&store, &badge, true).await);
        assert_eq!(storage.snapshot()["isPaused"], json!(false));
        assert_eq!(badge.calls.borrow().len(), 1);

        storage.set_failing(true);
        assert!(!view.set_active(&store, &badge, true).await);
        assert!(!view.active);
    }

    #[tokio::test]
    async fn test_apply_change() {
        let store = RuleStore::new(MemoryStorage::new());
        let mut view = PopupView::load(&store, Some("https://example.com/")).await;

        let mut changes = BTreeMap::new();
        changes.insert(
            "hiddenCount".to_string(),
            ValueChange {
                old_value: None,
                new_value: Some(json!(3)),
            },
        );
        changes.insert(
            "hiddenItems".to_string(),
            ValueChange {
                old_value: None,
                new_value: Some(json!(["a", "b", "c"])),
            },
        );
        assert!(view.apply_change(&StorageChanges::local(changes.clone())));
        assert_eq!(view.hidden_count, 3);
        assert_eq!(view.hidden_items.len(), 3);

        let sync = StorageChanges {
            area: "sync".to_string(),
            changes: changes.clone(),
        };
        assert!(!view.apply_change(&sync));

        let mut cleared = BTreeMap::new();
        cleared.insert(
            "hiddenItems".to_string(),
            ValueChange {
                old_value: Some(json!(["a"])),
                new_value: None,
            },
        );
        assert!(view.apply_change(&StorageChanges::local(cleared)));
        assert!(view.hidden_items.is_empty());
        assert_eq!(view.hidden_count, 3);
    }
}
