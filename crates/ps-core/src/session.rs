//! Per-page reactive session
//!
//! A [`PageSession`] is created when the content script is injected and
//! dropped on navigation. It owns everything the page needs: the document,
//! the current pause flag and rules, the resolved domain rule set, the hiding
//! engine with its hidden-item set, and the save and toast timers.
//!
//! The host feeds it three kinds of input from a single consumer, so scans
//! never overlap:
//!
//! - store change notifications ([`PageSession::handle_storage_change`])
//! - DOM mutations ([`PageSession::handle_mutation`])
//! - timer ticks ([`PageSession::tick`]), at or after [`PageSession::next_deadline`]

use serde_json::Value;

use crate::config::{keys, PAUSED_BODY_CLASS, SAVE_DEBOUNCE_DELAY_MS, TOAST_MESSAGE};
use crate::dom::Document;
use crate::engine::{unhide_all, ActiveRules, HiddenItems, HidingEngine, ScanReport};
use crate::message::{MessageSink, Request};
use crate::resolver::{BundledRules, Resolver};
use crate::store::{RuleStore, StorageArea, StorageChanges};
use crate::timer::{earliest, Debouncer, ToastAction, ToastTimer};
use crate::types::{DomainRuleSet, UserRules};

bitflags::bitflags! {
    /// Store keys touched by one change notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeSet: u8 {
        const PAUSE = 1 << 0;
        const USER_RULES = 1 << 1;
        const DOMAIN_RULES = 1 << 2;
    }
}

impl ChangeSet {
    /// Classify a notification. Other areas, and keys the session never
    /// reacts to such as its own hidden count and items, yield an empty set.
    pub fn from_changes(changes: &StorageChanges) -> Self {
        let mut set = ChangeSet::empty();
        if !changes.is_local() {
            return set;
        }
        if changes.contains(keys::IS_PAUSED) {
            set |= ChangeSet::PAUSE;
        }
        if changes.contains(keys::USER_RULES) {
            set |= ChangeSet::USER_RULES;
        }
        if changes.contains(keys::DOMAIN_RULES) {
            set |= ChangeSet::DOMAIN_RULES;
        }
        set
    }
}

pub struct PageSession<D, S, B, M> {
    hostname: String,
    doc: D,
    store: RuleStore<S>,
    resolver: Resolver<B>,
    messenger: M,
    is_paused: bool,
    user_rules: UserRules,
    active: ActiveRules,
    domain_rules: Option<DomainRuleSet>,
    engine: HidingEngine,
    save: Debouncer,
    toast: ToastTimer,
}

impl<D, S, B, M> PageSession<D, S, B, M>
where
    D: Document,
    S: StorageArea,
    B: BundledRules,
    M: MessageSink,
{
    pub fn new(
        hostname: impl Into<String>,
        doc: D,
        store: RuleStore<S>,
        resolver: Resolver<B>,
        messenger: M,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            doc,
            store,
            resolver,
            messenger,
            is_paused: false,
            user_rules: UserRules::default(),
            active: ActiveRules::default(),
            domain_rules: None,
            engine: HidingEngine::new(),
            save: Debouncer::new(SAVE_DEBOUNCE_DELAY_MS),
            toast: ToastTimer::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    pub fn into_document(self) -> D {
        self.doc
    }

    pub fn store(&self) -> &RuleStore<S> {
        &self.store
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn user_rules(&self) -> &UserRules {
        &self.user_rules
    }

    pub fn domain_rules(&self) -> Option<&DomainRuleSet> {
        self.domain_rules.as_ref()
    }

    pub fn hidden_items(&self) -> &HiddenItems {
        self.engine.hidden_items()
    }

    pub fn toast_shown(&self) -> bool {
        self.toast.was_shown()
    }

    /// When the host should next call [`Self::tick`].
    pub fn next_deadline(&self) -> Option<u64> {
        earliest(&[self.save.deadline(), self.toast.deadline()])
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load state, resolve the domain and run the first pass.
    pub async fn start(&mut self, now: u64) -> ScanReport {
        self.is_paused = self.store.get_is_paused().await;
        let user_rules = self.store.load_user_rules().await;
        self.adopt_user_rules(user_rules);
        self.load_domain_rules().await;
        self.update_body_class();

        match &self.domain_rules {
            Some(rules) => log::info!("Protecting {} with rule set `{}`", self.hostname, rules.name),
            None => log::debug!("No rule set for {}", self.hostname),
        }

        if self.is_paused {
            ScanReport::default()
        } else {
            self.run_hiding_logic(now)
        }
    }

    /// React to a store change notification. Only the local area matters.
    pub async fn handle_storage_change(&mut self, changes: &StorageChanges, now: u64) {
        let set = ChangeSet::from_changes(changes);
        if set.is_empty() {
            return;
        }

        if set.contains(ChangeSet::PAUSE) {
            let paused = changes
                .get(keys::IS_PAUSED)
                .and_then(|c| c.new_value.as_ref())
                .and_then(Value::as_bool)
                .unwrap_or(false);
            self.set_paused(paused, now);
        }

        if set.contains(ChangeSet::USER_RULES) {
            let rules = changes
                .get(keys::USER_RULES)
                .and_then(|c| c.new_value.clone())
                .map(decode_user_rules)
                .unwrap_or_default();
            self.adopt_user_rules(rules);
            if !self.is_paused {
                self.run_hiding_logic(now);
            }
        }

        if set.contains(ChangeSet::DOMAIN_RULES) {
            self.load_domain_rules().await;
            if !self.is_paused {
                self.run_hiding_logic(now);
            }
        }
    }

    /// The page changed; re-evaluate it unless paused.
    pub fn handle_mutation(&mut self, now: u64) -> ScanReport {
        if self.is_paused {
            return ScanReport::default();
        }
        self.run_hiding_logic(now)
    }

    /// Fire every timer that is due at `now`.
    pub async fn tick(&mut self, now: u64) {
        if self.save.fire_due(now) {
            self.flush().await;
        }
        while let Some(action) = self.toast.advance(now) {
            match action {
                ToastAction::Fade => self.doc.fade_toast(),
                ToastAction::Remove => self.doc.remove_toast(),
            }
        }
    }

    /// Persist the hidden-item set now and update the badge.
    pub async fn flush(&mut self) -> bool {
        self.save.cancel();
        let items = self.engine.hidden_items().items();
        let ok = self.store.set_hidden_data(items.len(), items).await;
        if !ok {
            log::error!("Failed to save hidden items");
        }
        self.messenger.send(Request::UpdateCount { count: items.len() });
        ok
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// One scan, if the page is active and has an enabled rule set.
    pub fn run_hiding_logic(&mut self, now: u64) -> ScanReport {
        if self.is_paused {
            return ScanReport::default();
        }
        let Some(domain) = self.domain_rules.as_ref() else {
            return ScanReport::default();
        };
        let report = self.engine.scan(&mut self.doc, domain, &self.active);
        if report.changed() {
            self.save.schedule(now);
            if self.toast.show(now) {
                self.doc.show_toast(TOAST_MESSAGE);
            }
        }
        report
    }

    fn set_paused(&mut self, paused: bool, now: u64) {
        self.is_paused = paused;
        self.update_body_class();
        if paused {
            let restored = unhide_all(&mut self.doc);
            log::debug!("Paused: restored {} element(s)", restored);
            self.engine.reset();
            self.save.cancel();
            self.messenger.send(Request::UpdateCount { count: 0 });
        } else {
            self.run_hiding_logic(now);
        }
    }

    fn adopt_user_rules(&mut self, mut rules: UserRules) {
        rules.migrate();
        self.active = ActiveRules::compile(&rules);
        self.user_rules = rules;
    }

    async fn load_domain_rules(&mut self) {
        self.domain_rules = self
            .resolver
            .resolve_domain_rules(&self.store, &self.hostname)
            .await;
    }

    fn update_body_class(&mut self) {
        self.doc.set_body_class(PAUSED_BODY_CLASS, self.is_paused);
    }
}

fn decode_user_rules(value: Value) -> UserRules {
    if value.is_null() {
        return UserRules::default();
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed user rules update: {}", e);
        UserRules::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, HIDDEN_MARKER_ATTR};
    use crate::dom::{NodeId, PageTree, ToastState};
    use crate::resolver::NoBundledRules;
    use crate::store::{MemoryStorage, ValueChange, LOCAL_AREA};
    use crate::types::{DomainRuleSet, DomainRules, RuleEntry};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::mpsc::Receiver;

    #[derive(Clone, Default)]
    struct Outbox(Rc<RefCell<Vec<Request>>>);

    impl MessageSink for Outbox {
        fn send(&self, request: Request) {
            self.0.borrow_mut().push(request);
        }
    }

    impl Outbox {
        fn counts(&self) -> Vec<usize> {
            self.0
                .borrow()
                .iter()
                .filter_map(|r| match r {
                    Request::UpdateCount { count } => Some(*count),
                    _ => None,
                })
                .collect()
        }
    }

    type Session = PageSession<PageTree, MemoryStorage, NoBundledRules, Outbox>;

    const HOST: &str = "www.amazon.co.jp";

    struct Fixture {
        session: Session,
        storage: MemoryStorage,
        changes: Receiver<StorageChanges>,
        outbox: Outbox,
        location: NodeId,
        order: NodeId,
    }

    impl Fixture {
        /// Feed every pending store notification to the session.
        async fn pump(&mut self, now: u64) {
            while let Ok(changes) = self.changes.try_recv() {
                self.session.handle_storage_change(&changes, now).await;
            }
        }

        fn marked(&self) -> Vec<NodeId> {
            self.session.document().marked_elements()
        }
    }

    /// An Amazon-like page: the location widget (matched by a built-in
    /// selector) and an order line (matched by a keyword).
    fn page() -> (PageTree, NodeId, NodeId) {
        let mut tree = PageTree::new();
        let body = tree.body();
        let nav = tree.append_element(body, "div", &[("id", "nav")]);
        let location = tree.append_element(nav, "div", &[("id", "glow-ingress-block")]);
        tree.append_text(location, "お届け先: 東京都 150-0001");
        let main = tree.append_element(body, "main", &[]);
        let shell = tree.append_element(main, "p", &[]);
        tree.append_text(shell, &"Recommended for you. ".repeat(12));
        let order = tree.append_element(main, "p", &[]);
        tree.append_text(order, "Your order ships to 123 Main St");
        (tree, location, order)
    }

    async fn fixture(initial: serde_json::Value) -> Fixture {
        let storage = MemoryStorage::with_data(initial.as_object().cloned().unwrap());
        let changes = storage.subscribe();
        let outbox = Outbox::default();
        let (tree, location, order) = page();
        let session = PageSession::new(
            HOST,
            tree,
            RuleStore::new(storage.clone()),
            Resolver::new(NoBundledRules),
            outbox.clone(),
        );
        Fixture {
            session,
            storage,
            changes,
            outbox,
            location,
            order,
        }
    }

    fn keyword_rules(keyword: &str) -> serde_json::Value {
        json!({"keywords": [{"value": keyword, "enabled": true}], "patterns": []})
    }

    #[tokio::test]
    async fn test_start_hides_and_debounces_save() {
        let mut f = fixture(json!({"userRules": keyword_rules("ships to")})).await;
        let report = f.session.start(0).await;
        assert_eq!(report.selector_hits, 1);
        assert_eq!(report.keyword_hits, 1);
        assert_eq!(f.marked(), vec![f.location, f.order]);
        assert_eq!(f.session.next_deadline(), Some(500));

        f.session.tick(499).await;
        assert!(f.storage.snapshot().get(keys::HIDDEN_COUNT).is_none());

        f.session.tick(500).await;
        let snapshot = f.storage.snapshot();
        assert_eq!(snapshot[keys::HIDDEN_COUNT], json!(2));
        assert_eq!(
            snapshot[keys::HIDDEN_ITEMS],
            json!(["お届け先: 東京都 150-0001", "Your order ships to 123 Main St"])
        );
        assert_eq!(f.outbox.counts(), vec![2]);
    }

    #[tokio::test]
    async fn test_mutation_bursts_coalesce_into_one_save() {
        let mut f = fixture(json!({"userRules": keyword_rules("ships to")})).await;
        f.session.start(0).await;

        let body = f.session.document().body();
        let late = f.session.document_mut().append_element(body, "p", &[]);
        f.session.document_mut().append_text(late, "Gift ships to Osaka");
        assert!(f.session.handle_mutation(300).changed());
        assert!(!f.session.handle_mutation(350).changed());

        f.session.tick(500).await;
        assert!(f.outbox.counts().is_empty());
        f.session.tick(800).await;
        assert_eq!(f.outbox.counts(), vec![3]);
        assert_eq!(f.storage.snapshot()[keys::HIDDEN_COUNT], json!(3));
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let mut f = fixture(json!({"userRules": keyword_rules("ships to")})).await;
        f.session.start(0).await;
        let before = f.marked();
        assert_eq!(before.len(), 2);

        let store = RuleStore::new(f.storage.clone());
        store.set_is_paused(true).await;
        f.pump(100).await;
        assert!(f.session.is_paused());
        assert!(f.marked().is_empty());
        let body = f.session.document().body();
        assert!(f.session.document().has_class(body, "privacy-guard-paused"));
        assert_eq!(f.outbox.counts(), vec![0]);
        // The pending save was dropped with the hidden set.
        assert_eq!(f.session.next_deadline(), Some(3000));
        assert!(f.session.hidden_items().is_empty());

        // Mutations while paused hide nothing.
        assert!(!f.session.handle_mutation(150).changed());

        store.set_is_paused(false).await;
        f.pump(200).await;
        assert!(!f.session.document().has_class(body, "privacy-guard-paused"));
        assert_eq!(f.marked(), before);
        assert_eq!(f.session.hidden_items().len(), 2);
        assert_eq!(f.session.next_deadline(), Some(700));
    }

    #[tokio::test]
    async fn test_user_rule_change_rescans() {
        let mut f = fixture(json!({})).await;
        f.session.start(0).await;
        assert_eq!(f.marked(), vec![f.location]);

        let store = RuleStore::new(f.storage.clone());
        let rules = UserRules {
            keywords: vec![RuleEntry::new("ships to")],
            patterns: vec![],
        };
        store.set_user_rules(&rules).await;
        f.pump(50).await;
        assert_eq!(f.session.user_rules(), &rules);
        assert!(f.session.document().has_marker(&f.order));
    }

    #[tokio::test]
    async fn test_legacy_rules_in_update_are_normalized() {
        let mut f = fixture(json!({})).await;
        f.session.start(0).await;

        let store = RuleStore::new(f.storage.clone());
        let mut items = serde_json::Map::new();
        items.insert(keys::USER_RULES.into(), json!({"keywords": ["ships to"]}));
        store.set(items).await;
        f.pump(50).await;
        assert_eq!(f.session.user_rules().keywords, vec![RuleEntry::new("ships to")]);
        assert!(f.session.document().has_marker(&f.order));
    }

    #[tokio::test]
    async fn test_domain_rule_change_reresolves() {
        let mut f = fixture(json!({})).await;
        f.session.start(0).await;
        assert!(!f.session.document().has_marker(&f.order));

        let mut overrides = DomainRules::new();
        overrides.insert("amazon", DomainRuleSet::new("Mine", &["amazon.co.jp"], &["main > p"]));
        RuleStore::new(f.storage.clone()).set_domain_rules(&overrides).await;
        f.pump(50).await;

        assert_eq!(f.session.domain_rules().map(|d| d.name.as_str()), Some("Mine"));
        assert!(f.session.document().has_marker(&f.order));
    }

    #[tokio::test]
    async fn test_toast_shows_once_per_page() {
        let mut f = fixture(json!({})).await;
        f.session.start(0).await;
        assert_eq!(
            f.session.document().toast(),
            Some(ToastState::Showing(TOAST_MESSAGE.to_string()))
        );

        f.session.tick(3000).await;
        assert_eq!(
            f.session.document().toast(),
            Some(ToastState::Fading(TOAST_MESSAGE.to_string()))
        );
        f.session.tick(3300).await;
        assert_eq!(f.session.document().toast(), None);
        assert_eq!(f.session.next_deadline(), None);

        let body = f.session.document().body();
        let extra = f
            .session
            .document_mut()
            .append_element(body, "div", &[("id", "contextualIngressPtLabel")]);
        f.session.document_mut().append_text(extra, "Deliver to Taro");
        assert!(f.session.handle_mutation(4000).changed());
        assert!(f.session.toast_shown());
        assert_eq!(f.session.document().toast(), None);
    }

    #[tokio::test]
    async fn test_start_paused_does_not_scan() {
        let mut f = fixture(json!({"isPaused": true, "userRules": keyword_rules("ships to")})).await;
        let report = f.session.start(0).await;
        assert!(!report.changed());
        assert!(f.marked().is_empty());
        let body = f.session.document().body();
        assert!(f.session.document().has_class(body, "privacy-guard-paused"));
        assert_eq!(f.session.next_deadline(), None);
    }

    #[tokio::test]
    async fn test_unsupported_host_hides_nothing() {
        let storage = MemoryStorage::with_data(
            json!({"userRules": keyword_rules("ships to")})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let (tree, _, _) = page();
        let mut session = PageSession::new(
            "example.org",
            tree,
            RuleStore::new(storage),
            Resolver::new(NoBundledRules),
            Outbox::default(),
        );
        assert!(!session.start(0).await.changed());
        assert!(session.document().marked_elements().is_empty());
        assert!(session.domain_rules().is_none());
    }

    #[tokio::test]
    async fn test_other_area_is_ignored() {
        let mut f = fixture(json!({})).await;
        f.session.start(0).await;
        let mut changes = BTreeMap::new();
        changes.insert(
            keys::IS_PAUSED.to_string(),
            ValueChange {
                old_value: None,
                new_value: Some(json!(true)),
            },
        );
        let sync = StorageChanges {
            area: "sync".to_string(),
            changes,
        };
        assert_ne!(sync.area, LOCAL_AREA);
        assert!(ChangeSet::from_changes(&sync).is_empty());
        f.session.handle_storage_change(&sync, 10).await;
        assert!(!f.session.is_paused());
        assert!(f.session.document().has_marker(&f.location));
    }

    #[tokio::test]
    async fn test_own_hidden_writes_change_nothing() {
        let mut f = fixture(json!({})).await;
        f.session.start(0).await;
        f.session.tick(500).await;

        let changes = f.changes.try_recv().unwrap();
        assert!(changes.contains(keys::HIDDEN_COUNT));
        assert!(ChangeSet::from_changes(&changes).is_empty());
        f.session.handle_storage_change(&changes, 600).await;
        assert_eq!(f.session.next_deadline(), Some(3000));
        assert!(f
            .session
            .document()
            .elements()
            .iter()
            .all(|&id| (id == f.location)
                == f.session.document().attribute(id, HIDDEN_MARKER_ATTR).is_some()));
    }
}
