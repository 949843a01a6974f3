//! DOM Hiding Engine
//!
//! One scan runs three matchers in sequence over a [`Document`]:
//! site selectors, user keywords and user patterns. Every hidden element gets
//! the marker attribute and `display: none`; a human-readable descriptor of
//! it goes into the page's [`HiddenItems`] set.
//!
//! The scan is idempotent: marked elements are never matched again, so a
//! second pass over an unchanged page reports nothing new.

use std::collections::HashSet;

use fancy_regex::Regex;

use crate::config::{FALLBACK_ITEM_TEXT, LANDMARK_ROLE, MAX_TEXT_LENGTH_LARGE, MAX_TEXT_LENGTH_SMALL};
use crate::dom::{Document, TextNode};
use crate::resolver::{compile_patterns, pattern_matches};
use crate::text::{preview_text, text_len};
use crate::types::{DomainRuleSet, UserRules};

// =============================================================================
// Active Rules
// =============================================================================

/// User rules reduced to what the matchers need: enabled keywords and
/// compiled enabled patterns, both in list order.
#[derive(Debug, Clone, Default)]
pub struct ActiveRules {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl ActiveRules {
    pub fn compile(user_rules: &UserRules) -> Self {
        Self {
            keywords: user_rules.enabled_keywords().map(str::to_string).collect(),
            patterns: compile_patterns(&user_rules.patterns),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.patterns.is_empty()
    }
}

// =============================================================================
// Hidden Items
// =============================================================================

/// Deduplicated descriptors, in the order they were first seen.
#[derive(Debug, Clone, Default)]
pub struct HiddenItems {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl HiddenItems {
    /// Returns true if the descriptor was new.
    pub fn insert(&mut self, item: String) -> bool {
        if self.seen.contains(&item) {
            return false;
        }
        self.seen.insert(item.clone());
        self.order.push(item);
        true
    }

    pub fn contains(&self, item: &str) -> bool {
        self.seen.contains(item)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn items(&self) -> &[String] {
        &self.order
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

/// Newly recorded descriptors per matcher in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub selector_hits: usize,
    pub keyword_hits: usize,
    pub pattern_hits: usize,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.selector_hits + self.keyword_hits + self.pattern_hits
    }

    /// True if the pass recorded anything new.
    pub fn changed(&self) -> bool {
        self.total() > 0
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Hiding engine with the hidden-item set of one page view.
#[derive(Debug, Default)]
pub struct HidingEngine {
    hidden: HiddenItems,
}

impl HidingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hidden_items(&self) -> &HiddenItems {
        &self.hidden
    }

    /// Forget every recorded descriptor.
    pub fn reset(&mut self) {
        self.hidden.clear();
    }

    /// Run all three matchers. A disabled rule set skips the pass entirely.
    pub fn scan<D: Document>(
        &mut self,
        doc: &mut D,
        domain: &DomainRuleSet,
        rules: &ActiveRules,
    ) -> ScanReport {
        if !domain.is_enabled() {
            log::debug!("Rule set `{}` is disabled, skipping scan", domain.name);
            return ScanReport::default();
        }
        let report = ScanReport {
            selector_hits: self.hide_by_selectors(doc, &domain.selectors),
            keyword_hits: self.hide_by_keywords(doc, &rules.keywords),
            pattern_hits: self.hide_by_patterns(doc, &rules.patterns),
        };
        if report.changed() {
            log::debug!(
                "Scan hid {} new item(s) ({} selector, {} keyword, {} pattern)",
                report.total(),
                report.selector_hits,
                report.keyword_hits,
                report.pattern_hits
            );
        }
        report
    }

    /// Hide every element matched by the selectors, widened to the enclosing
    /// `contentinfo` landmark when there is one.
    pub fn hide_by_selectors<D: Document>(&mut self, doc: &mut D, selectors: &[String]) -> usize {
        let mut hits = 0;
        for selector in selectors {
            let elements = match doc.query_selector_all(selector) {
                Ok(elements) => elements,
                Err(e) => {
                    log::warn!("Invalid selector: {}: {}", selector, e);
                    continue;
                }
            };
            let reason = format!("Selector: {}", selector);
            for element in elements {
                let target = doc
                    .closest_with_role(&element, LANDMARK_ROLE)
                    .unwrap_or(element);
                if self.hide_element(doc, &target, &reason) {
                    hits += 1;
                }
            }
        }
        hits
    }

    /// Hide the containers of text nodes containing an enabled keyword.
    pub fn hide_by_keywords<D: Document>(&mut self, doc: &mut D, keywords: &[String]) -> usize {
        if keywords.is_empty() {
            return 0;
        }
        self.hide_by_text(doc, |text| {
            keywords
                .iter()
                .find(|keyword| text.contains(keyword.as_str()))
                .map(|keyword| format!("Keyword: {}", keyword))
        })
    }

    /// Hide the containers of text nodes matching a compiled pattern.
    pub fn hide_by_patterns<D: Document>(&mut self, doc: &mut D, patterns: &[Regex]) -> usize {
        if patterns.is_empty() {
            return 0;
        }
        self.hide_by_text(doc, |text| {
            patterns
                .iter()
                .find(|regex| pattern_matches(regex, text))
                .map(|regex| format!("Pattern: {}", regex.as_str()))
        })
    }

    /// Walk every text node, collect targets, then hide them. The walk never
    /// sees a half-modified tree.
    fn hide_by_text<D, F>(&mut self, doc: &mut D, matcher: F) -> usize
    where
        D: Document,
        F: Fn(&str) -> Option<String>,
    {
        let mut pending: Vec<(D::Element, String)> = Vec::new();
        for TextNode { text, parent } in doc.text_nodes() {
            if text.is_empty() {
                continue;
            }
            let Some(reason) = matcher(&text) else {
                continue;
            };
            let target = find_target_element(
                &*doc,
                parent,
                MAX_TEXT_LENGTH_SMALL,
                MAX_TEXT_LENGTH_LARGE,
            );
            if let Some(target) = target.filter(|t| !doc.has_marker(t)) {
                pending.push((target, reason));
            }
        }

        pending
            .into_iter()
            .filter(|(target, reason)| self.hide_element(doc, target, reason))
            .count()
    }

    /// Hide one element. Returns true only if it produced a new descriptor.
    pub fn hide_element<D: Document>(&mut self, doc: &mut D, element: &D::Element, reason: &str) -> bool {
        if doc.is_hidden(element) {
            return false;
        }
        doc.hide(element);

        let mut descriptor = preview_text(&doc.inner_text(element));
        if descriptor.is_empty() {
            descriptor = if reason.is_empty() {
                FALLBACK_ITEM_TEXT.to_string()
            } else {
                reason.to_string()
            };
        }
        self.hidden.insert(descriptor)
    }
}

/// Restore every marked element. Returns how many were restored.
pub fn unhide_all<D: Document>(doc: &mut D) -> usize {
    let marked = doc.marked_elements();
    for element in &marked {
        doc.unhide(element);
    }
    marked.len()
}

/// Pick the element to hide for a matched text node.
///
/// Starts at the text node's parent and climbs while the candidate's text is
/// shorter than `max_small` and its parent's text is shorter than `max_large`.
/// An element with no text stops the climb.
pub fn find_target_element<D: Document>(
    doc: &D,
    parent: Option<D::Element>,
    max_small: usize,
    max_large: usize,
) -> Option<D::Element> {
    let mut target = parent?;
    loop {
        let len = text_len(&doc.inner_text(&target));
        if len == 0 || len >= max_small {
            break;
        }
        match doc.parent_element(&target) {
            Some(up) if text_len(&doc.inner_text(&up)) < max_large => target = up,
            _ => break,
        }
    }
    Some(target)
}
