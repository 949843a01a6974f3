//! Text helpers shared by the engine and the popup.

use crate::config::PREVIEW_TEXT_LENGTH;

/// Length in characters, the unit every text threshold is expressed in.
#[inline]
pub fn text_len(text: &str) -> usize {
    text.chars().count()
}

/// Collapse every whitespace run (including newlines) to a single space and
/// trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize whitespace and cut to `max_len` characters, appending `…` when
/// something was cut.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    let normalized = normalize_whitespace(text);
    if text_len(&normalized) <= max_len {
        return normalized;
    }
    let mut out: String = normalized.chars().take(max_len).collect();
    out.push('…');
    out
}

/// Descriptor preview at the default popup length.
pub fn preview_text(text: &str) -> String {
    truncate_text(text, PREVIEW_TEXT_LENGTH)
}
