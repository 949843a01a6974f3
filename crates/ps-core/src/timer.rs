//! Deadline timers driven by an explicit millisecond clock.
//!
//! The page session never sleeps; the host feeds it the current time and asks
//! for the next deadline. Rescheduling replaces the previous deadline.

use crate::config::{TOAST_ANIMATION_DURATION_MS, TOAST_DURATION_MS};

/// Trailing-edge debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    delay_ms: u64,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// (Re)start the quiet period from `now`.
    pub fn schedule(&mut self, now: u64) {
        self.deadline = Some(now.saturating_add(self.delay_ms));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// True exactly once when the deadline has passed.
    pub fn fire_due(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// What the toast needs done at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastAction {
    Fade,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToastPhase {
    Idle,
    Visible { fade_at: u64 },
    Fading { remove_at: u64 },
    Done,
}

/// One-shot toast lifecycle: shown at most once per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToastTimer {
    phase: ToastPhase,
}

impl Default for ToastTimer {
    fn default() -> Self {
        Self {
            phase: ToastPhase::Idle,
        }
    }
}

impl ToastTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the toast was ever shown.
    pub fn was_shown(&self) -> bool {
        self.phase != ToastPhase::Idle
    }

    /// Start the toast. Returns false if it was already shown once.
    pub fn show(&mut self, now: u64) -> bool {
        if self.was_shown() {
            return false;
        }
        self.phase = ToastPhase::Visible {
            fade_at: now.saturating_add(TOAST_DURATION_MS),
        };
        true
    }

    pub fn deadline(&self) -> Option<u64> {
        match self.phase {
            ToastPhase::Visible { fade_at } => Some(fade_at),
            ToastPhase::Fading { remove_at } => Some(remove_at),
            ToastPhase::Idle | ToastPhase::Done => None,
        }
    }

    /// Advance to `now`, returning the step that is due, if any.
    pub fn advance(&mut self, now: u64) -> Option<ToastAction> {
        match self.phase {
            ToastPhase::Visible { fade_at } if now >= fade_at => {
                self.phase = ToastPhase::Fading {
                    remove_at: fade_at.saturating_add(TOAST_ANIMATION_DURATION_MS),
                };
                Some(ToastAction::Fade)
            }
            ToastPhase::Fading { remove_at } if now >= remove_at => {
                self.phase = ToastPhase::Done;
                Some(ToastAction::Remove)
            }
            _ => None,
        }
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: &[Option<u64>]) -> Option<u64> {
    deadlines.iter().flatten().copied().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_reschedule_replaces_deadline() {
        let mut debouncer = Debouncer::new(500);
        debouncer.schedule(0);
        debouncer.schedule(300);
        assert_eq!(debouncer.deadline(), Some(800));
        assert!(!debouncer.fire_due(799));
        assert!(debouncer.fire_due(800));
        assert!(!debouncer.fire_due(900));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_debounce_cancel() {
        let mut debouncer = Debouncer::new(500);
        debouncer.schedule(0);
        debouncer.cancel();
        assert!(!debouncer.fire_due(10_000));
    }

    #[test]
    fn test_toast_shows_once() {
        let mut toast = ToastTimer::new();
        assert!(toast.show(100));
        assert!(!toast.show(200));
        assert_eq!(toast.deadline(), Some(3100));
        assert_eq!(toast.advance(3099), None);
        assert_eq!(toast.advance(3100), Some(ToastAction::Fade));
        assert_eq!(toast.deadline(), Some(3400));
        assert_eq!(toast.advance(3400), Some(ToastAction::Remove));
        assert_eq!(toast.deadline(), None);
        assert!(!toast.show(5000));
    }

    #[test]
    fn test_late_tick_still_steps_one_phase() {
        let mut toast = ToastTimer::new();
        toast.show(0);
        assert_eq!(toast.advance(10_000), Some(ToastAction::Fade));
        assert_eq!(toast.advance(10_000), Some(ToastAction::Remove));
    }

    #[test]
    fn test_earliest() {
        assert_eq!(earliest(&[None, Some(5), Some(3)]), Some(3));
        assert_eq!(earliest(&[None, None]), None);
    }
}
