//! Leading-edge, per-locator debounce for content modify notifications.
//!
//! The first event for a locator fires immediately and opens a window.
//! Events inside the window are swallowed without extending it, so a
//! locator fires at most once per window no matter how often it changes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::locator::Locator;

/// Per-locator debounce record.
#[derive(Debug, Clone, Copy)]
struct DebounceSlot {
    last_fired: Instant,
    suppressed: u32,
}

#[derive(Debug)]
pub struct ModifyDebouncer {
    window: Duration,
    slots: HashMap<Locator, DebounceSlot>,
}

impl ModifyDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if an event for `locator` at `now` should fire.
    pub fn admit(&mut self, locator: &Locator, now: Instant) -> bool {
        if let Some(slot) = self.slots.get_mut(locator) {
            if now.saturating_duration_since(slot.last_fired) < self.window {
                slot.suppressed += 1;
                return false;
            }
            if slot.suppressed > 0 {
                log::debug!(
                    "[tessera.debounce] {} coalesced {} modify events",
                    locator,
                    slot.suppressed
                );
            }
        }
        self.slots.insert(
            locator.clone(),
            DebounceSlot {
                last_fired: now,
                suppressed: 0,
            },
        );
        true
    }

    /// Forget slots whose window has closed.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.slots
            .retain(|_, slot| now.saturating_duration_since(slot.last_fired) < window);
    }

    /// Forget one locator (it was renamed or deleted).
    pub fn forget(&mut self, locator: &Locator) {
        self.slots.remove(locator);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Locators with an open window.
    pub fn open_windows(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[test]
    fn test_burst_fires_once() {
        let mut debouncer = ModifyDebouncer::new(WINDOW);
        let loc = Locator::new("a.md");
        let start = Instant::now();

        let fired = (0..10)
            .filter(|i| debouncer.admit(&loc, start + Duration::from_millis(i * 90)))
            .count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_window_not_extended_by_suppressed_events() {
        let mut debouncer = ModifyDebouncer::new(WINDOW);
        let loc = Locator::new("a.md");
        let start = Instant::now();

        assert!(debouncer.admit(&loc, start));
        assert!(!debouncer.admit(&loc, start + Duration::from_millis(900)));
        assert!(debouncer.admit(&loc, start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_spaced_events_fire_separately() {
        let mut debouncer = ModifyDebouncer::new(WINDOW);
        let loc = Locator::new("a.md");
        let start = Instant::now();

        assert!(debouncer.admit(&loc, start));
        assert!(debouncer.admit(&loc, start + Duration::from_millis(1500)));
        assert!(debouncer.admit(&loc, start + Duration::from_millis(3000)));
    }

    #[test]
    fn test_locators_independent() {
        let mut debouncer = ModifyDebouncer::new(WINDOW);
        let now = Instant::now();
        assert!(debouncer.admit(&Locator::new("a.md"), now));
        assert!(debouncer.admit(&Locator::new("b.md"), now));
        assert!(!debouncer.admit(&Locator::new("a.md"), now));
    }

    #[test]
    fn test_prune_and_forget() {
        let mut debouncer = ModifyDebouncer::new(WINDOW);
        let start = Instant::now();
        debouncer.admit(&Locator::new("a.md"), start);
        debouncer.admit(&Locator::new("b.md"), start + Duration::from_millis(600));

        debouncer.prune(start + Duration::from_millis(1200));
        assert_eq!(debouncer.open_windows(), 1);

        debouncer.forget(&Locator::new("b.md"));
        assert_eq!(debouncer.open_windows(), 0);
        assert!(debouncer.admit(&Locator::new("b.md"), start + Duration::from_millis(1300)));
    }
}
