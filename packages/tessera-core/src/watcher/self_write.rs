/// Self-write suppression by content fingerprint.
///
/// Before writing, the storage registers the fingerprint of the text it is
/// about to write. When the watcher later reports a change for that locator,
/// the current text is fingerprinted: a pending match is consumed and the
/// event dropped (our own write), anything else is an external change.
/// The TTL only bounds memory; matches are consumed regardless of age.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::types::ContentFingerprint;
use crate::locator::Locator;

const FINGERPRINT_TTL: Duration = Duration::from_secs(10);

struct PendingWrite {
    fingerprint: ContentFingerprint,
    registered_at: Instant,
}

#[derive(Default)]
pub struct SelfWriteTracker {
    /// Several writes may land before the watcher reports the first one.
    pending: HashMap<Locator, Vec<PendingWrite>>,
}

impl SelfWriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write that is about to happen.
    pub fn register(&mut self, locator: &Locator, content: &str) {
        self.pending
            .entry(locator.clone())
            .or_default()
            .push(PendingWrite {
                fingerprint: ContentFingerprint::from_content(content),
                registered_at: Instant::now(),
            });
    }

    /// Withdraw a registration whose write did not happen.
    pub fn forget(&mut self, locator: &Locator, content: &str) {
        self.consume(locator, content);
    }

    /// True if `current_content` matches a pending write for `locator`; the
    /// match is consumed.
    pub fn consume(&mut self, locator: &Locator, current_content: &str) -> bool {
        let fingerprint = ContentFingerprint::from_content(current_content);
        let Some(entries) = self.pending.get_mut(locator) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| e.fingerprint == fingerprint) else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.pending.remove(locator);
        }
        true
    }

    /// Drop fingerprints older than the TTL.
    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, entries| {
            entries.retain(|e| now.duration_since(e.registered_at) < FINGERPRINT_TTL);
            !entries.is_empty()
        });
    }

    pub fn pending_for(&self, locator: &Locator) -> usize {
        self.pending.get(locator).map_or(0, Vec::len)
    }
}
