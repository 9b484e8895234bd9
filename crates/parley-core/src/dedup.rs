// ABOUTME: Best-effort duplicate-event filter for inbound webhook deliveries.
// ABOUTME: In-memory, single-process; entries expire after a fixed window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long an event id is remembered after first sight.
pub const EVENT_EXPIRY: Duration = Duration::from_secs(60);

/// Suppresses re-processing of webhook events already seen within a recent
/// window. Chat platforms retry deliveries on slow acknowledgements, so
/// the same event can arrive more than once; this filter gives handlers
/// at-most-once semantics for the duration of the window. It offers no
/// durability or cross-process coordination.
pub struct EventFilter {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(EVENT_EXPIRY)
    }
}

impl EventFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Build the identifier for an inbound event from its client message id
    /// and delivery timestamp. Either part may be blank on some payloads;
    /// a fully blank id collapses all such events into one key, so it is
    /// logged loudly when it happens.
    pub fn event_id(client_msg_id: &str, ts: &str) -> String {
        let id = format!("{client_msg_id}:{ts}");
        if id == ":" {
            warn!("event carries neither client_msg_id nor ts; dedup key degenerates");
        }
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether `event_id` is recorded and not yet expired.
    pub fn seen(&self, event_id: &str) -> bool {
        let guard = self.lock();
        match guard.get(event_id) {
            Some(recorded_at) => recorded_at.elapsed() <= self.window,
            None => false,
        }
    }

    /// Record `event_id` with the current timestamp, overwriting any
    /// earlier record, then sweep expired entries.
    pub fn record(&self, event_id: &str) {
        {
            let mut guard = self.lock();
            guard.insert(event_id.to_string(), Instant::now());
        }
        self.sweep();
    }

    /// Remove all entries older than the expiry window.
    pub fn sweep(&self) {
        let mut guard = self.lock();
        let before = guard.len();
        guard.retain(|_, recorded_at| recorded_at.elapsed() <= self.window);
        let removed = before - guard.len();
        if removed > 0 {
            debug!(removed, "swept expired event records");
        }
    }

    /// Check-and-record in one step: returns true if the event was already
    /// seen (and should be skipped), otherwise records it and returns false.
    pub fn check_and_record(&self, event_id: &str) -> bool {
        if self.seen(event_id) {
            return true;
        }
        self.record(event_id);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_event_is_not_seen() {
        let filter = EventFilter::default();
        assert!(!filter.seen("abc:1"));
    }

    #[test]
    fn test_duplicate_within_window_is_seen() {
        let filter = EventFilter::default();
        filter.record("abc:1");
        assert!(filter.seen("abc:1"));
        // Recording again overwrites; still seen.
        filter.record("abc:1");
        assert!(filter.seen("abc:1"));
    }

    #[test]
    fn test_expired_event_is_forgotten_after_sweep() {
        let filter = EventFilter::new(Duration::from_millis(30));
        filter.record("abc:1");
        assert!(filter.seen("abc:1"));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!filter.seen("abc:1"));
        filter.sweep();
        assert!(!filter.seen("abc:1"));
    }

    #[test]
    fn test_record_sweeps_older_entries() {
        let filter = EventFilter::new(Duration::from_millis(30));
        filter.record("old:1");
        std::thread::sleep(Duration::from_millis(60));
        // Recording a fresh event purges the expired one opportunistically.
        filter.record("new:1");
        assert!(!filter.seen("old:1"));
        assert!(filter.seen("new:1"));
    }

    #[test]
    fn test_check_and_record_suppresses_second_delivery() {
        let filter = EventFilter::default();
        assert!(!filter.check_and_record("evt:1"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(filter.check_and_record("evt:1"));
    }

    #[test]
    fn test_event_id_concatenates_parts() {
        assert_eq!(EventFilter::event_id("m1", "123.456"), "m1:123.456");
        // Blank parts still produce a key; collision risk is logged, not fixed.
        assert_eq!(EventFilter::event_id("", ""), ":");
    }

    #[test]
    fn test_distinct_ids_do_not_collide() {
        let filter = EventFilter::default();
        filter.record("a:1");
        assert!(!filter.seen("a:2"));
        assert!(!filter.seen("b:1"));
    }
}
