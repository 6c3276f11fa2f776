//! Lock-free per-session access counters.
//!
//! The request path bumps a counter on every touch; the collector drains it
//! once per cycle. Counters live behind `Arc` so the map's read lock is only
//! held long enough to clone the handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::session::SessionListener;

#[derive(Debug, Default)]
struct AccessCounter {
    count: AtomicU32,
    last_ms: AtomicU64,
}

impl AccessCounter {
    fn record(&self, now_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_ms.fetch_max(now_ms, Ordering::Relaxed);
    }
}

/// Accesses per session since the last drain, plus the last access time.
#[derive(Debug, Default)]
pub struct AccessTracker {
    counters: RwLock<HashMap<String, Arc<AccessCounter>>>,
}

impl AccessTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, id: &str) -> Arc<AccessCounter> {
        if let Some(counter) = self.counters.read().get(id) {
            return Arc::clone(counter);
        }
        Arc::clone(self.counters.write().entry(id.to_string()).or_default())
    }

    pub fn record(&self, id: &str, now_ms: u64) {
        self.counter(id).record(now_ms);
    }

    /// Accesses since the previous drain; resets the count to zero.
    #[must_use]
    pub fn drain(&self, id: &str) -> u32 {
        self.counters
            .read()
            .get(id)
            .map_or(0, |counter| counter.count.swap(0, Ordering::Relaxed))
    }

    /// Peek without draining.
    #[must_use]
    pub fn pending(&self, id: &str) -> u32 {
        self.counters
            .read()
            .get(id)
            .map_or(0, |counter| counter.count.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn last_access(&self, id: &str) -> Option<u64> {
        self.counters
            .read()
            .get(id)
            .map(|counter| counter.last_ms.load(Ordering::Relaxed))
    }

    pub fn remove(&self, id: &str) {
        self.counters.write().remove(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }
}

impl SessionListener for AccessTracker {
    fn session_accessed(&self, id: &str) {
        self.record(id, crate::session::epoch_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_resets_count_but_keeps_last_access() {
        let tracker = AccessTracker::new();
        tracker.record("a", 100);
        tracker.record("a", 50);
        tracker.record("a", 300);
        assert_eq!(tracker.pending("a"), 3);
        assert_eq!(tracker.drain("a"), 3);
        assert_eq!(tracker.drain("a"), 0);
        assert_eq!(tracker.last_access("a"), Some(300));
        assert_eq!(tracker.drain("unknown"), 0);
        assert_eq!(tracker.last_access("unknown"), None);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let tracker = Arc::new(AccessTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..1000 {
                        tracker.record("hot", t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.drain("hot"), 4000);
        assert_eq!(tracker.last_access("hot"), Some(3999));
    }

    #[test]
    fn listener_hook_records() {
        let tracker = AccessTracker::new();
        tracker.session_accessed("s");
        assert_eq!(tracker.pending("s"), 1);
        assert!(tracker.last_access("s").unwrap() > 0);
        tracker.remove("s");
        assert!(tracker.is_empty());
    }
}
