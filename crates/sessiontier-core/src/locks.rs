//! Per-session reentrant locks.
//!
//! A lock is created the first time the orchestrator sees a session and is
//! only removed during cleanup. Holders clone the `Arc` out of the table so
//! the table mutex is never held while a session lock is.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

pub type SessionLock = Arc<ReentrantMutex<()>>;

#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, SessionLock>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `id`, created on first reference.
    pub fn ensure(&self, id: &str) -> SessionLock {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(id) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(ReentrantMutex::new(()));
        locks.insert(id.to_string(), Arc::clone(&lock));
        lock
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<SessionLock> {
        self.locks.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.locks.lock().remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.locks.lock().contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn same_id_shares_a_lock() {
        let locks = SessionLocks::new();
        let a = locks.ensure("a");
        let b = locks.ensure("a");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
        assert!(locks.get("b").is_none());
    }

    #[test]
    fn reentrant_on_one_thread() {
        let locks = SessionLocks::new();
        let lock = locks.ensure("a");
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn excludes_other_threads() {
        let locks = Arc::new(SessionLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let lock = locks.ensure("shared");
                        let _guard = lock.lock();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn removal_is_reported() {
        let locks = SessionLocks::new();
        locks.ensure("x");
        assert!(locks.remove("x"));
        assert!(!locks.remove("x"));
        assert!(locks.is_empty());
    }
}
