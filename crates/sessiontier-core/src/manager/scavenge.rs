//! Timing out idle sessions.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::SessionManager;
use crate::error::Result;
use crate::session::epoch_ms;

impl SessionManager {
    /// Time out every session idle for longer than its inactivity limit,
    /// removing it from local memory and remote storage. Returns how many
    /// sessions were timed out.
    pub fn scavenge(&self) -> Result<usize> {
        self.scavenge_at(epoch_ms())
    }

    pub(crate) fn scavenge_at(&self, now_ms: u64) -> Result<usize> {
        // Last access per known session: the collected snapshot first, then
        // sessions not collected yet.
        let mut last_access: BTreeMap<String, u64> = {
            let state = self.state.lock();
            state
                .data
                .sessions()
                .map(|(id, props)| (id.to_string(), props.last_access_ms))
                .collect()
        };
        for session in self.registry.snapshot() {
            let entry = last_access.entry(session.id().to_string()).or_insert(0);
            *entry = (*entry).max(session.accessed_ms());
        }
        for id in self.remote.read().keys() {
            last_access.entry(id.clone()).or_insert(0);
        }

        let mut timed_out = 0;
        for (id, mut last) in last_access {
            if let Some(tracked) = self.access.last_access(&id) {
                last = last.max(tracked);
            }
            let local = self.registry.get(&id);
            let limit_secs = local
                .as_ref()
                .map_or(self.config.max_inactive_secs, |s| s.max_inactive_secs());
            if limit_secs <= 0 || now_ms.saturating_sub(last) <= limit_secs as u64 * 1000 {
                continue;
            }

            let lock = self.locks.ensure(&id);
            let _guard = lock.lock();
            // touched while we were deciding
            if let Some(session) = &local {
                if !session.is_expired(now_ms) {
                    continue;
                }
                session.invalidate();
            }
            self.registry.remove(&id);
            if self.is_remote(&id) {
                if let Err(err) = self.storage.remove(&id) {
                    warn!(session_id = %id, error = %err, "failed to remove timed out session from storage");
                    continue;
                }
                self.remote.write().remove(&id);
            }
            debug!(session_id = %id, idle_ms = now_ms.saturating_sub(last), "session timed out");
            self.bin(&id);
            timed_out += 1;
        }

        let purged = self.cleanup();
        info!(timed_out, purged, "scavenge finished");
        Ok(timed_out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::manager_with;
    use crate::optimizer::RemoteOptimizer;
    use crate::session::{Session, epoch_ms};
    use crate::storage::MemorySessionStorage;

    #[test]
    fn idle_sessions_time_out_everywhere() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(RemoteOptimizer), Arc::clone(&storage));
        let now = epoch_ms();
        manager.add_session(Arc::new(Session::created_at("stale", 60, now - 7_200_000)));
        manager.run_cycle().unwrap();
        // remote-only sessions fall back to the configured 1800 s limit
        assert!(storage.contains("stale"));
        manager.add_session(Arc::new(Session::created_at("fresh", 60, now)));
        manager.add_session(Arc::new(Session::created_at("local-stale", 60, now - 61_000)));

        assert_eq!(manager.scavenge_at(now).unwrap(), 2);
        assert!(!storage.contains("stale"));
        assert!(!manager.is_local("local-stale"));
        assert!(manager.is_local("fresh"));
        assert!(manager.data_snapshot().session("stale").is_none());
        assert_eq!(manager.tracked_locks(), 1);
    }

    #[test]
    fn zero_timeout_never_expires() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(RemoteOptimizer), storage);
        manager.add_session(Arc::new(Session::created_at("immortal", 0, 0)));
        assert_eq!(manager.scavenge_at(epoch_ms()).unwrap(), 0);
        assert!(manager.is_local("immortal"));
    }

    #[test]
    fn recent_access_saves_a_session() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(RemoteOptimizer), storage);
        let now = epoch_ms();
        let session = Arc::new(Session::created_at("busy", 60, now - 120_000));
        manager.add_session(Arc::clone(&session));
        manager.touch_session("busy").unwrap().unwrap();
        assert_eq!(manager.scavenge_at(now + 1_000).unwrap(), 0);
    }
}
