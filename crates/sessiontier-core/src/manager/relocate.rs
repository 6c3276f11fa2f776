//! Moving sessions to match a solution.
//!
//! Each action reads the actual residency under the session lock and only
//! performs the operations still missing, so running the same solution twice
//! changes nothing the second time. Storage failures are logged and leave the
//! session where it is; the next cycle retries.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::SessionManager;
use crate::error::StorageError;
use crate::model::Solution;
use crate::placement::Placement;
use crate::session::Session;

/// Counts of one relocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelocationStats {
    pub local: usize,
    pub remote: usize,
    pub both: usize,
    pub dropped: usize,
    /// Snapshots written to remote storage
    pub stored: usize,
    /// Sessions brought back into local memory
    pub restored: usize,
    /// Storage operations that failed
    pub failures: usize,
}

/// Where a session actually is when its action runs.
struct Residency {
    local: Option<Arc<Session>>,
    remote: bool,
}

impl SessionManager {
    pub(super) fn relocate(
        &self,
        solution: &Solution,
        previous: &HashMap<String, Placement>,
    ) -> RelocationStats {
        let mut stats = RelocationStats::default();
        for (id, target) in solution.placements() {
            let before = previous.get(id).copied().unwrap_or_default();
            match target {
                Placement::Local => stats.local += 1,
                Placement::Remote => stats.remote += 1,
                Placement::Both => stats.both += 1,
                Placement::Drop => stats.dropped += 1,
            }
            if before != target {
                debug!(session_id = id, from = %before, to = %target, "relocating session");
            }
            self.relocate_one(id, target, &mut stats);
        }
        stats
    }

    fn relocate_one(&self, id: &str, target: Placement, stats: &mut RelocationStats) {
        let Some(lock) = self.locks.get(id) else {
            self.bin(id);
            return;
        };
        let _guard = lock.lock();

        let residency = Residency {
            local: self.registry.get(id),
            remote: self.is_remote(id),
        };
        if let Some(session) = &residency.local {
            if !session.is_valid() {
                self.execute_drop(id, &residency, stats);
                return;
            }
        }
        if residency.local.is_none() && !residency.remote {
            // already gone
            self.bin(id);
            return;
        }

        let result = match target {
            Placement::Local => self.execute_local(id, &residency, stats),
            Placement::Remote => self.execute_remote(id, &residency, stats),
            Placement::Both => self.execute_both(id, &residency, stats),
            Placement::Drop => {
                self.execute_drop(id, &residency, stats);
                Ok(())
            }
        };
        if let Err(err) = result {
            stats.failures += 1;
            warn!(session_id = id, target = %target, error = %err, "relocation failed; residency unchanged");
        }
    }

    fn execute_local(
        &self,
        id: &str,
        residency: &Residency,
        stats: &mut RelocationStats,
    ) -> Result<(), StorageError> {
        if residency.local.is_none() && !self.restore(id, stats)? {
            return Ok(());
        }
        if residency.remote {
            self.remove_remote(id)?;
        }
        Ok(())
    }

    fn execute_remote(
        &self,
        id: &str,
        residency: &Residency,
        stats: &mut RelocationStats,
    ) -> Result<(), StorageError> {
        if let Some(session) = &residency.local {
            self.store_if_stale(session, residency.remote, stats)?;
            self.registry.remove(id);
        }
        Ok(())
    }

    fn execute_both(
        &self,
        id: &str,
        residency: &Residency,
        stats: &mut RelocationStats,
    ) -> Result<(), StorageError> {
        match &residency.local {
            Some(session) => self.store_if_stale(session, residency.remote, stats),
            None => self.restore(id, stats).map(|_| ()),
        }
    }

    fn execute_drop(&self, id: &str, residency: &Residency, stats: &mut RelocationStats) {
        if let Some(session) = &residency.local {
            session.invalidate();
            self.registry.remove(id);
        }
        if residency.remote {
            if let Err(err) = self.remove_remote(id) {
                stats.failures += 1;
                warn!(session_id = id, error = %err, "failed to drop remote copy");
                return;
            }
        }
        self.bin(id);
    }

    /// Write the session unless remote storage already holds this version.
    fn store_if_stale(
        &self,
        session: &Session,
        remote: bool,
        stats: &mut RelocationStats,
    ) -> Result<(), StorageError> {
        let version = session.requests();
        if remote && self.remote.read().get(session.id()).copied().flatten() == Some(version) {
            return Ok(());
        }
        self.storage.store(&session.snapshot())?;
        self.remote
            .write()
            .insert(session.id().to_string(), Some(version));
        stats.stored += 1;
        Ok(())
    }

    /// Load the remote copy into local memory. Returns false when it is gone.
    fn restore(&self, id: &str, stats: &mut RelocationStats) -> Result<bool, StorageError> {
        match self.storage.load(id)? {
            Some(data) => {
                let version = data.requests;
                self.registry.insert(Arc::new(Session::from_snapshot(data)));
                self.remote.write().insert(id.to_string(), Some(version));
                stats.restored += 1;
                Ok(true)
            }
            None => {
                warn!(session_id = id, "remote copy missing; forgetting session");
                self.remote.write().remove(id);
                self.bin(id);
                Ok(false)
            }
        }
    }

    fn remove_remote(&self, id: &str) -> Result<(), StorageError> {
        self.storage.remove(id)?;
        self.remote.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use super::super::tests::{manager_with, session};
    use super::*;
    use crate::optimizer::LocalOptimizer;
    use crate::storage::{MemorySessionStorage, SessionStorage};

    fn solution(entries: &[(&str, Placement)]) -> Solution {
        let placements: BTreeMap<String, Placement> = entries
            .iter()
            .map(|(id, p)| ((*id).to_string(), *p))
            .collect();
        Solution::new(placements, 0.0)
    }

    fn setup() -> (SessionManager, Arc<MemorySessionStorage>) {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(LocalOptimizer), Arc::clone(&storage));
        for id in ["a", "b", "c", "d"] {
            manager.add_session(session(id, id));
        }
        (manager, storage)
    }

    #[test]
    fn every_target_is_reached() {
        let (manager, storage) = setup();
        let plan = solution(&[
            ("a", Placement::Local),
            ("b", Placement::Remote),
            ("c", Placement::Both),
            ("d", Placement::Drop),
        ]);
        let stats = manager.relocate(&plan, &HashMap::new());

        assert_eq!(manager.placement_of("a"), Placement::Local);
        assert_eq!(manager.placement_of("b"), Placement::Remote);
        assert_eq!(manager.placement_of("c"), Placement::Both);
        assert_eq!(manager.placement_of("d"), Placement::Drop);
        assert_eq!(stats.stored, 2);
        assert_eq!(storage.len(), 2);
        assert_eq!((stats.local, stats.remote, stats.both, stats.dropped), (1, 1, 1, 1));
    }

    #[test]
    fn relocation_is_idempotent() {
        let (manager, storage) = setup();
        let plan = solution(&[
            ("a", Placement::Remote),
            ("b", Placement::Both),
            ("c", Placement::Local),
            ("d", Placement::Drop),
        ]);
        manager.relocate(&plan, &HashMap::new());
        let residency: Vec<Placement> =
            ["a", "b", "c", "d"].iter().map(|id| manager.placement_of(id)).collect();
        let catalogue = storage.stored().unwrap();

        let again = manager.relocate(&plan, &HashMap::new());
        assert_eq!(again.stored, 0);
        assert_eq!(again.restored, 0);
        let after: Vec<Placement> =
            ["a", "b", "c", "d"].iter().map(|id| manager.placement_of(id)).collect();
        assert_eq!(after, residency);
        assert_eq!(storage.stored().unwrap(), catalogue);
    }

    #[test]
    fn remote_sessions_come_back_local() {
        let (manager, storage) = setup();
        manager.relocate(&solution(&[("a", Placement::Remote)]), &HashMap::new());
        assert!(!manager.is_local("a"));

        let stats = manager.relocate(&solution(&[("a", Placement::Local)]), &HashMap::new());
        assert_eq!(stats.restored, 1);
        assert_eq!(manager.placement_of("a"), Placement::Local);
        assert!(!storage.contains("a"));
    }

    #[test]
    fn modified_sessions_refresh_their_remote_copy() {
        let (manager, _storage) = setup();
        let plan = solution(&[("a", Placement::Both)]);
        assert_eq!(manager.relocate(&plan, &HashMap::new()).stored, 1);
        manager.touch_session("a").unwrap().unwrap();
        assert_eq!(manager.relocate(&plan, &HashMap::new()).stored, 1);
        assert_eq!(manager.relocate(&plan, &HashMap::new()).stored, 0);
    }

    #[test]
    fn storage_failure_keeps_residency() {
        let (manager, storage) = setup();
        storage.set_offline(true);
        let stats = manager.relocate(&solution(&[("a", Placement::Remote)]), &HashMap::new());
        assert_eq!(stats.failures, 1);
        assert_eq!(manager.placement_of("a"), Placement::Local);
    }

    #[test]
    fn invalid_and_unknown_sessions_are_binned() {
        let (manager, _storage) = setup();
        manager.registry.get("a").unwrap().invalidate();
        manager.relocate(
            &solution(&[("a", Placement::Local), ("ghost", Placement::Local)]),
            &HashMap::new(),
        );
        assert!(!manager.is_local("a"));
        let binned = manager.rubbish.lock().clone();
        assert!(binned.contains(&"a".to_string()));
        assert!(binned.contains(&"ghost".to_string()));
    }
}
