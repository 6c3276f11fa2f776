//! Building the optimization snapshot.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::SessionManager;
use crate::error::StorageError;
use crate::logging::STATS_TARGET;
use crate::model::{OptimizationData, SessionProperties, StorageProperties};
use crate::placement::Placement;
use crate::utility::evaluate_costs;

/// Totals logged once per collection.
#[derive(Debug, Default)]
struct Tally {
    sessions: usize,
    value: f64,
    costs: f64,
}

impl SessionManager {
    /// Refresh `data` from the remote catalogue and local memory.
    ///
    /// Runs under the data lock. Fails only when the catalogue or the remote
    /// capacity cannot be read; the cycle is then skipped.
    pub(super) fn collect(
        &self,
        data: &mut OptimizationData,
        last_utility: f64,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let catalogue = self.storage.stored()?;
        let remote_capacity = self.storage.capacity()?;

        for (_, props) in data.sessions_mut() {
            props.old_placement = Placement::Drop;
        }

        let initial_value = self.config.initial_session_value;
        // remote sessions count as accessed when first seen; local ones carry their own time
        let fresh = || SessionProperties::new(initial_value, now_ms);
        let unseen = || SessionProperties::new(initial_value, 0);
        let mut tally = Tally::default();
        let period = data.optimizer_period;

        // The catalogue is authoritative; versions of copies we wrote survive.
        {
            let mut remote = self.remote.write();
            let previous = std::mem::take(&mut *remote);
            *remote = catalogue
                .iter()
                .map(|entry| (entry.id.clone(), previous.get(&entry.id).copied().flatten()))
                .collect::<HashMap<_, _>>();
        }

        for entry in &catalogue {
            self.locks.ensure(&entry.id);
            let props = data.session_entry(&entry.id, fresh);
            props.remote_size = Some(entry.remote_size);
            props.accesses = self.access.drain(&entry.id);
            props.old_placement = Placement::Remote;
            if let Some(last) = self.access.last_access(&entry.id) {
                props.last_access_ms = props.last_access_ms.max(last);
            }

            if props.local_size.is_none() {
                match self.storage.load(&entry.id) {
                    Ok(Some(snapshot)) => match self.sizes.evaluate_local(&snapshot) {
                        Ok(size) => props.local_size = Some(size),
                        Err(err) => {
                            warn!(session_id = %entry.id, error = %err, "cannot size stored session; marking for drop");
                            props.old_placement = Placement::Drop;
                        }
                    },
                    Ok(None) => {
                        warn!(session_id = %entry.id, "session listed as stored but not found; marking for drop");
                        props.old_placement = Placement::Drop;
                    }
                    Err(err) => {
                        warn!(session_id = %entry.id, error = %err, "cannot load stored session; marking for drop");
                        props.old_placement = Placement::Drop;
                    }
                }
            }
        }

        for session in self.registry.snapshot() {
            if !session.is_valid() {
                continue;
            }
            let id = session.id();
            let lock = self.locks.ensure(id);
            let _guard = lock.lock();

            let snapshot = session.snapshot();
            let local_size = match self.sizes.evaluate_local(&snapshot) {
                Ok(size) => size,
                Err(err) => {
                    warn!(session_id = id, error = %err, "cannot size local session; skipping");
                    continue;
                }
            };

            let props = data.session_entry(id, unseen);
            let changed = props.local_size != Some(local_size);
            props.local_size = Some(local_size);
            if changed || props.remote_size.is_none() {
                match self.sizes.evaluate_remote(&snapshot, self.storage.codec()) {
                    Ok(size) => props.remote_size = Some(size),
                    Err(err) => warn!(session_id = id, error = %err, "cannot size remote encoding"),
                }
            }

            if props.old_placement == Placement::Remote {
                props.old_placement = Placement::Both;
            } else {
                props.old_placement = Placement::Local;
                props.accesses = self.access.drain(id);
            }

            let last = self
                .access
                .last_access(id)
                .unwrap_or(0)
                .max(session.accessed_ms());
            props.last_access_ms = props.last_access_ms.max(last);
        }

        data.local_capacity = self.config.local_capacity_bytes;
        data.local_mttf = self.config.local_mttf;
        let storage_name = self.storage.name().to_string();
        match data.storage_mut(&storage_name) {
            Some(storage) => storage.capacity = remote_capacity,
            None => data.insert_storage(
                storage_name.clone(),
                StorageProperties {
                    capacity: remote_capacity,
                    mttf: self.config.remote_mttf,
                    read_cost: self.config.read_cost,
                    write_cost: self.config.write_cost,
                    storage_cost: self.config.storage_cost,
                },
            ),
        }

        if let Some(storage) = data.storage(&storage_name) {
            for (_, props) in data.sessions() {
                if props.old_placement == Placement::Drop {
                    continue;
                }
                tally.sessions += 1;
                tally.value += props.value;
                if props.old_placement.uses_remote() {
                    tally.costs += evaluate_costs(props, storage, period);
                }
            }
        }

        info!(
            target: STATS_TARGET,
            sessions = tally.sessions,
            last_utility,
            total_value = tally.value,
            value_with_costs = tally.value - tally.costs,
            "collection statistics"
        );
        debug!(
            local = self.registry.len(),
            remote = catalogue.len(),
            local_capacity = data.local_capacity,
            remote_capacity,
            "collected sessions"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::{manager_with, session};
    use crate::optimizer::{BothOptimizer, LocalOptimizer};
    use crate::placement::Placement;
    use crate::session::epoch_ms;
    use crate::storage::{MemorySessionStorage, SessionStorage};

    #[test]
    fn collect_merges_local_and_remote() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        // stored by another node
        storage.store(&session("remote-only", "r").snapshot()).unwrap();
        let manager = manager_with(Box::new(LocalOptimizer), Arc::clone(&storage));
        manager.add_session(session("local-only", "l"));

        let mut data = manager.data_snapshot();
        manager.collect(&mut data, 0.0, epoch_ms()).unwrap();

        let remote = data.session("remote-only").unwrap();
        assert_eq!(remote.old_placement, Placement::Remote);
        assert!(remote.local_size.is_some());
        assert_eq!(
            remote.remote_size,
            Some(storage.stored().unwrap()[0].remote_size)
        );

        let local = data.session("local-only").unwrap();
        assert_eq!(local.old_placement, Placement::Local);
        assert_eq!(local.accesses, 1);
        assert!(local.remote_size.is_some());

        let (name, props) = data.active_storage().unwrap();
        assert_eq!(name, "memory");
        assert_eq!(props.capacity, 1 << 20);
        assert!(manager.is_remote("remote-only"));
        assert_eq!(manager.tracked_locks(), 2);
    }

    #[test]
    fn resident_in_both_is_both() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(BothOptimizer), Arc::clone(&storage));
        manager.add_session(session("a", "x"));
        manager.run_cycle().unwrap();
        assert!(storage.contains("a"));

        let mut data = manager.data_snapshot();
        manager.collect(&mut data, 0.0, epoch_ms()).unwrap();
        assert_eq!(data.session("a").unwrap().old_placement, Placement::Both);
    }

    #[test]
    fn vanished_sessions_are_marked_drop() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(LocalOptimizer), Arc::clone(&storage));
        manager.add_session(session("a", "x"));
        let mut data = manager.data_snapshot();
        manager.collect(&mut data, 0.0, epoch_ms()).unwrap();
        manager.registry.clear();
        manager.collect(&mut data, 0.0, epoch_ms()).unwrap();
        assert_eq!(data.session("a").unwrap().old_placement, Placement::Drop);
    }

    #[test]
    fn unreachable_storage_fails_collection() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(LocalOptimizer), Arc::clone(&storage));
        manager.add_session(session("a", "x"));
        storage.set_offline(true);
        assert!(manager.run_cycle().is_err());
        assert!(manager.is_local("a"));
    }
}
