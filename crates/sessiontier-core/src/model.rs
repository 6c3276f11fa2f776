//! Per-cycle optimization snapshot and solver output.
//!
//! [`OptimizationData`] is rebuilt incrementally by the collector on every
//! cycle, mutated by value transforms and read by a solver. Sessions are kept
//! in an ordered map, so every solver iterates them in ascending id order and
//! ties always break the same way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::placement::Placement;

/// What the optimizer knows about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProperties {
    /// Utility score of keeping the session; mutated by transforms
    pub value: f64,
    /// Residency observed at the last collection
    pub old_placement: Placement,
    /// Size in local memory, bytes
    pub local_size: Option<u64>,
    /// Size in remote storage (serialized + compressed), bytes
    pub remote_size: Option<u64>,
    /// Accesses since the previous collection
    pub accesses: u32,
    /// Last access time, epoch ms
    pub last_access_ms: u64,
}

impl Default for SessionProperties {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_INITIAL_SESSION_VALUE, 0)
    }
}

impl SessionProperties {
    #[must_use]
    pub fn new(value: f64, last_access_ms: u64) -> Self {
        Self {
            value,
            old_placement: Placement::Drop,
            local_size: None,
            remote_size: None,
            accesses: 0,
            last_access_ms,
        }
    }

    /// Local size, treating an unmeasured session as empty.
    #[must_use]
    pub fn local_bytes(&self) -> u64 {
        self.local_size.unwrap_or(0)
    }

    /// Remote size, treating an unmeasured session as empty.
    #[must_use]
    pub fn remote_bytes(&self) -> u64 {
        self.remote_size.unwrap_or(0)
    }
}

/// Cost and reliability figures of a remote storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageProperties {
    /// Capacity in bytes
    pub capacity: u64,
    /// Mean time to failure, seconds
    pub mttf: f64,
    pub read_cost: f64,
    pub write_cost: f64,
    /// Cost per MiB per second
    pub storage_cost: f64,
}

impl Default for StorageProperties {
    fn default() -> Self {
        Self {
            capacity: 0,
            mttf: 0.0,
            read_cost: 0.0,
            write_cost: 0.0,
            storage_cost: 0.0,
        }
    }
}

/// Snapshot the solvers work on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationData {
    sessions: BTreeMap<String, SessionProperties>,
    storages: BTreeMap<String, StorageProperties>,
    /// Local memory budget, bytes
    pub local_capacity: u64,
    /// Mean time to failure of local memory, seconds (0 = never fails)
    pub local_mttf: f64,
    /// Predicted length of the next optimization period, seconds
    pub optimizer_period: f64,
}

impl OptimizationData {
    #[must_use]
    pub fn new(local_capacity: u64, local_mttf: f64) -> Self {
        Self {
            local_capacity,
            local_mttf,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn session(&self, id: &str) -> Option<&SessionProperties> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: &str) -> Option<&mut SessionProperties> {
        self.sessions.get_mut(id)
    }

    /// Properties for `id`, created with `make` on first sighting.
    pub fn session_entry(
        &mut self,
        id: &str,
        make: impl FnOnce() -> SessionProperties,
    ) -> &mut SessionProperties {
        self.sessions.entry(id.to_string()).or_insert_with(make)
    }

    pub fn insert_session(&mut self, id: impl Into<String>, props: SessionProperties) {
        self.sessions.insert(id.into(), props);
    }

    pub fn remove_session(&mut self, id: &str) -> Option<SessionProperties> {
        self.sessions.remove(id)
    }

    #[must_use]
    pub fn contains_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Sessions in ascending id order.
    pub fn sessions(&self) -> impl Iterator<Item = (&str, &SessionProperties)> {
        self.sessions.iter().map(|(id, props)| (id.as_str(), props))
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = (&str, &mut SessionProperties)> {
        self.sessions
            .iter_mut()
            .map(|(id, props)| (id.as_str(), props))
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn insert_storage(&mut self, name: impl Into<String>, props: StorageProperties) {
        self.storages.insert(name.into(), props);
    }

    #[must_use]
    pub fn storage(&self, name: &str) -> Option<&StorageProperties> {
        self.storages.get(name)
    }

    pub fn storage_mut(&mut self, name: &str) -> Option<&mut StorageProperties> {
        self.storages.get_mut(name)
    }

    /// The remote storage solvers place sessions on.
    ///
    /// Only one remote storage takes part in a cycle: the first registered name.
    #[must_use]
    pub fn active_storage(&self) -> Option<(&str, &StorageProperties)> {
        self.storages
            .iter()
            .next()
            .map(|(name, props)| (name.as_str(), props))
    }
}

/// Placement decision for every session of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    placements: BTreeMap<String, Placement>,
    value: f64,
}

impl Solution {
    #[must_use]
    pub fn new(placements: BTreeMap<String, Placement>, value: f64) -> Self {
        Self { placements, value }
    }

    /// Solution of a snapshot without sessions.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn placement(&self, id: &str) -> Option<Placement> {
        self.placements.get(id).copied()
    }

    pub fn placements(&self) -> impl Iterator<Item = (&str, Placement)> {
        self.placements.iter().map(|(id, p)| (id.as_str(), *p))
    }

    /// Aggregate utility of the assignment.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Bytes of local and remote capacity the assignment consumes.
    #[must_use]
    pub fn usage(&self, data: &OptimizationData) -> (u64, u64) {
        let mut local = 0u64;
        let mut remote = 0u64;
        for (id, placement) in &self.placements {
            let Some(props) = data.session(id) else {
                continue;
            };
            if placement.uses_local() {
                local = local.saturating_add(props.local_bytes());
            }
            if placement.uses_remote() {
                remote = remote.saturating_add(props.remote_bytes());
            }
        }
        (local, remote)
    }

    /// Number of sessions assigned to each placement, in canonical order.
    #[must_use]
    pub fn counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for placement in self.placements.values() {
            counts[placement.index()] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(local: u64, remote: u64) -> SessionProperties {
        SessionProperties {
            local_size: Some(local),
            remote_size: Some(remote),
            ..SessionProperties::new(1.0, 0)
        }
    }

    #[test]
    fn sessions_iterate_in_id_order() {
        let mut data = OptimizationData::new(100, 0.0);
        data.insert_session("b", props(1, 1));
        data.insert_session("a", props(1, 1));
        data.insert_session("c", props(1, 1));
        let ids: Vec<&str> = data.sessions().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn session_entry_creates_once() {
        let mut data = OptimizationData::default();
        data.session_entry("s", || SessionProperties::new(2.0, 5)).value = 7.0;
        let entry = data.session_entry("s", || SessionProperties::new(2.0, 5));
        assert_eq!(entry.value, 7.0);
        assert_eq!(data.session_count(), 1);
    }

    #[test]
    fn active_storage_is_first_registered_name() {
        let mut data = OptimizationData::default();
        assert!(data.active_storage().is_none());
        data.insert_storage("zeta", StorageProperties::default());
        data.insert_storage("alpha", StorageProperties { capacity: 9, ..Default::default() });
        let (name, storage) = data.active_storage().unwrap();
        assert_eq!(name, "alpha");
        assert_eq!(storage.capacity, 9);
    }

    #[test]
    fn solution_usage_sums_by_placement() {
        let mut data = OptimizationData::new(100, 0.0);
        data.insert_session("l", props(10, 4));
        data.insert_session("r", props(20, 5));
        data.insert_session("b", props(30, 6));
        data.insert_session("d", props(40, 7));
        let placements = BTreeMap::from([
            ("l".to_string(), Placement::Local),
            ("r".to_string(), Placement::Remote),
            ("b".to_string(), Placement::Both),
            ("d".to_string(), Placement::Drop),
        ]);
        let solution = Solution::new(placements, 3.0);
        assert_eq!(solution.usage(&data), (40, 11));
        assert_eq!(solution.counts(), [1, 1, 1, 1]);
        assert_eq!(solution.placement("r"), Some(Placement::Remote));
        assert_eq!(solution.placement("missing"), None);
    }

    #[test]
    fn missing_sizes_count_as_zero() {
        let p = SessionProperties::new(1.0, 0);
        assert_eq!(p.local_bytes(), 0);
        assert_eq!(p.remote_bytes(), 0);
        assert_eq!(p.old_placement, Placement::Drop);
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let json = r#"{
            "sessions": {"s1": {"value": 2.5, "local_size": 10}},
            "storages": {"disk": {"capacity": 100}},
            "local_capacity": 50
        }"#;
        let data: OptimizationData = serde_json::from_str(json).unwrap();
        let s1 = data.session("s1").unwrap();
        assert_eq!(s1.value, 2.5);
        assert_eq!(s1.remote_size, None);
        assert_eq!(data.active_storage().unwrap().1.capacity, 100);
        assert_eq!(data.optimizer_period, 0.0);
    }
}
