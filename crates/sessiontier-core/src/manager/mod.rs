//! Session manager: owns local sessions and runs the placement cycle.
//!
//! One cycle collects a snapshot of every known session, lets the transform
//! chain perturb values, asks the configured solver for new placements and
//! moves sessions between local memory and remote storage to match.
//!
//! # Locking
//!
//! - The data lock guards the [`OptimizationData`] snapshot, the predictor
//!   and the last utility. It is held for collect, transform and solve, and
//!   released before relocation.
//! - Every session has a reentrant lock, created on first sighting and only
//!   removed during cleanup.
//! - Order is data lock, then session lock. Nothing takes the data lock while
//!   holding a session lock.

mod collect;
mod relocate;
mod scavenge;

pub use relocate::RelocationStats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::access::AccessTracker;
use crate::config::Config;
use crate::crash::CrashGenerator;
use crate::error::{Result, StorageError};
use crate::locks::SessionLocks;
use crate::model::OptimizationData;
use crate::optimizer::{PlacementSolver, solver_from_config};
use crate::placement::Placement;
use crate::predictor::{IntegratingPredictor, Predictor};
use crate::scheduler::RepeatingTask;
use crate::session::{Session, SessionListener, SessionRegistry, epoch_ms};
use crate::size::{SerializingSizeEvaluator, SizeEvaluator};
use crate::storage::SessionStorage;
use crate::transform::{Transform, transforms_from_config};

/// State guarded by the data lock.
#[derive(Debug)]
struct CycleState {
    data: OptimizationData,
    predictor: Box<dyn Predictor>,
    last_utility: f64,
}

/// Outcome of one [`SessionManager::run_cycle`].
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub solver: &'static str,
    /// Sessions in the snapshot handed to the solver
    pub sessions: usize,
    /// Aggregate utility of the chosen placements; `None` when the solver gave up
    pub utility: Option<f64>,
    pub relocation: RelocationStats,
    pub elapsed: Duration,
    /// Predicted length of the next period, seconds
    pub next_period: f64,
}

pub struct SessionManager {
    config: Config,
    storage: Arc<dyn SessionStorage>,
    solver: Box<dyn PlacementSolver>,
    transforms: Vec<Box<dyn Transform>>,
    sizes: Box<dyn SizeEvaluator>,
    registry: SessionRegistry,
    locks: SessionLocks,
    access: AccessTracker,
    state: Mutex<CycleState>,
    /// Remote residency: id -> request count of the stored copy, if known
    remote: RwLock<HashMap<String, Option<u64>>>,
    rubbish: Mutex<Vec<String>>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("solver", &self.solver.name())
            .field("storage", &self.storage.name())
            .field("local_sessions", &self.registry.len())
            .field("remote_sessions", &self.remote.read().len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build a manager from configuration. Solver and transforms are
    /// resolved by name; unknown names fall back to the defaults.
    #[must_use]
    pub fn new(config: Config, storage: Arc<dyn SessionStorage>) -> Self {
        let solver = solver_from_config(&config);
        let transforms = transforms_from_config(&config);
        let mut data = OptimizationData::new(config.local_capacity_bytes, config.local_mttf);
        data.optimizer_period = config.persist_period_secs as f64;

        info!(
            solver = solver.name(),
            storage = storage.name(),
            transforms = ?transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "session manager configured"
        );

        Self {
            config,
            storage,
            solver,
            transforms,
            sizes: Box::new(SerializingSizeEvaluator::default()),
            registry: SessionRegistry::new(),
            locks: SessionLocks::new(),
            access: AccessTracker::new(),
            state: Mutex::new(CycleState {
                data,
                predictor: Box::new(IntegratingPredictor::new()),
                last_utility: 0.0,
            }),
            remote: RwLock::new(HashMap::new()),
            rubbish: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_solver(mut self, solver: Box<dyn PlacementSolver>) -> Self {
        self.solver = solver;
        self
    }

    #[must_use]
    pub fn with_transforms(mut self, transforms: Vec<Box<dyn Transform>>) -> Self {
        self.transforms = transforms;
        self
    }

    #[must_use]
    pub fn with_size_evaluator(mut self, sizes: Box<dyn SizeEvaluator>) -> Self {
        self.sizes = sizes;
        self
    }

    #[must_use]
    pub fn with_predictor(self, predictor: Box<dyn Predictor>) -> Self {
        self.state.lock().predictor = predictor;
        self
    }

    /// Register a hook notified on every [`touch_session`](Self::touch_session).
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Sessions resident in local memory.
    #[must_use]
    pub fn local_sessions(&self) -> Vec<Arc<Session>> {
        self.registry.snapshot()
    }

    #[must_use]
    pub fn is_local(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Whether the manager believes a copy of `id` is in remote storage.
    #[must_use]
    pub fn is_remote(&self, id: &str) -> bool {
        self.remote.read().contains_key(id)
    }

    /// Residency as the manager currently sees it.
    #[must_use]
    pub fn placement_of(&self, id: &str) -> Placement {
        match (self.is_local(id), self.is_remote(id)) {
            (true, true) => Placement::Both,
            (true, false) => Placement::Local,
            (false, true) => Placement::Remote,
            (false, false) => Placement::Drop,
        }
    }

    /// Copy of the last collected snapshot.
    #[must_use]
    pub fn data_snapshot(&self) -> OptimizationData {
        self.state.lock().data.clone()
    }

    #[must_use]
    pub fn last_utility(&self) -> f64 {
        self.state.lock().last_utility
    }

    /// Predicted length of the next period, seconds.
    #[must_use]
    pub fn optimizer_period(&self) -> f64 {
        self.state.lock().data.optimizer_period
    }

    #[must_use]
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    // -----------------------------------------------------------------------
    // Session API
    // -----------------------------------------------------------------------

    /// Create a fresh local session with a random id.
    pub fn create_session(&self) -> Arc<Session> {
        let id = format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>());
        let session = Arc::new(Session::new(id, self.config.max_inactive_secs));
        self.add_session(Arc::clone(&session));
        session
    }

    /// Take ownership of a session in local memory.
    pub fn add_session(&self, session: Arc<Session>) {
        let lock = self.locks.ensure(session.id());
        let _guard = lock.lock();
        self.access.record(session.id(), session.accessed_ms());
        debug!(session_id = session.id(), "session added");
        self.registry.insert(session);
    }

    /// A valid session from local memory, or restored from remote storage.
    pub fn get_session(&self, id: &str) -> std::result::Result<Option<Arc<Session>>, StorageError> {
        if let Some(session) = self.registry.get_valid(id) {
            return Ok(Some(session));
        }
        if !self.is_remote(id) {
            return Ok(None);
        }

        let lock = self.locks.ensure(id);
        let _guard = lock.lock();
        // relocation may have restored it while we waited
        if let Some(session) = self.registry.get_valid(id) {
            return Ok(Some(session));
        }
        match self.storage.load(id)? {
            Some(data) => {
                let session = Arc::new(Session::from_snapshot(data));
                self.registry.insert(Arc::clone(&session));
                debug!(session_id = id, "session restored from remote storage");
                Ok(Some(session))
            }
            None => {
                warn!(session_id = id, "session listed remotely but not found");
                self.remote.write().remove(id);
                Ok(None)
            }
        }
    }

    /// Resolve a session for a request: record the access and notify listeners.
    pub fn touch_session(&self, id: &str) -> std::result::Result<Option<Arc<Session>>, StorageError> {
        let Some(session) = self.get_session(id)? else {
            return Ok(None);
        };
        let now = epoch_ms();
        if !session.access(now) {
            return Ok(None);
        }
        self.access.record(id, now);
        for listener in self.listeners.read().iter() {
            listener.session_accessed(id);
        }
        Ok(Some(session))
    }

    /// Remove a session from local memory and remote storage. Returns whether
    /// it was resident anywhere.
    pub fn remove_session(&self, id: &str) -> std::result::Result<bool, StorageError> {
        self.evict(id, false)
    }

    /// Invalidate and remove a session.
    pub fn invalidate_session(&self, id: &str) -> std::result::Result<bool, StorageError> {
        self.evict(id, true)
    }

    /// The remote copy goes first: when storage fails nothing has changed.
    fn evict(&self, id: &str, invalidate: bool) -> std::result::Result<bool, StorageError> {
        let lock = self.locks.get(id);
        let _guard = lock.as_ref().map(|lock| lock.lock());

        let remote = self.is_remote(id);
        if remote {
            self.storage.remove(id)?;
            self.remote.write().remove(id);
        }
        let local = match self.registry.remove(id) {
            Some(session) => {
                if invalidate {
                    session.invalidate();
                }
                true
            }
            None => false,
        };
        self.bin(id);
        Ok(local || remote)
    }

    /// Lose everything in local memory.
    pub fn crash(&self) -> usize {
        let ids: Vec<String> = self
            .registry
            .snapshot()
            .iter()
            .map(|session| session.id().to_string())
            .collect();
        let lost = self.registry.clear();
        for id in &ids {
            self.bin(id);
        }
        warn!(lost_sessions = lost, "simulated crash cleared local memory");
        lost
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    /// Collect, transform, solve, relocate, clean up and predict the next period.
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        self.cleanup();
        let now = epoch_ms();

        let (solution, previous, sessions) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            self.collect(&mut state.data, state.last_utility, now)?;
            for transform in &self.transforms {
                transform.apply(&mut state.data);
            }

            let sessions = state.data.session_count();
            match self.solver.solve(&state.data) {
                Ok(solution) => {
                    state.last_utility = solution.value();
                    info!(
                        solver = self.solver.name(),
                        sessions,
                        utility = solution.value(),
                        "placement solved"
                    );
                    let previous: HashMap<String, Placement> = state
                        .data
                        .sessions()
                        .map(|(id, props)| (id.to_string(), props.old_placement))
                        .collect();
                    (Some(solution), previous, sessions)
                }
                Err(err) if err.is_fatal() => {
                    error!(solver = self.solver.name(), error = %err, "solver failed; cycle aborted");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(solver = self.solver.name(), error = %err, "no solution; keeping residency");
                    (None, HashMap::new(), sessions)
                }
            }
        };

        let relocation = match &solution {
            Some(solution) => self.relocate(solution, &previous),
            None => RelocationStats::default(),
        };
        self.cleanup();

        let elapsed = started.elapsed();
        let next_period = self.reschedule(elapsed);
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            next_period,
            dropped = relocation.dropped,
            local = relocation.local,
            remote = relocation.remote,
            both = relocation.both,
            "cycle finished"
        );

        Ok(CycleReport {
            solver: self.solver.name(),
            sessions,
            utility: solution.as_ref().map(crate::model::Solution::value),
            relocation,
            elapsed,
            next_period,
        })
    }

    fn reschedule(&self, elapsed: Duration) -> f64 {
        let observed = elapsed.as_secs_f64() + self.config.persist_period_secs as f64;
        let mut state = self.state.lock();
        let next = state.predictor.predict_next(observed).max(0.0);
        state.data.optimizer_period = next;
        next
    }

    fn bin(&self, id: &str) {
        self.rubbish.lock().push(id.to_string());
    }

    /// Purge binned ids from the snapshot, the lock table and the access
    /// tracker. Ids that became resident again since binning are kept.
    fn cleanup(&self) -> usize {
        let binned = std::mem::take(&mut *self.rubbish.lock());
        if binned.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        let mut purged = 0;
        for id in &binned {
            if self.registry.contains(id) || self.is_remote(id) {
                continue;
            }
            state.data.remove_session(id);
            self.locks.remove(id);
            self.access.remove(id);
            purged += 1;
        }
        debug!(purged, "emptied rubbish bin");
        purged
    }

    // -----------------------------------------------------------------------
    // Background tasks
    // -----------------------------------------------------------------------

    /// Spawn the placement cycle, the scavenger and, when enabled, the crash
    /// generator on the current tokio runtime.
    #[must_use]
    pub fn start(self: &Arc<Self>) -> ManagerHandle {
        let mut tasks = Vec::new();

        let manager = Arc::clone(self);
        let period = self.config.persist_period();
        tasks.push(RepeatingTask::spawn(
            "placement",
            move || period,
            move || manager.run_cycle().map(|_| ()),
        ));

        let manager = Arc::clone(self);
        let period = self.config.scavenge_period();
        tasks.push(RepeatingTask::spawn(
            "scavenger",
            move || period,
            move || manager.scavenge().map(|_| ()),
        ));

        if self.config.crash_simulation {
            if let Some(generator) = CrashGenerator::new(self.config.local_mttf) {
                info!(mttf_secs = generator.mttf_secs(), "crash simulation enabled");
                let manager = Arc::clone(self);
                tasks.push(RepeatingTask::spawn(
                    "crash",
                    move || generator.next_delay(),
                    move || {
                        manager.crash();
                        Ok(())
                    },
                ));
            }
        }

        info!(tasks = tasks.len(), "session manager started");
        ManagerHandle { tasks }
    }
}

/// Background tasks of a started manager.
#[derive(Debug)]
pub struct ManagerHandle {
    tasks: Vec<RepeatingTask>,
}

impl ManagerHandle {
    #[must_use]
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(RepeatingTask::name).collect()
    }

    /// Stop every task, waiting for running bodies to finish.
    pub async fn shutdown(self) -> Result<()> {
        for task in &self.tasks {
            task.cancel();
        }
        for task in self.tasks {
            task.join().await?;
        }
        info!("session manager stopped");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::optimizer::{LocalOptimizer, RemoteOptimizer};
    use crate::storage::MemorySessionStorage;
    use crate::transform::NoChange;
    use serde_json::json;

    pub(crate) fn manager_with(
        solver: Box<dyn PlacementSolver>,
        storage: Arc<MemorySessionStorage>,
    ) -> SessionManager {
        SessionManager::new(Config::default(), storage)
            .with_solver(solver)
            .with_transforms(vec![Box::new(NoChange)])
    }

    pub(crate) fn session(id: &str, payload: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(id, 1800));
        session.set_attribute("payload", json!(payload));
        session
    }

    #[test]
    fn get_session_restores_from_remote() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(RemoteOptimizer), Arc::clone(&storage));
        manager.add_session(session("a", "hello"));
        manager.run_cycle().unwrap();
        assert_eq!(manager.placement_of("a"), Placement::Remote);

        let restored = manager.get_session("a").unwrap().unwrap();
        assert_eq!(restored.attribute("payload"), Some(json!("hello")));
        assert_eq!(manager.placement_of("a"), Placement::Both);
        assert!(manager.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn touch_records_access_and_notifies() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl SessionListener for Counting {
            fn session_accessed(&self, _id: &str) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(LocalOptimizer), storage);
        let listener = Arc::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
        manager.add_listener(Arc::clone(&listener) as Arc<dyn SessionListener>);

        let created = manager.create_session();
        assert_eq!(created.id().len(), 32);
        manager.touch_session(created.id()).unwrap().unwrap();
        manager.touch_session(created.id()).unwrap().unwrap();
        assert_eq!(created.requests(), 2);
        assert_eq!(listener.0.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(manager.touch_session("nope").unwrap().is_none());
    }

    #[test]
    fn remove_and_invalidate_clear_residency() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(RemoteOptimizer), Arc::clone(&storage));
        manager.add_session(session("a", "x"));
        manager.add_session(session("b", "y"));
        manager.run_cycle().unwrap();
        assert!(storage.contains("a"));

        assert!(manager.remove_session("a").unwrap());
        assert!(!storage.contains("a"));
        assert!(!manager.remove_session("a").unwrap());

        let b = manager.get_session("b").unwrap().unwrap();
        assert!(manager.invalidate_session("b").unwrap());
        assert!(!b.is_valid());
        assert_eq!(manager.placement_of("b"), Placement::Drop);

        manager.run_cycle().unwrap();
        assert_eq!(manager.tracked_locks(), 0);
        assert!(manager.data_snapshot().is_empty());
    }

    #[test]
    fn crash_empties_local_memory() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(LocalOptimizer), storage);
        manager.add_session(session("a", "x"));
        manager.add_session(session("b", "x"));
        assert_eq!(manager.crash(), 2);
        assert!(manager.local_sessions().is_empty());

        // lost sessions are forgotten by the next cycle
        manager.run_cycle().unwrap();
        manager.run_cycle().unwrap();
        assert!(manager.data_snapshot().is_empty());
        assert_eq!(manager.tracked_locks(), 0);
    }

    #[test]
    fn period_is_predicted_from_persist_period() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let manager = manager_with(Box::new(LocalOptimizer), storage);
        assert_eq!(manager.optimizer_period(), 20.0);
        let report = manager.run_cycle().unwrap();
        // first prediction is the observation: persist period plus elapsed
        assert!(report.next_period >= 20.0 && report.next_period < 21.0);
        assert_eq!(manager.optimizer_period(), report.next_period);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_spawns_tasks_and_shuts_down() {
        let storage = Arc::new(MemorySessionStorage::new(1 << 20));
        let mut config = Config::default();
        config.local_mttf = 3600.0;
        let manager = Arc::new(SessionManager::new(config, storage));
        let handle = manager.start();
        assert_eq!(handle.task_names(), vec!["placement", "scavenger", "crash"]);
        handle.shutdown().await.unwrap();

        let mut quiet = Config::default();
        quiet.crash_simulation = false;
        quiet.local_mttf = 3600.0;
        let manager = Arc::new(SessionManager::new(
            quiet,
            Arc::new(MemorySessionStorage::new(1 << 20)),
        ));
        let handle = manager.start();
        assert_eq!(handle.task_names(), vec!["placement", "scavenger"]);
        handle.shutdown().await.unwrap();
    }
}
