//! Placement solvers.
//!
//! Every solver maps an [`OptimizationData`] snapshot to a [`Solution`] that
//! assigns each session exactly one [`Placement`] without exceeding the local
//! or remote capacity.
//!
//! | Name              | Strategy                                                  |
//! |-------------------|-----------------------------------------------------------|
//! | `local`           | by value, admit into local memory while it fits           |
//! | `remote`          | by value, admit into remote storage while it fits         |
//! | `both`            | by value, first of LOCAL / REMOTE / BOTH that fits        |
//! | `greedy-adjusted` | all (session, placement) pairs by utility per local byte  |
//! | `greedy-toyoda`   | Toyoda effective-gradient ordering                        |
//! | `random-no-drop`  | uniform among feasible placements, DROP only when forced  |
//! | `lp`              | exact 0/1 program through a [`LinearBackend`]             |
//! | `chp`             | multidimensional knapsack heuristic over a Pareto frontier |
//!
//! [`LinearBackend`]: crate::solver::linear::LinearBackend

mod chp;
mod greedy_adjusted;
mod lp;
mod random;
mod single;
mod toyoda;

pub use chp::ChpOptimizer;
pub use greedy_adjusted::GreedyAdjustedOptimizer;
pub use lp::{LpOptimizer, SCALING_FACTOR};
pub use random::RandomNoDropOptimizer;
pub use single::{BothOptimizer, LocalOptimizer, RemoteOptimizer};
pub use toyoda::GreedyToyodaOptimizer;

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::config::{Config, DEFAULT_SOLVER};
use crate::error::SolveError;
use crate::model::{OptimizationData, SessionProperties, Solution, StorageProperties};
use crate::placement::Placement;

/// A strategy that decides where every session should live.
pub trait PlacementSolver: Send + Sync {
    /// Registry name of the solver.
    fn name(&self) -> &'static str;

    /// Assign a placement to every session of `data`.
    ///
    /// A snapshot without sessions yields an empty solution. A snapshot with
    /// sessions but no registered remote storage yields
    /// [`SolveError::NoSolution`].
    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Known solver implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverKind {
    Local,
    Remote,
    Both,
    GreedyAdjusted,
    GreedyToyoda,
    RandomNoDrop,
    Lp,
    Chp,
}

impl SolverKind {
    pub const ALL: [SolverKind; 8] = [
        SolverKind::Local,
        SolverKind::Remote,
        SolverKind::Both,
        SolverKind::GreedyAdjusted,
        SolverKind::GreedyToyoda,
        SolverKind::RandomNoDrop,
        SolverKind::Lp,
        SolverKind::Chp,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Both => "both",
            Self::GreedyAdjusted => "greedy-adjusted",
            Self::GreedyToyoda => "greedy-toyoda",
            Self::RandomNoDrop => "random-no-drop",
            Self::Lp => "lp",
            Self::Chp => "chp",
        }
    }

    /// Construct the solver.
    #[must_use]
    pub fn build(self, settings: &SolverSettings) -> Box<dyn PlacementSolver> {
        match self {
            Self::Local => Box::new(LocalOptimizer),
            Self::Remote => Box::new(RemoteOptimizer),
            Self::Both => Box::new(BothOptimizer),
            Self::GreedyAdjusted => Box::new(GreedyAdjustedOptimizer),
            Self::GreedyToyoda => Box::new(GreedyToyodaOptimizer),
            Self::RandomNoDrop => Box::new(match settings.seed {
                Some(seed) => RandomNoDropOptimizer::with_seed(seed),
                None => RandomNoDropOptimizer::new(),
            }),
            Self::Lp => Box::new(LpOptimizer::default()),
            Self::Chp => Box::new(ChpOptimizer::new(settings.chp_set_cutoff)),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("unknown solver: {s}. Expected one of: {}", names.join(", "))
            })
    }
}

/// Construction parameters shared by all solvers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverSettings {
    pub chp_set_cutoff: usize,
    /// Seed for randomized solvers; entropy-seeded when `None`
    pub seed: Option<u64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            chp_set_cutoff: crate::config::DEFAULT_CHP_SET_CUTOFF,
            seed: None,
        }
    }
}

impl From<&Config> for SolverSettings {
    fn from(config: &Config) -> Self {
        Self {
            chp_set_cutoff: config.chp_set_cutoff,
            seed: None,
        }
    }
}

/// The configured solver kind, falling back to the default on unknown names.
#[must_use]
pub fn configured_kind(config: &Config) -> SolverKind {
    config.solver.parse::<SolverKind>().unwrap_or_else(|err| {
        warn!(solver = %config.solver, error = %err, fallback = DEFAULT_SOLVER, "unknown solver; using default");
        SolverKind::Lp
    })
}

/// Resolve the configured solver, falling back to the default on unknown names.
#[must_use]
pub fn solver_from_config(config: &Config) -> Box<dyn PlacementSolver> {
    configured_kind(config).build(&SolverSettings::from(config))
}

// =============================================================================
// Shared helpers
// =============================================================================

/// The remote storage a solve runs against.
pub(crate) fn active_storage(data: &OptimizationData) -> Result<&StorageProperties, SolveError> {
    data.active_storage()
        .map(|(_, storage)| storage)
        .ok_or_else(|| SolveError::NoSolution("no remote storage registered".to_string()))
}

/// Sessions sorted descending by value; equal values keep ascending id order.
pub(crate) fn by_value_desc(data: &OptimizationData) -> Vec<(&str, &SessionProperties)> {
    let mut sessions: Vec<_> = data.sessions().collect();
    sessions.sort_by(|a, b| b.1.value.total_cmp(&a.1.value));
    sessions
}

/// Remaining local and remote capacity during a greedy pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capacities {
    pub local: u64,
    pub remote: u64,
}

impl Capacities {
    pub(crate) fn new(data: &OptimizationData, storage: &StorageProperties) -> Self {
        Self {
            local: data.local_capacity,
            remote: storage.capacity,
        }
    }

    pub(crate) fn fits(&self, placement: Placement, session: &SessionProperties) -> bool {
        let local_ok = self.local >= session.local_bytes();
        let remote_ok = self.remote >= session.remote_bytes();
        match placement {
            Placement::Local => local_ok,
            Placement::Remote => remote_ok,
            Placement::Both => local_ok && remote_ok,
            Placement::Drop => true,
        }
    }

    /// Consume the capacity `placement` needs. Callers check [`Self::fits`] first.
    pub(crate) fn take(&mut self, placement: Placement, session: &SessionProperties) {
        if placement.uses_local() {
            self.local = self.local.saturating_sub(session.local_bytes());
        }
        if placement.uses_remote() {
            self.remote = self.remote.saturating_sub(session.remote_bytes());
        }
    }
}
