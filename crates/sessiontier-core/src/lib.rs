//! sessiontier-core: utility-driven placement of session state
//!
//! Sessions live in fast but unreliable local memory, in slower and costlier
//! remote storage, in both, or nowhere. Once per period the manager scores
//! every (session, placement) pair and solves a two-dimensional knapsack to
//! decide where each session should live next.
//!
//! # Architecture
//!
//! ```text
//! local registry + remote catalogue → collect → OptimizationData
//!                                                   ↓
//!                                     transforms → solver → Solution
//!                                                   ↓
//!                                   relocate → cleanup → predictor
//! ```
//!
//! # Modules
//!
//! - `model`: Optimization snapshot and solver output
//! - `utility`: Utility of a (session, placement) pair
//! - `optimizer`: Placement solvers (greedy family, LP, CHP)
//! - `solver`: Generic linear-program and CHP knapsack engines
//! - `predictor`: Period prediction
//! - `transform`: Value perturbations applied before each solve
//! - `manager`: Orchestration loop and session API
//! - `session`: Local sessions and their snapshots
//! - `storage`: Remote storage contract, codecs and reference backends
//! - `scheduler`: Self-rescheduling background tasks
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod access;
pub mod config;
pub mod crash;
pub mod error;
pub mod locks;
pub mod logging;
pub mod manager;
pub mod model;
pub mod optimizer;
pub mod placement;
pub mod predictor;
pub mod scheduler;
pub mod session;
pub mod size;
pub mod solver;
pub mod storage;
pub mod transform;
pub mod utility;

pub use config::Config;
pub use error::{Error, Result, SolveError, StorageError};
pub use manager::{CycleReport, ManagerHandle, SessionManager};
pub use model::{OptimizationData, SessionProperties, Solution, StorageProperties};
pub use optimizer::{PlacementSolver, SolverKind};
pub use placement::Placement;
pub use session::{Session, SessionData};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
