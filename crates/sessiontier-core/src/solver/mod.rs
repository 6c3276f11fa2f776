//! Placement-agnostic optimization engines.
//!
//! - [`linear`]: a small linear-program contract with [`milp::MicroLpBackend`]
//!   as the default backend
//! - [`chp`]: the CHP heuristic for multiple-choice multidimensional knapsacks

pub mod chp;
pub mod linear;
pub mod milp;

pub use chp::{ChpSolver, Configuration};
pub use linear::{
    Goal, LinearBackend, LinearConstraint, LinearObjective, LinearProblemError, LinearProgram,
    LinearSolution, Sign, Var,
};
pub use milp::MicroLpBackend;
