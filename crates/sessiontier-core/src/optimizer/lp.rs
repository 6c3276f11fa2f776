//! Exact 0/1 formulation of the placement problem.
//!
//! ```text
//! maximize   Σ_s Σ_p  utility(s, p) · SCALE · x[s,p]
//! subject to Σ_p x[s,p] = 1                              for every session s
//!            Σ_s local_size(s)  · (x[s,LOCAL]  + x[s,BOTH]) ≤ local capacity
//!            Σ_s remote_size(s) · (x[s,REMOTE] + x[s,BOTH]) ≤ remote capacity
//!            x[s,p] ∈ {0, 1}
//! ```
//!
//! The backend's assignment is decoded greedily: variables in descending
//! order of their value, each admitted only if its session is still open and
//! the capacity allows. For an integral optimum this reproduces it exactly.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::SolveError;
use crate::model::{OptimizationData, Solution};
use crate::placement::Placement;
use crate::solver::linear::{
    Goal, LinearBackend, LinearConstraint, LinearObjective, LinearProgram, Sign, Var,
};
use crate::solver::milp::MicroLpBackend;
use crate::utility::evaluate_utility;

use super::{Capacities, PlacementSolver, active_storage};

/// Objective coefficients are utilities multiplied by this factor.
pub const SCALING_FACTOR: f64 = 1e3;

#[derive(Debug, Clone)]
pub struct LpOptimizer {
    backend: Arc<dyn LinearBackend>,
}

impl LpOptimizer {
    #[must_use]
    pub fn new(backend: Arc<dyn LinearBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl Default for LpOptimizer {
    fn default() -> Self {
        Self::new(Arc::new(MicroLpBackend))
    }
}

struct Decision<'a> {
    id: &'a str,
    placement: Placement,
    var: Var,
    utility: f64,
}

impl PlacementSolver for LpOptimizer {
    fn name(&self) -> &'static str {
        "lp"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        if data.is_empty() {
            return Ok(Solution::empty());
        }
        let storage = active_storage(data)?;

        let mut program = LinearProgram::new();
        let mut objective = LinearObjective::new(Goal::Max);
        let mut local_row = LinearConstraint::new(Sign::Le, data.local_capacity as f64);
        let mut remote_row = LinearConstraint::new(Sign::Le, storage.capacity as f64);
        let mut decisions = Vec::with_capacity(data.session_count() * 4);

        for (id, session) in data.sessions() {
            let mut one_placement = LinearConstraint::new(Sign::Eq, 1.0);
            for placement in Placement::ALL {
                let var = program.variable();
                program.set_boolean(var, true);
                let utility = evaluate_utility(session, placement, storage, data);
                objective.put(var, utility * SCALING_FACTOR);
                one_placement.put(var, 1.0);
                if placement.uses_local() {
                    local_row.put(var, session.local_bytes() as f64);
                }
                if placement.uses_remote() {
                    remote_row.put(var, session.remote_bytes() as f64);
                }
                decisions.push(Decision {
                    id,
                    placement,
                    var,
                    utility,
                });
            }
            program.add_constraint(one_placement);
        }
        program
            .set_objective(objective)
            .add_constraint(local_row)
            .add_constraint(remote_row);

        let result = self.backend.solve(&program).map_err(|err| {
            warn!(backend = self.backend.name(), error = %err, "linear program not solved");
            SolveError::NoSolution(err.to_string())
        })?;

        decisions.sort_by(|a, b| result.value(b.var).total_cmp(&result.value(a.var)));

        let mut capacities = Capacities::new(data, storage);
        let mut placements: BTreeMap<String, Placement> = BTreeMap::new();
        let mut value = 0.0;
        for decision in decisions {
            if placements.contains_key(decision.id) {
                continue;
            }
            let Some(session) = data.session(decision.id) else {
                continue;
            };
            if !capacities.fits(decision.placement, session) {
                continue;
            }
            capacities.take(decision.placement, session);
            value += decision.utility;
            placements.insert(decision.id.to_string(), decision.placement);
        }

        Ok(Solution::new(placements, value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{assert_valid, snapshot};
    use super::super::LocalOptimizer;
    use super::*;
    use crate::solver::linear::{LinearProblemError, LinearSolution};

    #[test]
    fn beats_value_greedy_on_packing() {
        let data = snapshot(10, 0, &[("a", 6.0, 6, 1), ("b", 5.0, 5, 1), ("c", 5.0, 5, 1)]);
        let greedy = LocalOptimizer.solve(&data).unwrap();
        let exact = LpOptimizer::default().solve(&data).unwrap();
        assert_valid(&data, &exact);
        assert_eq!(exact.placement("a"), Some(Placement::Drop));
        assert_eq!(exact.placement("b"), Some(Placement::Local));
        assert_eq!(exact.placement("c"), Some(Placement::Local));
        assert!((exact.value() - 10.0).abs() < 1e-6);
        assert!(exact.value() > greedy.value());
    }

    #[test]
    fn every_session_gets_exactly_one_placement() {
        let data = snapshot(
            25,
            25,
            &[("a", 4.0, 10, 5), ("b", 3.0, 10, 5), ("c", 2.0, 10, 5), ("d", 1.0, 10, 5)],
        );
        let solution = LpOptimizer::default().solve(&data).unwrap();
        assert_valid(&data, &solution);
        assert_eq!(solution.counts().iter().sum::<usize>(), 4);
    }

    #[derive(Debug)]
    struct FailingBackend;

    impl LinearBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn solve(&self, _: &LinearProgram) -> Result<LinearSolution, LinearProblemError> {
            Err(LinearProblemError::Backend("license expired".to_string()))
        }
    }

    #[test]
    fn backend_failure_means_no_solution() {
        let data = snapshot(10, 10, &[("a", 1.0, 1, 1)]);
        let solver = LpOptimizer::new(Arc::new(FailingBackend));
        assert_eq!(solver.backend_name(), "failing");
        let err = solver.solve(&data).unwrap_err();
        assert!(matches!(err, SolveError::NoSolution(msg) if msg.contains("license expired")));
    }
}
