//! Placement through the CHP knapsack heuristic.
//!
//! Every session is a group with one configuration per placement; the
//! resource vector is `[local bytes, remote bytes]` and the constraint vector
//! `[local capacity, remote capacity]`.

use std::collections::BTreeMap;

use crate::error::SolveError;
use crate::model::{OptimizationData, Solution};
use crate::placement::Placement;
use crate::solver::chp::{self, ChpSolver, Configuration};
use crate::utility::evaluate_utility;

use super::{PlacementSolver, active_storage};

#[derive(Debug, Clone, Copy)]
pub struct ChpOptimizer {
    set_cutoff: usize,
}

impl ChpOptimizer {
    #[must_use]
    pub fn new(set_cutoff: usize) -> Self {
        Self { set_cutoff }
    }
}

impl Default for ChpOptimizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHP_SET_CUTOFF)
    }
}

impl PlacementSolver for ChpOptimizer {
    fn name(&self) -> &'static str {
        "chp"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        if data.is_empty() {
            return Ok(Solution::empty());
        }
        let storage = active_storage(data)?;

        let mut ids = Vec::with_capacity(data.session_count());
        let mut groups = Vec::with_capacity(data.session_count());
        for (id, session) in data.sessions() {
            let local = session.local_bytes();
            let remote = session.remote_bytes();
            // indices follow Placement::ALL
            let options = Placement::ALL
                .iter()
                .map(|placement| {
                    let resources = match placement {
                        Placement::Local => vec![local, 0],
                        Placement::Remote => vec![0, remote],
                        Placement::Both => vec![local, remote],
                        Placement::Drop => vec![0, 0],
                    };
                    Configuration::new(
                        evaluate_utility(session, *placement, storage, data),
                        resources,
                    )
                })
                .collect();
            ids.push(id);
            groups.push(options);
        }

        let solver = ChpSolver::new(vec![data.local_capacity, storage.capacity], self.set_cutoff);
        let frontier = solver
            .solve(groups)?
            .ok_or_else(|| SolveError::NoSolution("no feasible configuration".to_string()))?;
        let top = chp::best(&frontier)
            .ok_or_else(|| SolveError::NoSolution("empty frontier".to_string()))?;

        let placements: BTreeMap<String, Placement> = ids
            .iter()
            .enumerate()
            .map(|(group, id)| {
                let placement = top
                    .source(group)
                    .and_then(|index| Placement::ALL.get(index).copied())
                    .unwrap_or(Placement::Drop);
                ((*id).to_string(), placement)
            })
            .collect();

        Ok(Solution::new(placements, top.value()))
    }
}
