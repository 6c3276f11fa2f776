//! Value-ordered greedy solvers.
//!
//! All three walk the sessions from the most to the least valuable and admit
//! each one as long as the remaining capacity allows; anything that does not
//! fit is dropped.

use std::collections::BTreeMap;

use crate::error::SolveError;
use crate::model::{OptimizationData, Solution};
use crate::placement::Placement;
use crate::utility::evaluate_utility;

use super::{Capacities, PlacementSolver, active_storage, by_value_desc};

/// Keeps the most valuable sessions in local memory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOptimizer;

/// Keeps the most valuable sessions in remote storage only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteOptimizer;

/// Admits each session into whichever of LOCAL, REMOTE or BOTH still fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct BothOptimizer;

/// Shared value-ordered pass; `choose` picks the placement for one session.
fn greedy_by_value(
    data: &OptimizationData,
    choose: impl Fn(&Capacities, &crate::model::SessionProperties) -> Placement,
) -> Result<Solution, SolveError> {
    if data.is_empty() {
        return Ok(Solution::empty());
    }
    let storage = active_storage(data)?;
    let mut capacities = Capacities::new(data, storage);
    let mut placements = BTreeMap::new();
    let mut value = 0.0;

    for (id, session) in by_value_desc(data) {
        let placement = choose(&capacities, session);
        capacities.take(placement, session);
        value += evaluate_utility(session, placement, storage, data);
        placements.insert(id.to_string(), placement);
    }

    Ok(Solution::new(placements, value))
}

impl PlacementSolver for LocalOptimizer {
    fn name(&self) -> &'static str {
        "local"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        greedy_by_value(data, |caps, session| {
            if caps.fits(Placement::Local, session) {
                Placement::Local
            } else {
                Placement::Drop
            }
        })
    }
}

impl PlacementSolver for RemoteOptimizer {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        greedy_by_value(data, |caps, session| {
            if caps.fits(Placement::Remote, session) {
                Placement::Remote
            } else {
                Placement::Drop
            }
        })
    }
}

impl PlacementSolver for BothOptimizer {
    fn name(&self) -> &'static str {
        "both"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        greedy_by_value(data, |caps, session| {
            let local = caps.fits(Placement::Local, session);
            let remote = caps.fits(Placement::Remote, session);
            match (local, remote) {
                (true, true) => Placement::Both,
                (true, false) => Placement::Local,
                (false, true) => Placement::Remote,
                (false, false) => Placement::Drop,
            }
        })
    }
}
