//! Greedy solver over all (session, placement) pairs.
//!
//! Every session contributes four candidates. Candidates that occupy local
//! memory are scored by utility per local byte, the others by raw utility.
//! Candidates are admitted best-first; the first admitted candidate of a
//! session decides its placement and DROP always admits.

use std::collections::BTreeMap;

use crate::error::SolveError;
use crate::model::{OptimizationData, Solution};
use crate::placement::Placement;
use crate::utility::evaluate_utility;

use super::{Capacities, PlacementSolver, active_storage};

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAdjustedOptimizer;

#[derive(Debug)]
struct Candidate<'a> {
    id: &'a str,
    placement: Placement,
    score: f64,
}

impl PlacementSolver for GreedyAdjustedOptimizer {
    fn name(&self) -> &'static str {
        "greedy-adjusted"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        if data.is_empty() {
            return Ok(Solution::empty());
        }
        let storage = active_storage(data)?;

        let mut candidates = Vec::with_capacity(data.session_count() * 4);
        for (id, session) in data.sessions() {
            let local_size = session.local_bytes();
            for placement in Placement::ALL {
                // an unmeasured session has nothing to rank by
                let score = if local_size == 0 {
                    0.0
                } else {
                    let utility = evaluate_utility(session, placement, storage, data);
                    if placement.uses_local() {
                        utility / local_size as f64
                    } else {
                        utility
                    }
                };
                candidates.push(Candidate { id, placement, score });
            }
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut capacities = Capacities::new(data, storage);
        let mut placements: BTreeMap<String, Placement> = BTreeMap::new();
        let mut value = 0.0;

        for candidate in candidates {
            if placements.contains_key(candidate.id) {
                continue;
            }
            let Some(session) = data.session(candidate.id) else {
                continue;
            };
            if !capacities.fits(candidate.placement, session) {
                continue;
            }
            capacities.take(candidate.placement, session);
            value += if candidate.placement.uses_local() {
                candidate.score * session.local_bytes() as f64
            } else {
                candidate.score
            };
            placements.insert(candidate.id.to_string(), candidate.placement);
        }

        Ok(Solution::new(placements, value))
    }
}
