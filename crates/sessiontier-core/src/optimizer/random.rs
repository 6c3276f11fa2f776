//! Random placement among whatever still fits.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SolveError;
use crate::model::{OptimizationData, Solution};
use crate::placement::Placement;
use crate::utility::evaluate_utility;

use super::{Capacities, PlacementSolver, active_storage};

/// Picks uniformly among feasible LOCAL, REMOTE and BOTH placements; DROP only
/// when none of them fits.
#[derive(Debug)]
pub struct RandomNoDropOptimizer {
    rng: Mutex<StdRng>,
}

impl RandomNoDropOptimizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic instance for reproducible runs.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomNoDropOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementSolver for RandomNoDropOptimizer {
    fn name(&self) -> &'static str {
        "random-no-drop"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        if data.is_empty() {
            return Ok(Solution::empty());
        }
        let storage = active_storage(data)?;
        let mut capacities = Capacities::new(data, storage);
        let mut rng = self.rng.lock();
        let mut placements = BTreeMap::new();
        let mut value = 0.0;

        for (id, session) in data.sessions() {
            let valid: Vec<Placement> = [Placement::Local, Placement::Remote, Placement::Both]
                .into_iter()
                .filter(|placement| capacities.fits(*placement, session))
                .collect();
            let placement = if valid.is_empty() {
                Placement::Drop
            } else {
                valid[rng.random_range(0..valid.len())]
            };
            capacities.take(placement, session);
            value += evaluate_utility(session, placement, storage, data);
            placements.insert(id.to_string(), placement);
        }

        Ok(Solution::new(placements, value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{assert_valid, snapshot};
    use super::*;

    #[test]
    fn never_drops_when_something_fits() {
        let data = snapshot(100, 100, &[("a", 1.0, 10, 10), ("b", 1.0, 10, 10), ("c", 1.0, 10, 10)]);
        let solver = RandomNoDropOptimizer::with_seed(7);
        for _ in 0..20 {
            let solution = solver.solve(&data).unwrap();
            assert_valid(&data, &solution);
            assert_eq!(solution.counts()[3], 0);
        }
    }

    #[test]
    fn drops_only_when_forced() {
        let data = snapshot(5, 5, &[("big", 1.0, 10, 10)]);
        let solution = RandomNoDropOptimizer::with_seed(1).solve(&data).unwrap();
        assert_eq!(solution.placement("big"), Some(Placement::Drop));
    }

    #[test]
    fn single_option_is_forced() {
        // only remote capacity is available
        let data = snapshot(0, 50, &[("s", 1.0, 10, 10)]);
        let solution = RandomNoDropOptimizer::with_seed(3).solve(&data).unwrap();
        assert_eq!(solution.placement("s"), Some(Placement::Remote));
    }

    #[test]
    fn same_seed_same_solution() {
        let data = snapshot(
            40,
            40,
            &[("a", 1.0, 10, 10), ("b", 2.0, 10, 10), ("c", 3.0, 10, 10), ("d", 4.0, 10, 10)],
        );
        let first = RandomNoDropOptimizer::with_seed(99).solve(&data).unwrap();
        let second = RandomNoDropOptimizer::with_seed(99).solve(&data).unwrap();
        assert_eq!(first, second);
    }
}
