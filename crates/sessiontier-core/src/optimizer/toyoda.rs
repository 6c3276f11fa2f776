//! Greedy solver using Toyoda's aggregate resource consumption.
//!
//! Sessions are visited in descending order of their summed placement
//! utilities. For each session the utility of every placement is divided by
//! the effective gradient of the resources it would consume:
//!
//! ```text
//! norm     = sqrt(sum_of_squares + own_square)
//! LOCAL    = u / ((local_size * local_consumed) / norm)
//! REMOTE   = u / ((remote_size * remote_consumed) / norm)
//! BOTH     = u / ((remote_size * remote_consumed + local_size * local_consumed) / norm)
//! DROP     = u
//! ```
//!
//! `own_square` is the squared size of what the placement occupies and
//! `sum_of_squares` accumulates the squares of every committed placement. The
//! first feasible placement in descending weighted order is taken.
//!
//! While nothing has been consumed the gradient is zero, so a positive utility
//! weighs `+inf` and is tried first. A zero norm leaves the weight at 0 and an
//! undefined `0 / 0` ratio counts as 0 as well.

use std::collections::BTreeMap;

use crate::error::SolveError;
use crate::model::{OptimizationData, SessionProperties, Solution};
use crate::placement::Placement;
use crate::utility::evaluate_utility;

use super::{Capacities, PlacementSolver, active_storage};

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyToyodaOptimizer;

#[derive(Debug, Clone, Copy)]
struct Lottery {
    placement: Placement,
    utility: f64,
    square: u128,
    weighted: f64,
}

#[derive(Debug)]
struct Container<'a> {
    id: &'a str,
    session: &'a SessionProperties,
    lotteries: [Lottery; 4],
    score: f64,
}

/// Exact square of a size; sums of these stay exact where `f64` would round.
fn square(size: u64) -> u128 {
    u128::from(size) * u128::from(size)
}

fn squared_norm(sum_of_squares: u128, own_square: u128) -> f64 {
    sum_of_squares.saturating_add(own_square) as f64
}

fn weigh(utility: f64, gradient: f64, norm: f64) -> f64 {
    if norm == 0.0 {
        return 0.0;
    }
    let weighted = utility / (gradient / norm);
    if weighted.is_nan() { 0.0 } else { weighted }
}

impl PlacementSolver for GreedyToyodaOptimizer {
    fn name(&self) -> &'static str {
        "greedy-toyoda"
    }

    fn solve(&self, data: &OptimizationData) -> Result<Solution, SolveError> {
        if data.is_empty() {
            return Ok(Solution::empty());
        }
        let storage = active_storage(data)?;

        let mut containers: Vec<Container<'_>> = data
            .sessions()
            .map(|(id, session)| {
                let measured = session.local_bytes() > 0;
                let lotteries = Placement::ALL.map(|placement| Lottery {
                    placement,
                    utility: if measured {
                        evaluate_utility(session, placement, storage, data)
                    } else {
                        0.0
                    },
                    square: 0,
                    weighted: 0.0,
                });
                let score = lotteries.iter().map(|l| l.utility).sum();
                Container {
                    id,
                    session,
                    lotteries,
                    score,
                }
            })
            .collect();
        containers.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut capacities = Capacities::new(data, storage);
        let mut local_consumed = 0.0f64;
        let mut remote_consumed = 0.0f64;
        let mut sum_of_squares = 0u128;
        let mut placements = BTreeMap::new();
        let mut value = 0.0;

        for container in &mut containers {
            let session = container.session;
            let local_bytes = session.local_bytes();
            let remote_bytes = session.remote_bytes();
            let local = local_bytes as f64;
            let remote = remote_bytes as f64;

            for lottery in &mut container.lotteries {
                match lottery.placement {
                    Placement::Local => {
                        lottery.square = square(local_bytes);
                        let norm = squared_norm(sum_of_squares, lottery.square).sqrt();
                        lottery.weighted = weigh(lottery.utility, local * local_consumed, norm);
                    }
                    Placement::Remote => {
                        lottery.square = square(remote_bytes);
                        let norm = squared_norm(sum_of_squares, lottery.square).sqrt();
                        lottery.weighted = weigh(lottery.utility, remote * remote_consumed, norm);
                    }
                    Placement::Both => {
                        lottery.square = square(local_bytes) + square(remote_bytes);
                        let norm = squared_norm(sum_of_squares, lottery.square).sqrt();
                        lottery.weighted = weigh(
                            lottery.utility,
                            remote * remote_consumed + local * local_consumed,
                            norm,
                        );
                    }
                    Placement::Drop => lottery.weighted = lottery.utility,
                }
            }
            container
                .lotteries
                .sort_by(|a, b| b.weighted.total_cmp(&a.weighted));

            // DROP is always feasible, so a lottery is always chosen
            let chosen = container
                .lotteries
                .iter()
                .find(|lottery| capacities.fits(lottery.placement, session))
                .copied()
                .unwrap_or(Lottery {
                    placement: Placement::Drop,
                    utility: 0.0,
                    square: 0,
                    weighted: 0.0,
                });

            capacities.take(chosen.placement, session);
            if chosen.placement.uses_local() {
                local_consumed += local;
            }
            if chosen.placement.uses_remote() {
                remote_consumed += remote;
            }
            if chosen.placement != Placement::Drop {
                sum_of_squares = sum_of_squares.saturating_add(chosen.square);
            }
            value += chosen.utility;
            placements.insert(container.id.to_string(), chosen.placement);
        }

        Ok(Solution::new(placements, value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{assert_valid, snapshot};
    use super::*;

    #[test]
    fn first_session_takes_local_when_it_fits() {
        let data = snapshot(100, 100, &[("s", 3.0, 10, 10)]);
        let solution = GreedyToyodaOptimizer.solve(&data).unwrap();
        assert_eq!(solution.placement("s"), Some(Placement::Local));
        assert!((solution.value() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_norm_leaves_weight_at_zero() {
        assert_eq!(weigh(5.0, 0.0, 0.0), 0.0);
        assert_eq!(weigh(0.0, 0.0, 1.0), 0.0);
        assert!(weigh(5.0, 0.0, 1.0).is_infinite());
        assert!((weigh(6.0, 3.0, 1.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn squares_of_large_sizes_are_exact() {
        let size = (1u64 << 27) + 1;
        assert_eq!(square(size), 18_014_398_777_917_441);
        // 2^54 + 2^28 + 1 is not representable as f64
        assert_ne!((size as f64 * size as f64) as u128, square(size));
        assert_eq!(squared_norm(square(size), 0), square(size) as f64);
        assert_eq!(squared_norm(u128::MAX, 1), u128::MAX as f64);
    }

    #[test]
    fn later_sessions_spread_over_storages() {
        let data = snapshot(
            20,
            40,
            &[("a", 9.0, 10, 10), ("b", 8.0, 10, 10), ("c", 7.0, 10, 10), ("d", 6.0, 10, 10)],
        );
        let solution = GreedyToyodaOptimizer.solve(&data).unwrap();
        assert_valid(&data, &solution);
        assert_eq!(solution.placement("a"), Some(Placement::Local));
        // once local memory is in use the remote placement has the better gradient
        assert_eq!(solution.placement("b"), Some(Placement::Remote));
        assert_eq!(solution.counts()[3], 0);
    }

    #[test]
    fn infeasible_sessions_drop() {
        let data = snapshot(5, 5, &[("x", 1.0, 6, 6), ("y", 2.0, 5, 5)]);
        let solution = GreedyToyodaOptimizer.solve(&data).unwrap();
        assert_valid(&data, &solution);
        assert_eq!(solution.placement("x"), Some(Placement::Drop));
        assert_ne!(solution.placement("y"), Some(Placement::Drop));
    }
}
