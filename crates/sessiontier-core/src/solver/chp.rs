//! Approximate multiple-choice multidimensional knapsack (CHP).
//!
//! Each group offers a set of [`Configuration`]s; a solution takes exactly one
//! configuration per group so that the summed resource vector stays within the
//! constraint vector and the summed value is as large as possible.
//!
//! ```text
//! groups ──minimize──▶ non-dominated per group ──sort by size──▶ g0, g1, …, gn
//!
//! partial = feasible(g0)
//! for g in g1..gn:
//!     partial = combine(filter(partial), filter(g))
//! ```
//!
//! `combine` takes the cross product, keeps feasible merges and prunes the
//! dominated ones, so `partial` is always a Pareto frontier over
//! (value, aggregate resources). `filter` keeps at most `set_cutoff`
//! members spread evenly over the `value × aggregate` score, which bounds the
//! cross product.

use std::collections::BTreeMap;

use crate::error::SolveError;

/// One option of a group, or a merge of one option from several groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    value: f64,
    resources: Vec<u64>,
    aggregate: u64,
    group: Option<usize>,
    /// group id → index of the chosen configuration in that group's input
    sources: BTreeMap<usize, usize>,
}

impl Configuration {
    #[must_use]
    pub fn new(value: f64, resources: Vec<u64>) -> Self {
        let aggregate = resources.iter().fold(0u64, |acc, r| acc.saturating_add(*r));
        Self {
            value,
            resources,
            aggregate,
            group: None,
            sources: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn resources(&self) -> &[u64] {
        &self.resources
    }

    /// Sum of the resource vector.
    #[must_use]
    pub fn aggregate_resources(&self) -> u64 {
        self.aggregate
    }

    /// Group of an untouched option; `None` for merged configurations.
    #[must_use]
    pub fn group(&self) -> Option<usize> {
        self.group
    }

    /// Index of the option chosen for `group`.
    #[must_use]
    pub fn source(&self, group: usize) -> Option<usize> {
        self.sources.get(&group).copied()
    }

    /// Number of groups this configuration covers.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.sources.len()
    }

    /// At least as valuable while using at most as many resources.
    #[must_use]
    pub fn dominates(&self, other: &Configuration) -> bool {
        self.value >= other.value && self.aggregate <= other.aggregate
    }

    fn score(&self) -> f64 {
        self.value * self.aggregate as f64
    }

    fn tag(&mut self, group: usize, index: usize) {
        self.group = Some(group);
        self.sources = BTreeMap::from([(group, index)]);
    }

    fn merge(&self, other: &Configuration) -> Result<Configuration, SolveError> {
        check_dimensions(self.resources.len(), other.resources.len())?;
        let resources = self
            .resources
            .iter()
            .zip(&other.resources)
            .map(|(a, b)| a.saturating_add(*b))
            .collect();
        let mut sources = self.sources.clone();
        sources.extend(other.sources.iter().map(|(g, i)| (*g, *i)));
        Ok(Configuration {
            value: self.value + other.value,
            resources,
            aggregate: self.aggregate.saturating_add(other.aggregate),
            group: None,
            sources,
        })
    }

    fn fits(&self, constraints: &[u64]) -> Result<bool, SolveError> {
        check_dimensions(constraints.len(), self.resources.len())?;
        Ok(self
            .resources
            .iter()
            .zip(constraints)
            .all(|(used, limit)| used <= limit))
    }
}

fn check_dimensions(expected: usize, found: usize) -> Result<(), SolveError> {
    if expected == found {
        Ok(())
    } else {
        Err(SolveError::DimensionMismatch { expected, found })
    }
}

/// Add `candidate` to a frontier unless something there dominates it; drop
/// whatever it dominates.
fn insert_non_dominated(frontier: &mut Vec<Configuration>, candidate: Configuration) {
    let mut i = 0;
    while i < frontier.len() {
        if candidate.dominates(&frontier[i]) {
            frontier.remove(i);
            continue;
        }
        if frontier[i].dominates(&candidate) {
            return;
        }
        i += 1;
    }
    frontier.push(candidate);
}

/// Position of the member whose score is nearest to `target`; ties go to the lower index.
fn nearest(sorted: &[Configuration], target: f64) -> usize {
    let i = sorted.partition_point(|c| c.score() < target);
    if i == 0 {
        return 0;
    }
    if i == sorted.len() {
        return i - 1;
    }
    let below = target - sorted[i - 1].score();
    let above = sorted[i].score() - target;
    if below <= above { i - 1 } else { i }
}

/// The CHP heuristic over a fixed constraint vector.
#[derive(Debug, Clone)]
pub struct ChpSolver {
    constraints: Vec<u64>,
    set_cutoff: usize,
}

impl ChpSolver {
    /// `set_cutoff` below 2 is raised to 2: the extremes are always kept.
    #[must_use]
    pub fn new(constraints: Vec<u64>, set_cutoff: usize) -> Self {
        Self {
            constraints,
            set_cutoff: set_cutoff.max(2),
        }
    }

    #[must_use]
    pub fn set_cutoff(&self) -> usize {
        self.set_cutoff
    }

    /// Pareto frontier of feasible full configurations, or `None` when no
    /// group was given or nothing feasible remains.
    pub fn solve(
        &self,
        groups: Vec<Vec<Configuration>>,
    ) -> Result<Option<Vec<Configuration>>, SolveError> {
        let mut minimized = Vec::with_capacity(groups.len());
        for (group, options) in groups.into_iter().enumerate() {
            let mut tagged = Vec::with_capacity(options.len());
            for (index, mut option) in options.into_iter().enumerate() {
                check_dimensions(self.constraints.len(), option.resources.len())?;
                option.tag(group, index);
                tagged.push(option);
            }
            minimized.push(Self::minimize(tagged));
        }
        minimized.sort_by_key(Vec::len);

        let mut remaining = minimized.into_iter();
        let Some(seed) = remaining.next() else {
            return Ok(None);
        };

        let mut partial = Vec::with_capacity(seed.len());
        for option in seed {
            if option.fits(&self.constraints)? {
                partial.push(option);
            }
        }

        for group in remaining {
            let left = self.filter(partial);
            let right = self.filter(group);
            partial = self.combine(&left, &right)?;
        }

        Ok(if partial.is_empty() { None } else { Some(partial) })
    }

    /// Remove dominated members of a set.
    #[must_use]
    pub fn minimize(set: Vec<Configuration>) -> Vec<Configuration> {
        let mut frontier = Vec::with_capacity(set.len());
        for option in set {
            insert_non_dominated(&mut frontier, option);
        }
        frontier
    }

    /// Reduce a set to at most `set_cutoff` members spread over the score range.
    ///
    /// The result is ordered by ascending `value × aggregate`.
    #[must_use]
    pub fn filter(&self, mut set: Vec<Configuration>) -> Vec<Configuration> {
        set.sort_by(|a, b| a.score().total_cmp(&b.score()));
        if set.len() <= self.set_cutoff {
            return set;
        }

        let Some(last) = set.pop() else {
            return set;
        };
        let first = set.remove(0);
        let min = first.score();
        let max = last.score();
        let mut picked = Vec::with_capacity(self.set_cutoff);
        picked.push(first);
        picked.push(last);

        if self.set_cutoff > 2 {
            let step = (max - min) / (self.set_cutoff - 1) as f64;
            for k in 1..self.set_cutoff - 1 {
                if set.is_empty() {
                    break;
                }
                let target = min + k as f64 * step;
                let index = nearest(&set, target);
                picked.push(set.remove(index));
            }
        }

        picked.sort_by(|a, b| a.score().total_cmp(&b.score()));
        picked
    }

    fn combine(
        &self,
        left: &[Configuration],
        right: &[Configuration],
    ) -> Result<Vec<Configuration>, SolveError> {
        let mut frontier = Vec::new();
        for a in left {
            for b in right {
                let merged = a.merge(b)?;
                if merged.fits(&self.constraints)? {
                    insert_non_dominated(&mut frontier, merged);
                }
            }
        }
        Ok(frontier)
    }
}

/// Most valuable member of a frontier.
#[must_use]
pub fn best(frontier: &[Configuration]) -> Option<&Configuration> {
    frontier
        .iter()
        .max_by(|a, b| a.value.total_cmp(&b.value))
}
