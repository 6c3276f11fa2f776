//! Minimal linear-program contract.
//!
//! A [`LinearProgram`] collects an objective, constraints and integrality marks
//! over opaque [`Var`] handles. A [`LinearBackend`] solves it and returns a
//! value for every variable.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Handle of a decision variable. Variables are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Goal {
    #[default]
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sign {
    #[default]
    Eq,
    Le,
    Ge,
}

/// Linear objective; absent variables have coefficient 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearObjective {
    coefficients: BTreeMap<Var, f64>,
    goal: Goal,
}

impl LinearObjective {
    #[must_use]
    pub fn new(goal: Goal) -> Self {
        Self {
            coefficients: BTreeMap::new(),
            goal,
        }
    }

    #[must_use]
    pub fn with(mut self, var: Var, coefficient: f64) -> Self {
        self.put(var, coefficient);
        self
    }

    pub fn put(&mut self, var: Var, coefficient: f64) {
        self.coefficients.insert(var, coefficient);
    }

    #[must_use]
    pub fn coefficient(&self, var: Var) -> f64 {
        self.coefficients.get(&var).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn goal(&self) -> Goal {
        self.goal
    }
}

/// `Σ coefficient * var  <sign>  limit`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearConstraint {
    coefficients: BTreeMap<Var, f64>,
    sign: Sign,
    limit: f64,
}

impl LinearConstraint {
    #[must_use]
    pub fn new(sign: Sign, limit: f64) -> Self {
        Self {
            coefficients: BTreeMap::new(),
            sign,
            limit,
        }
    }

    #[must_use]
    pub fn with(mut self, var: Var, coefficient: f64) -> Self {
        self.put(var, coefficient);
        self
    }

    pub fn put(&mut self, var: Var, coefficient: f64) {
        self.coefficients.insert(var, coefficient);
    }

    pub fn coefficients(&self) -> impl Iterator<Item = (Var, f64)> + '_ {
        self.coefficients.iter().map(|(var, c)| (*var, *c))
    }

    #[must_use]
    pub fn sign(&self) -> Sign {
        self.sign
    }

    #[must_use]
    pub fn limit(&self) -> f64 {
        self.limit
    }
}

/// A linear program under construction.
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    variable_count: usize,
    objective: LinearObjective,
    constraints: Vec<LinearConstraint>,
    integer: BTreeSet<Var>,
    boolean: BTreeSet<Var>,
}

impl LinearProgram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh variable.
    pub fn variable(&mut self) -> Var {
        let var = Var(self.variable_count);
        self.variable_count += 1;
        var
    }

    /// Replace the objective.
    pub fn set_objective(&mut self, objective: LinearObjective) -> &mut Self {
        self.objective = objective;
        self
    }

    pub fn add_constraint(&mut self, constraint: LinearConstraint) -> &mut Self {
        self.constraints.push(constraint);
        self
    }

    pub fn set_integer(&mut self, var: Var, integer: bool) -> &mut Self {
        if integer {
            self.integer.insert(var);
        } else {
            self.integer.remove(&var);
        }
        self
    }

    /// Restrict a variable to {0, 1}.
    pub fn set_boolean(&mut self, var: Var, boolean: bool) -> &mut Self {
        if boolean {
            self.boolean.insert(var);
        } else {
            self.boolean.remove(&var);
        }
        self
    }

    pub fn variables(&self) -> impl Iterator<Item = Var> {
        (0..self.variable_count).map(Var)
    }

    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    #[must_use]
    pub fn objective(&self) -> &LinearObjective {
        &self.objective
    }

    #[must_use]
    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    #[must_use]
    pub fn is_integer(&self, var: Var) -> bool {
        self.integer.contains(&var)
    }

    #[must_use]
    pub fn is_boolean(&self, var: Var) -> bool {
        self.boolean.contains(&var)
    }
}

/// Optimal assignment returned by a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearSolution {
    values: BTreeMap<Var, f64>,
    objective: f64,
}

impl LinearSolution {
    #[must_use]
    pub fn new(values: BTreeMap<Var, f64>, objective: f64) -> Self {
        Self { values, objective }
    }

    #[must_use]
    pub fn value(&self, var: Var) -> f64 {
        self.values.get(&var).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> impl Iterator<Item = (Var, f64)> + '_ {
        self.values.iter().map(|(var, v)| (*var, *v))
    }

    #[must_use]
    pub fn objective(&self) -> f64 {
        self.objective
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearProblemError {
    #[error("linear program is infeasible")]
    Infeasible,

    #[error("linear program is unbounded")]
    Unbounded,

    #[error("linear backend failed: {0}")]
    Backend(String),
}

/// Something that can solve a [`LinearProgram`].
pub trait LinearBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn solve(&self, program: &LinearProgram) -> Result<LinearSolution, LinearProblemError>;
}
