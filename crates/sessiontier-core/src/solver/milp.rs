//! [`LinearBackend`] over the pure-Rust `microlp` solver.

use std::collections::BTreeMap;

use microlp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem};
use tracing::debug;

use super::linear::{
    Goal, LinearBackend, LinearProblemError, LinearProgram, LinearSolution, Sign,
};

/// Simplex with branch and bound for integer variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpBackend;

impl LinearBackend for MicroLpBackend {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, program: &LinearProgram) -> Result<LinearSolution, LinearProblemError> {
        let direction = match program.objective().goal() {
            Goal::Max => OptimizationDirection::Maximize,
            Goal::Min => OptimizationDirection::Minimize,
        };
        let mut problem = Problem::new(direction);

        let vars: Vec<microlp::Variable> = program
            .variables()
            .map(|var| {
                let coefficient = program.objective().coefficient(var);
                if program.is_boolean(var) {
                    problem.add_integer_var(coefficient, (0, 1))
                } else if program.is_integer(var) {
                    problem.add_integer_var(coefficient, (0, i32::MAX))
                } else {
                    problem.add_var(coefficient, (0.0, f64::INFINITY))
                }
            })
            .collect();

        for constraint in program.constraints() {
            let mut expr = LinearExpr::empty();
            for (var, coefficient) in constraint.coefficients() {
                let Some(handle) = vars.get(var.index()) else {
                    return Err(LinearProblemError::Backend(format!(
                        "constraint references unallocated variable {}",
                        var.index()
                    )));
                };
                expr.add(*handle, coefficient);
            }
            let op = match constraint.sign() {
                Sign::Eq => ComparisonOp::Eq,
                Sign::Le => ComparisonOp::Le,
                Sign::Ge => ComparisonOp::Ge,
            };
            problem.add_constraint(expr, op, constraint.limit());
        }

        let solution = problem.solve().map_err(|err| match err {
            microlp::Error::Infeasible => LinearProblemError::Infeasible,
            microlp::Error::Unbounded => LinearProblemError::Unbounded,
            #[allow(unreachable_patterns)]
            other => LinearProblemError::Backend(other.to_string()),
        })?;

        let values: BTreeMap<_, _> = program
            .variables()
            .zip(vars.iter())
            .map(|(var, handle)| (var, solution[*handle]))
            .collect();
        debug!(
            variables = values.len(),
            constraints = program.constraints().len(),
            objective = solution.objective(),
            "linear program solved"
        );
        Ok(LinearSolution::new(values, solution.objective()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::linear::{LinearConstraint, LinearObjective};

    #[test]
    fn solves_integer_production_problem() {
        let mut program = LinearProgram::new();
        let x = program.variable();
        let y = program.variable();
        program
            .set_integer(x, true)
            .set_integer(y, true)
            .set_objective(LinearObjective::new(Goal::Max).with(x, 143.0).with(y, 60.0))
            .add_constraint(LinearConstraint::new(Sign::Le, 15000.0).with(x, 120.0).with(y, 210.0))
            .add_constraint(LinearConstraint::new(Sign::Le, 4000.0).with(x, 110.0).with(y, 30.0))
            .add_constraint(LinearConstraint::new(Sign::Le, 75.0).with(x, 1.0).with(y, 1.0));

        let solution = MicroLpBackend.solve(&program).unwrap();
        assert!((solution.value(x) - 22.0).abs() < 1e-6);
        assert!((solution.value(y) - 52.0).abs() < 1e-6);
        assert!((solution.objective() - 6266.0).abs() < 1e-6);
    }

    #[test]
    fn boolean_variables_stay_binary() {
        let mut program = LinearProgram::new();
        let a = program.variable();
        let b = program.variable();
        program
            .set_boolean(a, true)
            .set_boolean(b, true)
            .set_objective(LinearObjective::new(Goal::Max).with(a, 3.0).with(b, 2.0))
            .add_constraint(LinearConstraint::new(Sign::Le, 1.0).with(a, 1.0).with(b, 1.0));
        let solution = MicroLpBackend.solve(&program).unwrap();
        assert!((solution.value(a) - 1.0).abs() < 1e-6);
        assert!(solution.value(b).abs() < 1e-6);
    }

    #[test]
    fn infeasible_program_is_reported() {
        let mut program = LinearProgram::new();
        let x = program.variable();
        program
            .set_objective(LinearObjective::new(Goal::Min).with(x, 1.0))
            .add_constraint(LinearConstraint::new(Sign::Ge, 5.0).with(x, 1.0))
            .add_constraint(LinearConstraint::new(Sign::Le, 2.0).with(x, 1.0));
        assert_eq!(
            MicroLpBackend.solve(&program).unwrap_err(),
            LinearProblemError::Infeasible
        );
    }
}
