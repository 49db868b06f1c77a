//! Subproblem construction and the NLP oracle interface.

mod cutting_plane;
mod subproblem;

use std::collections::BTreeMap;

use gdp_core::{ConstraintId, Expr, Sense};

use crate::error::GdpResult;

pub use cutting_plane::CuttingPlaneNlp;
pub use subproblem::{FixedSubproblem, Subproblem};

/// One constraint row `lower <= body <= upper` of a subproblem.
#[derive(Debug, Clone)]
pub struct NlpRow {
    /// Constraint in the model.
    pub id: ConstraintId,
    /// Constraint body.
    pub body: Expr,
    /// Lower side (None = -inf).
    pub lower: Option<f64>,
    /// Upper side (None = +inf).
    pub upper: Option<f64>,
}

impl NlpRow {
    /// True if the body is affine.
    pub fn is_linear(&self) -> bool {
        self.body.is_linear()
    }

    /// True if lower and upper sides coincide.
    pub fn is_equality(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l == u)
    }
}

/// Subproblem handed to an NLP oracle.
///
/// Variables are indexed like the model; fixed variables have equal bounds.
#[derive(Debug, Clone)]
pub struct NlpProblem {
    /// Variable lower bounds.
    pub lower: Vec<f64>,
    /// Variable upper bounds.
    pub upper: Vec<f64>,
    /// Variables that must take integer values (unfixed discrete variables).
    pub integer: Vec<bool>,
    /// Objective expression.
    pub objective: Expr,
    /// Objective sense.
    pub sense: Sense,
    /// Enforced constraints.
    pub constraints: Vec<NlpRow>,
    /// Starting point.
    pub start: Vec<f64>,
}

impl NlpProblem {
    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.lower.len()
    }

    /// True if some unfixed variable must be integral.
    pub fn has_integers(&self) -> bool {
        self.integer.iter().any(|&i| i)
    }

    /// Largest constraint or bound violation at `x`.
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let mut worst: f64 = 0.0;
        for row in &self.constraints {
            let v = row.body.eval(x);
            if let Some(u) = row.upper {
                worst = worst.max(v - u);
            }
            if let Some(l) = row.lower {
                worst = worst.max(l - v);
            }
        }
        for ((&v, &l), &u) in x.iter().zip(&self.lower).zip(&self.upper) {
            worst = worst.max(l - v).max(v - u);
        }
        worst
    }
}

/// Status reported by an NLP oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlpStatus {
    /// Locally optimal point found.
    Optimal,
    /// Feasible point found without an optimality proof.
    Feasible,
    /// Subproblem proven infeasible.
    Infeasible,
    /// Iteration limit reached before a feasible point.
    IterationLimit,
    /// Time limit reached.
    TimeLimit,
    /// Numerical failure or unsupported structure.
    Error,
}

impl NlpStatus {
    /// True if the returned point is feasible.
    pub fn is_feasible(self) -> bool {
        matches!(self, NlpStatus::Optimal | NlpStatus::Feasible)
    }
}

/// Result of an NLP oracle call.
#[derive(Debug, Clone)]
pub struct NlpResult {
    /// Final status.
    pub status: NlpStatus,
    /// Point, indexed like the model variables (empty if none).
    pub x: Vec<f64>,
    /// Objective value at `x` in the model's sense.
    pub obj_val: f64,
    /// Constraint multipliers, if the oracle reports them.
    ///
    /// A positive multiplier means the upper side is binding, a negative one
    /// the lower side.
    pub duals: Option<BTreeMap<ConstraintId, f64>>,
}

impl NlpResult {
    /// Result without a point.
    pub fn no_solution(status: NlpStatus, sense: Sense) -> Self {
        Self {
            status,
            x: Vec::new(),
            obj_val: sense.infeasible_value(),
            duals: None,
        }
    }
}

/// External NLP solver for the fixed subproblems.
pub trait NlpOracle {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Solve `problem` within an optional wall-clock budget.
    fn solve(&mut self, problem: &NlpProblem, time_limit_ms: Option<u64>) -> GdpResult<NlpResult>;
}
