//! MILP oracle trait and cut types.

use gdp_core::{ConstraintId, LinearProgram, VarId};

use crate::error::GdpResult;

/// Status reported by a MILP oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStatus {
    /// Optimal solution found.
    Optimal,

    /// No integer-feasible point exists.
    Infeasible,

    /// Relaxation is unbounded.
    Unbounded,

    /// Node limit reached.
    NodeLimit,

    /// Time limit reached.
    TimeLimit,

    /// Numerical or internal failure inside the oracle.
    Error,
}

impl MipStatus {
    /// True for statuses that may carry a usable point.
    pub fn may_have_solution(self) -> bool {
        matches!(
            self,
            MipStatus::Optimal | MipStatus::NodeLimit | MipStatus::TimeLimit
        )
    }
}

/// Result of a MILP oracle call.
#[derive(Debug, Clone)]
pub struct MipSolveResult {
    /// Final status.
    pub status: MipStatus,

    /// Best integer-feasible point (empty if none).
    pub x: Vec<f64>,

    /// Objective value at `x` (offset included).
    pub obj_val: f64,

    /// Best proven lower bound on the objective.
    pub bound: f64,

    /// Nodes explored.
    pub nodes: u64,
}

impl MipSolveResult {
    /// Result without a solution.
    pub fn no_solution(status: MipStatus) -> Self {
        let obj_val = match status {
            MipStatus::Unbounded => f64::NEG_INFINITY,
            _ => f64::INFINITY,
        };
        Self {
            status,
            x: Vec::new(),
            obj_val,
            bound: obj_val,
            nodes: 0,
        }
    }

    /// True if a point was returned.
    pub fn has_solution(&self) -> bool {
        self.status.may_have_solution() && !self.x.is_empty()
    }
}

/// External MILP solver.
///
/// The master problem is always handed over as a minimization; columns with
/// a discrete [`gdp_core::VarType`] in `lp.integrality` must take integral
/// values in the returned point.
pub trait MipOracle {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Solve `lp` within an optional wall-clock budget.
    fn solve(&mut self, lp: &LinearProgram, time_limit_ms: Option<u64>)
        -> GdpResult<MipSolveResult>;
}

/// Source of a cut (for counting and logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutSource {
    /// First-order linearization of a nonlinear constraint.
    OuterApproximation {
        /// Linearized constraint.
        constraint: ConstraintId,
    },

    /// First-order linearization of the objective (epigraph cut).
    ObjectiveOuterApproximation,

    /// McCormick affine estimator of a nonlinear constraint.
    Affine {
        /// Relaxed constraint.
        constraint: ConstraintId,
    },

    /// McCormick affine estimator of the objective.
    ObjectiveAffine,

    /// Cut excluding one discrete assignment.
    NoGood,

    /// User-provided cut.
    User,
}

impl CutSource {
    /// True for outer-approximation cuts (which receive slacks when enabled).
    pub fn is_outer_approximation(self) -> bool {
        matches!(
            self,
            CutSource::OuterApproximation { .. } | CutSource::ObjectiveOuterApproximation
        )
    }

    /// True for affine (McCormick) cuts.
    pub fn is_affine(self) -> bool {
        matches!(self, CutSource::Affine { .. } | CutSource::ObjectiveAffine)
    }
}

/// A linear cut: `sum(a_j x_j) <= rhs` over master columns.
///
/// With an activation variable `y`, the cut is only enforced when `y = 1`;
/// the master relaxes it with a big-M term otherwise.
#[derive(Debug, Clone)]
pub struct LinearCut {
    /// Sparse coefficients (column, value).
    pub terms: Vec<(usize, f64)>,

    /// Right-hand side.
    pub rhs: f64,

    /// Optional name for debugging.
    pub name: Option<String>,

    /// Source of this cut.
    pub source: CutSource,

    /// Indicator that switches the cut on.
    pub activation: Option<VarId>,
}

impl LinearCut {
    /// Create a new cut.
    pub fn new(terms: Vec<(usize, f64)>, rhs: f64, source: CutSource) -> Self {
        Self {
            terms,
            rhs,
            name: None,
            source,
            activation: None,
        }
    }

    /// Create a cut with a name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enforce the cut only when `indicator` is 1.
    pub fn with_activation(mut self, indicator: Option<VarId>) -> Self {
        self.activation = indicator;
        self
    }

    /// Compute violation: a^T x - rhs (positive means violated).
    pub fn violation(&self, x: &[f64]) -> f64 {
        let lhs: f64 = self.terms.iter().map(|&(j, a)| a * x[j]).sum();
        lhs - self.rhs
    }

    /// Check if cut is violated by more than tolerance.
    pub fn is_violated(&self, x: &[f64], tol: f64) -> bool {
        self.violation(x) > tol
    }

    /// Drop tiny coefficients and scale so that ||a||_inf = 1.
    pub fn normalize(&mut self) {
        self.terms.retain(|&(_, a)| a.abs() > 1e-12);
        let max_coef = self
            .terms
            .iter()
            .map(|(_, c)| c.abs())
            .fold(0.0_f64, f64::max);

        if max_coef > 1e-12 {
            for (_, c) in &mut self.terms {
                *c /= max_coef;
            }
            self.rhs /= max_coef;
        }
    }

    /// Check if cut has valid coefficients (not all zeros, finite).
    pub fn is_valid(&self) -> bool {
        let has_nonzero = self.terms.iter().any(|(_, c)| c.abs() > 1e-12);
        let all_finite = self.terms.iter().all(|(_, c)| c.is_finite()) && self.rhs.is_finite();
        has_nonzero && all_finite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_violation() {
        // Cut: x0 + x1 <= 1
        let cut = LinearCut::new(vec![(0, 1.0), (1, 1.0)], 1.0, CutSource::User);

        assert!(!cut.is_violated(&[0.5, 0.5], 1e-6));
        assert!(cut.is_violated(&[0.6, 0.6], 1e-6));

        let viol = cut.violation(&[0.6, 0.6]);
        assert!((viol - 0.2).abs() < 1e-10);
    }

    #[test]
    fn test_cut_normalization() {
        let mut cut = LinearCut::new(vec![(0, 2.0), (1, 4.0), (2, 1e-14)], 6.0, CutSource::User);
        cut.normalize();

        // After normalization: 0.5*x0 + 1.0*x1 <= 1.5
        assert_eq!(cut.terms.len(), 2);
        assert!((cut.terms[0].1 - 0.5).abs() < 1e-10);
        assert!((cut.terms[1].1 - 1.0).abs() < 1e-10);
        assert!((cut.rhs - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_cut_validity() {
        assert!(!LinearCut::new(vec![(0, 0.0)], 1.0, CutSource::NoGood).is_valid());
        assert!(!LinearCut::new(vec![(0, 1.0)], f64::NAN, CutSource::NoGood).is_valid());
        assert!(LinearCut::new(vec![(0, 1.0)], 1.0, CutSource::NoGood).is_valid());
    }
}
