//! Linear programming.
//!
//! Problem format:
//! ```text
//! minimize    c^T x + offset
//! subject to  row_lower <= A x <= row_upper
//!             col_lower <= x   <= col_upper
//! ```
//!
//! `A` is stored as a CSR matrix; infinite entries in the bound vectors mean
//! the side is absent. Solved by [`solve_lp`], a dense two-phase bounded simplex.

mod simplex;

use std::fmt;

use sprs::{CsMat, TriMat};
use thiserror::Error;

use crate::model::VarType;

pub use simplex::solve_lp;

/// One sparse row `lower <= sum(coef * x[col]) <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRow {
    /// (column, coefficient) pairs.
    pub terms: Vec<(usize, f64)>,
    /// Lower side (`-inf` if absent).
    pub lower: f64,
    /// Upper side (`+inf` if absent).
    pub upper: f64,
}

impl LinearRow {
    /// Row `terms <= upper`.
    pub fn le(terms: Vec<(usize, f64)>, upper: f64) -> Self {
        Self {
            terms,
            lower: f64::NEG_INFINITY,
            upper,
        }
    }

    /// Row `terms >= lower`.
    pub fn ge(terms: Vec<(usize, f64)>, lower: f64) -> Self {
        Self {
            terms,
            lower,
            upper: f64::INFINITY,
        }
    }

    /// Row `terms == rhs`.
    pub fn eq(terms: Vec<(usize, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            lower: rhs,
            upper: rhs,
        }
    }

    /// Activity of the row at `x`.
    pub fn activity(&self, x: &[f64]) -> f64 {
        self.terms.iter().map(|&(j, a)| a * x[j]).sum()
    }
}

/// Linear program with optional integrality information.
#[derive(Debug, Clone)]
pub struct LinearProgram {
    /// Objective coefficients.
    pub objective: Vec<f64>,
    /// Constant added to the objective.
    pub objective_offset: f64,
    /// Constraint matrix (CSR, rows x cols).
    pub a: CsMat<f64>,
    /// Row lower bounds.
    pub row_lower: Vec<f64>,
    /// Row upper bounds.
    pub row_upper: Vec<f64>,
    /// Column lower bounds.
    pub col_lower: Vec<f64>,
    /// Column upper bounds.
    pub col_upper: Vec<f64>,
    /// Column types; None means all continuous. Ignored by [`solve_lp`].
    pub integrality: Option<Vec<VarType>>,
}

impl LinearProgram {
    /// Assemble a program from rows.
    pub fn from_rows(
        objective: Vec<f64>,
        rows: &[LinearRow],
        col_lower: Vec<f64>,
        col_upper: Vec<f64>,
    ) -> Self {
        let n = objective.len();
        let mut tri = TriMat::new((rows.len(), n));
        for (i, row) in rows.iter().enumerate() {
            for &(j, v) in &row.terms {
                if v != 0.0 {
                    tri.add_triplet(i, j, v);
                }
            }
        }
        Self {
            objective,
            objective_offset: 0.0,
            a: tri.to_csr(),
            row_lower: rows.iter().map(|r| r.lower).collect(),
            row_upper: rows.iter().map(|r| r.upper).collect(),
            col_lower,
            col_upper,
            integrality: None,
        }
    }

    /// Attach column types.
    pub fn with_integrality(mut self, integrality: Vec<VarType>) -> Self {
        self.integrality = Some(integrality);
        self
    }

    /// Number of columns.
    pub fn num_cols(&self) -> usize {
        self.objective.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.row_lower.len()
    }

    /// Check dimensions and reject NaN data.
    pub fn validate(&self) -> Result<(), LpError> {
        let n = self.num_cols();
        let m = self.num_rows();
        let check = |what: &'static str, expected: usize, got: usize| {
            if expected != got {
                Err(LpError::DimensionMismatch {
                    what,
                    expected,
                    got,
                })
            } else {
                Ok(())
            }
        };
        check("A rows", m, self.a.rows())?;
        check("A cols", n, self.a.cols())?;
        check("row_upper", m, self.row_upper.len())?;
        check("col_lower", n, self.col_lower.len())?;
        check("col_upper", n, self.col_upper.len())?;
        if let Some(kinds) = &self.integrality {
            check("integrality", n, kinds.len())?;
        }

        let has_nan = |v: &[f64]| v.iter().any(|x| x.is_nan());
        if has_nan(&self.objective) || self.objective_offset.is_nan() {
            return Err(LpError::NotANumber("objective"));
        }
        if self.a.data().iter().any(|x| !x.is_finite()) {
            return Err(LpError::NotANumber("constraint matrix"));
        }
        if has_nan(&self.row_lower) || has_nan(&self.row_upper) {
            return Err(LpError::NotANumber("row bounds"));
        }
        if has_nan(&self.col_lower) || has_nan(&self.col_upper) {
            return Err(LpError::NotANumber("column bounds"));
        }
        Ok(())
    }

    /// Row activities `A x`.
    pub fn row_activity(&self, x: &[f64]) -> Vec<f64> {
        self.a
            .outer_iterator()
            .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum())
            .collect()
    }

    /// Objective value at `x` (offset included).
    pub fn objective_value(&self, x: &[f64]) -> f64 {
        self.objective_offset
            + self
                .objective
                .iter()
                .zip(x)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    /// True if `x` satisfies all rows and column bounds within `tol`.
    pub fn is_feasible(&self, x: &[f64], tol: f64) -> bool {
        let cols_ok = x
            .iter()
            .zip(self.col_lower.iter().zip(&self.col_upper))
            .all(|(&v, (&l, &u))| v >= l - tol && v <= u + tol);
        cols_ok
            && self
                .row_activity(x)
                .iter()
                .zip(self.row_lower.iter().zip(&self.row_upper))
                .all(|(&v, (&l, &u))| v >= l - tol && v <= u + tol)
    }
}

/// LP solver settings.
#[derive(Debug, Clone)]
pub struct LpSettings {
    /// Maximum number of pivots (both phases together).
    pub max_iter: usize,
    /// Primal feasibility tolerance.
    pub tol_feas: f64,
    /// Reduced-cost optimality tolerance.
    pub tol_opt: f64,
    /// Smallest acceptable pivot magnitude.
    pub tol_pivot: f64,
    /// Consecutive degenerate pivots before switching to Bland's rule.
    pub bland_threshold: usize,
    /// Time limit in milliseconds (None = unlimited).
    pub time_limit_ms: Option<u64>,
}

impl Default for LpSettings {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            tol_feas: 1e-7,
            tol_opt: 1e-9,
            tol_pivot: 1e-9,
            bland_threshold: 50,
            time_limit_ms: None,
        }
    }
}

/// LP solve status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    /// Optimal solution found.
    Optimal,
    /// No feasible point exists.
    Infeasible,
    /// Objective is unbounded below.
    Unbounded,
    /// Pivot limit reached.
    MaxIters,
    /// Time limit reached.
    TimeLimit,
}

impl fmt::Display for LpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LpStatus::Optimal => "optimal",
            LpStatus::Infeasible => "infeasible",
            LpStatus::Unbounded => "unbounded",
            LpStatus::MaxIters => "iteration limit",
            LpStatus::TimeLimit => "time limit",
        };
        write!(f, "{}", s)
    }
}

/// LP solve result.
#[derive(Debug, Clone)]
pub struct LpResult {
    /// Final status.
    pub status: LpStatus,
    /// Primal point (empty unless optimal).
    pub x: Vec<f64>,
    /// Objective value including offset (+inf if infeasible, -inf if unbounded).
    pub obj_val: f64,
    /// Pivots performed.
    pub iterations: usize,
}

/// Errors for malformed linear programs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LpError {
    /// A data vector has the wrong length.
    #[error("{what}: expected length {expected}, got {got}")]
    DimensionMismatch {
        /// Which vector.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// Problem data contains NaN (or infinite matrix entries).
    #[error("Invalid numeric data in {0}")]
    NotANumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_sums_duplicates() {
        let rows = vec![LinearRow::le(vec![(0, 1.0), (0, 2.0), (1, 1.0)], 4.0)];
        let lp = LinearProgram::from_rows(vec![1.0, 1.0], &rows, vec![0.0; 2], vec![10.0; 2]);
        assert_eq!(lp.num_rows(), 1);
        assert_eq!(lp.row_activity(&[1.0, 1.0]), vec![4.0]);
        assert!(lp.is_feasible(&[1.0, 1.0], 1e-9));
        assert!(!lp.is_feasible(&[2.0, 1.0], 1e-9));
    }

    #[test]
    fn test_validate_dimensions() {
        let mut lp = LinearProgram::from_rows(vec![1.0], &[], vec![0.0], vec![1.0]);
        assert!(lp.validate().is_ok());
        lp.col_upper.push(2.0);
        assert!(matches!(
            lp.validate(),
            Err(LpError::DimensionMismatch { what: "col_upper", .. })
        ));
    }
}
