//! Interval and McCormick relaxations of expressions.
//!
//! Both are computed by a single recursive pass over the expression tree.
//! McCormick relaxations additionally carry subgradients, so that
//! `cv + cv_grad . (z - x) <= f(z) <= cc + cc_grad . (z - x)` holds for every `z`
//! in the box. Those affine bounds are the building block for globally valid
//! cuts.

pub mod interval;
pub mod mccormick;

use thiserror::Error;

pub use interval::Interval;
pub use mccormick::McCormick;

/// Errors raised when a relaxation cannot be formed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelaxError {
    /// Variable has an infinite bound where a finite one is required.
    #[error("Variable {0} must have finite bounds")]
    Unbounded(usize),

    /// Operand range leaves the domain of the operation.
    #[error("Operand of {op} has range [{lower}, {upper}] outside its domain")]
    Domain {
        /// Operation name.
        op: &'static str,
        /// Operand lower bound.
        lower: f64,
        /// Operand upper bound.
        upper: f64,
    },
}
