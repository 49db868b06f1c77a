//! Error types for model construction and validation.

use thiserror::Error;

/// Errors raised while building or validating a [`crate::GdpModel`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// An identifier does not refer to a component of this model.
    #[error("Unknown {kind} id {index}")]
    UnknownId {
        /// Component kind ("variable", "constraint", ...).
        kind: &'static str,
        /// Offending index.
        index: usize,
    },

    /// A variable has inconsistent bounds.
    #[error("Variable {name} has lower bound {lower} > upper bound {upper}")]
    InvalidBounds {
        /// Variable name.
        name: String,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// A constraint has neither a lower nor an upper bound, or they cross.
    #[error("Constraint {0} has invalid bounds")]
    InvalidConstraint(String),

    /// Model does not have exactly one active objective.
    #[error("Model must have exactly one active objective, found {0}")]
    ObjectiveCount(usize),

    /// A disjunct indicator is not a binary variable.
    #[error("Indicator of disjunct {0} is not binary")]
    IndicatorNotBinary(String),

    /// A disjunction has no disjuncts.
    #[error("Disjunction {0} has no disjuncts")]
    EmptyDisjunction(String),

    /// Value vector has the wrong length.
    #[error("Expected {expected} values, got {got}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },
}
