//! Error types for the GDPopt solver.

use gdp_core::{LpError, ModelError};
use thiserror::Error;

use crate::model::SolveResults;

/// Errors that can occur during a GDPopt solve.
#[derive(Error, Debug)]
pub enum GdpError {
    /// Invalid option, option combination, or model setup (e.g. no active objective).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Model validation failed.
    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),

    /// Malformed linear program handed to the LP engine.
    #[error("LP error: {0}")]
    Lp(#[from] LpError),

    /// Master MILP could not be built or interpreted.
    #[error("Master solve failed: {0}")]
    MasterSolve(String),

    /// Subproblem could not be built or interpreted.
    #[error("Subproblem solve failed: {0}")]
    SubproblemSolve(String),

    /// Cut generation failed.
    #[error("Cut generation failed: {0}")]
    CutGeneration(String),

    /// Disjunctive bound tightening failed.
    #[error("Bound tightening failed: {0}")]
    BoundTightening(String),

    /// Internal solver error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An oracle raised an error; the solve was aborted.
    ///
    /// `results` holds the state at the time of failure, with termination
    /// condition `Error`.
    #[error("{phase} oracle failed: {message}")]
    SolverFailure {
        /// Phase in which the oracle failed ("mip" or "nlp").
        phase: &'static str,
        /// Oracle error message.
        message: String,
        /// Results at the time of failure.
        results: Box<SolveResults>,
    },
}

/// Result type for GDPopt operations.
pub type GdpResult<T> = Result<T, GdpError>;
