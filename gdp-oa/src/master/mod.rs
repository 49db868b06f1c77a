//! Master problem (MILP relaxation) management.

mod backend;
mod problem;

pub use backend::{CutSource, LinearCut, MipOracle, MipSolveResult, MipStatus};
pub use problem::{CutOutcome, DisjunctBox, MasterProblem, MasterSolve};
