//! Solver-side views of the model and result types.

mod solution;
mod util_block;

pub use solution::{
    absolute_gap, relative_gap, CutCounts, IncumbentTracker, SolveResults, TerminationCondition,
};
pub use util_block::UtilBlock;
