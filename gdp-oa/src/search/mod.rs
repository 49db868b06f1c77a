//! Branch-and-bound search for the built-in MILP oracle.

mod branching;
mod node;
mod queue;
mod tree;

pub use branching::{fractional_vars, select_most_fractional, BranchDecision};
pub use node::{BoundChange, SearchNode};
pub use queue::NodeQueue;
pub use tree::{BranchAndBound, BranchAndBoundMilp, TreeStats};
