//! The LOA/GLOA master–subproblem loop.
//!
//! Each iteration solves the master MILP (giving a dual bound and a discrete
//! assignment), solves the subproblem with that assignment fixed (giving a
//! primal bound when feasible), and adds cuts so the master learns from the
//! subproblem. The loop ends when the bounds meet, the master runs out of
//! assignments, or a limit is hit.

mod driver;
mod init;
mod log_guard;
mod termination;

use std::time::Duration;

pub use driver::GdpoptSolver;
pub use log_guard::LogLevelGuard;
pub use termination::SolverState;

/// Snapshot passed to the user callbacks.
#[derive(Debug, Clone)]
pub struct IterationState {
    /// Master iterations started so far (0 during initialization).
    pub master_iteration: usize,
    /// MILP solves in the current master iteration.
    pub mip_iteration: usize,
    /// Subproblem solves in the current master iteration.
    pub nlp_iteration: usize,
    /// Current primal bound.
    pub primal_bound: f64,
    /// Current dual bound.
    pub dual_bound: f64,
    /// Wall-clock time since the solve started.
    pub elapsed: Duration,
}
