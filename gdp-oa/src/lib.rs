//! Logic-based outer approximation for generalized disjunctive programs.
//!
//! This crate decomposes a GDP model into a master MILP and a sequence of
//! fixed-disjunct subproblems:
//!
//! - **LOA**: subproblem solutions yield first-order outer-approximation cuts,
//!   relaxed with big-M terms on the disjunct indicators. Exact for convex
//!   models.
//! - **GLOA**: McCormick relaxations yield affine cuts valid over a whole
//!   disjunct, optionally sharpened by per-disjunct bound tightening.
//!
//! No-good cuts exclude each explored assignment, so the loop also ends once
//! the discrete search space is exhausted. The MILP and NLP solvers are
//! pluggable through [`MipOracle`] and [`NlpOracle`]; built-in defaults are an
//! LP-based branch-and-bound and a Kelley cutting-plane method.
//!
//! # Example
//!
//! ```
//! use gdp_core::{Expr, GdpModel, Relation};
//! use gdp_oa::{solve, GdpSettings, Strategy, TerminationCondition};
//!
//! let mut model = GdpModel::new("two_units");
//! let x = model.add_continuous("x", Some(0.0), Some(8.0));
//! let low = model.add_disjunct("low");
//! model.add_disjunct_constraint(low, "x_low", Expr::from(x), Relation::Le(2.0));
//! let high = model.add_disjunct("high");
//! model.add_disjunct_constraint(high, "x_high", Expr::from(x), Relation::Ge(5.0));
//! model.add_disjunction("unit", &[low, high], true);
//! model.minimize((Expr::from(x) - 4.0).powi(2));
//!
//! let results = solve(&mut model, GdpSettings::with_strategy(Strategy::Loa)).unwrap();
//! assert_eq!(results.termination, TerminationCondition::Converged);
//! assert!((model.var(x).value.unwrap() - 5.0).abs() < 1e-3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithm;
pub mod bounds;
pub mod cuts;
pub mod error;
pub mod master;
pub mod model;
pub mod oracle;
pub mod search;
pub mod settings;
pub mod tighten;
pub mod timing;

pub use algorithm::{GdpoptSolver, IterationState};
pub use error::{GdpError, GdpResult};
pub use master::{MasterProblem, MipOracle, MipSolveResult, MipStatus};
pub use model::{CutCounts, SolveResults, TerminationCondition};
pub use oracle::{NlpOracle, NlpProblem, NlpResult, NlpStatus};
pub use settings::{
    GdpSettings, InitStrategy, MasterCallback, OptionValue, Strategy, SubproblemCallback,
};
pub use timing::Phase;

use gdp_core::GdpModel;

/// Solve `model` with the default oracles.
pub fn solve(model: &mut GdpModel, settings: GdpSettings) -> GdpResult<SolveResults> {
    GdpoptSolver::new(settings).solve(model)
}
