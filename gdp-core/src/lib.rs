//! Core data structures for generalized disjunctive programming (GDP).
//!
//! This crate holds everything the outer-approximation layer (`gdp-oa`) needs
//! that is not specific to the decomposition loop itself:
//!
//! - **Model**: variables, constraints, disjuncts, disjunctions and objectives,
//!   addressed by stable integer identifiers so that working copies of a model
//!   keep the same correspondence as the original.
//! - **Expressions**: a small expression tree with evaluation, reverse-mode
//!   gradients and linear-part extraction.
//! - **Relaxations**: natural interval extensions and McCormick convex/concave
//!   relaxations with subgradients, used for globally valid affine cuts.
//! - **LP engine**: a dense two-phase bounded simplex over a sparse row matrix.
//! - **Presolve**: feasibility-based bound tightening on linear rows.
//!
//! # Example
//!
//! ```
//! use gdp_core::{Expr, GdpModel, Relation};
//!
//! let mut model = GdpModel::new("two_units");
//! let x = model.add_continuous("x", Some(0.0), Some(8.0));
//!
//! let low = model.add_disjunct("low");
//! model.add_disjunct_constraint(low, "x_low", Expr::from(x), Relation::Le(2.0));
//! let high = model.add_disjunct("high");
//! model.add_disjunct_constraint(high, "x_high", Expr::from(x), Relation::Ge(5.0));
//! model.add_disjunction("unit", &[low, high], true);
//!
//! model.minimize((Expr::from(x) - 4.0).powi(2));
//! assert!(model.validate().is_ok());
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod expr;
pub mod lp;
pub mod model;
pub mod presolve;
pub mod relax;

pub use error::ModelError;
pub use expr::{Expr, LinearExpr};
pub use lp::{solve_lp, LinearProgram, LinearRow, LpError, LpResult, LpSettings, LpStatus};
pub use model::{
    Constraint, ConstraintId, Disjunct, DisjunctId, Disjunction, DisjunctionId, GdpModel,
    Objective, Relation, Sense, VarId, VarType, Variable,
};
pub use relax::{Interval, McCormick, RelaxError};
