//! Presolve routines on linear rows.

pub mod fbbt;

pub use fbbt::{propagate_linear, FbbtSettings, FbbtStatus};
