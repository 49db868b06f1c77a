//! No-good (integer) cuts.
//!
//! Given a 0/1 assignment of the binary master columns, the cut
//!
//! ```text
//! sum_{y = 1} y - sum_{y = 0} y <= |{y = 1}| - 1
//! ```
//!
//! is violated by exactly that assignment and satisfied by every other one.

use crate::error::{GdpError, GdpResult};
use crate::master::{CutSource, LinearCut};

/// Result of building a no-good cut.
#[derive(Debug, Clone)]
pub enum NoGoodOutcome {
    /// Cut excluding the assignment.
    Cut(LinearCut),
    /// There are no binary columns: nothing is left to exclude.
    Exhausted,
}

/// Build the no-good cut for the assignment `values` (a master point) of
/// the binary `columns`.
///
/// Values must lie within `tol` of 0 or 1.
pub fn no_good_cut(columns: &[usize], values: &[f64], tol: f64) -> GdpResult<NoGoodOutcome> {
    if columns.is_empty() {
        return Ok(NoGoodOutcome::Exhausted);
    }

    let mut terms = Vec::with_capacity(columns.len());
    let mut ones = 0usize;
    for &col in columns {
        let v = values.get(col).copied().unwrap_or(f64::NAN);
        if (v - 1.0).abs() <= tol {
            terms.push((col, 1.0));
            ones += 1;
        } else if v.abs() <= tol {
            terms.push((col, -1.0));
        } else {
            return Err(GdpError::CutGeneration(format!(
                "Binary column {} has non-integral value {} in the master solution",
                col, v
            )));
        }
    }

    let rhs = ones as f64 - 1.0;
    Ok(NoGoodOutcome::Cut(
        LinearCut::new(terms, rhs, CutSource::NoGood).with_name("no_good"),
    ))
}
