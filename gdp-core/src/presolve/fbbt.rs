//! Feasibility-based bound tightening (FBBT) on linear rows.
//!
//! For a row `l <= sum_k a_k x_k <= u`, each variable is bounded by the row
//! side minus the extreme activity of the remaining terms:
//!
//! ```text
//! a_j x_j <= u - minact_{-j}      a_j x_j >= l - maxact_{-j}
//! ```
//!
//! Rows are swept repeatedly until no bound moves or the round limit is hit.

use crate::lp::LinearRow;

/// FBBT settings.
#[derive(Debug, Clone)]
pub struct FbbtSettings {
    /// Maximum number of sweeps over all rows.
    pub max_rounds: usize,
    /// Minimum (relative) improvement for a bound change to count.
    pub improvement_tol: f64,
    /// Tolerance for declaring crossed bounds infeasible.
    pub feas_tol: f64,
}

impl Default for FbbtSettings {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            improvement_tol: 1e-9,
            feas_tol: 1e-6,
        }
    }
}

/// Outcome of bound propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbbtStatus {
    /// Bounds are consistent; carries the number of bound changes.
    Tightened(usize),
    /// Some variable ended with lower > upper.
    Infeasible,
}

/// Activity bound of a row with the count of infinite contributions.
struct Activity {
    finite: f64,
    infinite: usize,
}

impl Activity {
    /// Activity without term `contrib`, or None if it is unbounded.
    fn without(&self, contrib: f64) -> Option<f64> {
        if contrib.is_infinite() {
            (self.infinite == 1).then_some(self.finite)
        } else {
            (self.infinite == 0).then_some(self.finite - contrib)
        }
    }
}

fn activity(row: &LinearRow, lower: &[f64], upper: &[f64], min: bool) -> Activity {
    let mut act = Activity {
        finite: 0.0,
        infinite: 0,
    };
    for &(j, a) in &row.terms {
        let c = contribution(a, lower[j], upper[j], min);
        if c.is_infinite() {
            act.infinite += 1;
        } else {
            act.finite += c;
        }
    }
    act
}

fn contribution(a: f64, l: f64, u: f64, min: bool) -> f64 {
    if a == 0.0 {
        return 0.0;
    }
    match (a > 0.0, min) {
        (true, true) | (false, false) => a * l,
        _ => a * u,
    }
}

/// Tighten `lower` / `upper` in place using the rows.
///
/// `integral[j]` rounds the bounds of column `j` to integers.
pub fn propagate_linear(
    rows: &[LinearRow],
    lower: &mut [f64],
    upper: &mut [f64],
    integral: &[bool],
    settings: &FbbtSettings,
) -> FbbtStatus {
    let mut total = 0usize;

    for round in 0..settings.max_rounds {
        let mut changed = 0usize;
        for row in rows {
            let min_act = activity(row, lower, upper, true);
            let max_act = activity(row, lower, upper, false);

            if min_act.infinite == 0 && min_act.finite > row.upper + settings.feas_tol {
                return FbbtStatus::Infeasible;
            }
            if max_act.infinite == 0 && max_act.finite < row.lower - settings.feas_tol {
                return FbbtStatus::Infeasible;
            }

            for &(j, a) in &row.terms {
                if a == 0.0 {
                    continue;
                }
                let mut new_lo = f64::NEG_INFINITY;
                let mut new_hi = f64::INFINITY;

                if row.upper.is_finite() {
                    let own = contribution(a, lower[j], upper[j], true);
                    if let Some(rest) = min_act.without(own) {
                        let bound = (row.upper - rest) / a;
                        if a > 0.0 {
                            new_hi = new_hi.min(bound);
                        } else {
                            new_lo = new_lo.max(bound);
                        }
                    }
                }
                if row.lower.is_finite() {
                    let own = contribution(a, lower[j], upper[j], false);
                    if let Some(rest) = max_act.without(own) {
                        let bound = (row.lower - rest) / a;
                        if a > 0.0 {
                            new_lo = new_lo.max(bound);
                        } else {
                            new_hi = new_hi.min(bound);
                        }
                    }
                }

                if integral.get(j).copied().unwrap_or(false) {
                    new_lo = (new_lo - settings.feas_tol).ceil();
                    new_hi = (new_hi + settings.feas_tol).floor();
                }

                let tol = |b: f64| settings.improvement_tol * b.abs().max(1.0);
                if new_lo.is_finite() && new_lo > lower[j] + tol(lower[j]) {
                    lower[j] = new_lo;
                    changed += 1;
                }
                if new_hi.is_finite() && new_hi < upper[j] - tol(upper[j]) {
                    upper[j] = new_hi;
                    changed += 1;
                }
                if lower[j] > upper[j] + settings.feas_tol {
                    return FbbtStatus::Infeasible;
                }
            }
        }
        total += changed;
        if changed == 0 {
            log::trace!("FBBT converged after {} rounds", round + 1);
            break;
        }
    }

    // Tiny crossings within tolerance collapse to a point.
    for (l, u) in lower.iter_mut().zip(upper.iter_mut()) {
        if *l > *u {
            let mid = 0.5 * (*l + *u);
            *l = mid;
            *u = mid;
        }
    }

    FbbtStatus::Tightened(total)
}
