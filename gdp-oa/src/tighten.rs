//! Disjunctive bound tightening for GLOA.
//!
//! For each disjunct the master rows are propagated with the disjunct's
//! indicator fixed to 1. The big-M rows of that disjunct then act as its
//! plain constraints, so the resulting box is valid whenever the disjunct is
//! selected. With OBBT, the variables of the disjunct's nonlinear constraints
//! are additionally minimized and maximized over the LP relaxation.
//!
//! Tighter boxes give tighter McCormick relaxations, and therefore stronger
//! affine cuts.

use std::collections::BTreeSet;

use gdp_core::presolve::{propagate_linear, FbbtSettings, FbbtStatus};
use gdp_core::{solve_lp, DisjunctId, GdpModel, LinearProgram, LinearRow, LpStatus, VarId};

use crate::error::{GdpError, GdpResult};
use crate::master::{DisjunctBox, MasterProblem};
use crate::model::UtilBlock;
use crate::settings::GdpSettings;

/// Summary of one tightening pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TighteningStats {
    /// Disjuncts processed.
    pub disjuncts: usize,
    /// Disjuncts proven impossible to select.
    pub infeasible: usize,
    /// Bound changes relative to the global box.
    pub bound_changes: usize,
}

/// Compute and store a box for every disjunct of the master.
pub fn tighten_disjunct_bounds(
    model: &GdpModel,
    block: &UtilBlock,
    master: &mut MasterProblem,
    settings: &GdpSettings,
) -> GdpResult<TighteningStats> {
    let rows: Vec<LinearRow> = master.rows().cloned().collect();
    let integral: Vec<bool> = master.col_types().iter().map(|t| t.is_discrete()).collect();
    let fbbt = FbbtSettings::default();
    let mut stats = TighteningStats::default();

    for &disjunct in &block.disjuncts {
        let indicator = model.disjunct(disjunct).indicator;
        let mut lower = master.col_lower().to_vec();
        let mut upper = master.col_upper().to_vec();
        lower[indicator.0] = 1.0;

        let mut infeasible = upper[indicator.0] < 1.0
            || propagate_linear(&rows, &mut lower, &mut upper, &integral, &fbbt)
                == FbbtStatus::Infeasible;

        if !infeasible && settings.obbt_disjunctive_bounds {
            let vars = nonlinear_vars(model, disjunct);
            infeasible = !obbt(&rows, &mut lower, &mut upper, &vars, settings)?;
        }

        let changes = count_changes(master, &lower, &upper);
        stats.disjuncts += 1;
        if infeasible {
            stats.infeasible += 1;
            log::debug!(
                "Disjunct '{}' cannot be selected",
                model.disjunct(disjunct).name
            );
        } else {
            stats.bound_changes += changes;
        }

        master.set_disjunct_bounds(
            disjunct,
            DisjunctBox {
                lower,
                upper,
                infeasible,
            },
        );
    }

    log::info!(
        "Disjunctive bounds: {} disjuncts, {} bound changes, {} infeasible",
        stats.disjuncts,
        stats.bound_changes,
        stats.infeasible
    );
    Ok(stats)
}

/// Variables appearing in the nonlinear constraints of `disjunct`.
fn nonlinear_vars(model: &GdpModel, disjunct: DisjunctId) -> BTreeSet<VarId> {
    model
        .disjunct(disjunct)
        .constraints
        .iter()
        .map(|&c| model.constraint(c))
        .filter(|c| c.active && !c.is_linear())
        .flat_map(|c| c.body.variables())
        .collect()
}

/// Optimization-based tightening of `vars` within `lower`/`upper`.
///
/// Returns false if the relaxation is infeasible.
fn obbt(
    rows: &[LinearRow],
    lower: &mut [f64],
    upper: &mut [f64],
    vars: &BTreeSet<VarId>,
    settings: &GdpSettings,
) -> GdpResult<bool> {
    let n = lower.len();
    let lp_settings = &settings.mip_solver_args.lp_settings;

    for &var in vars {
        for direction in [1.0, -1.0] {
            let mut costs = vec![0.0; n];
            costs[var.0] = direction;
            let lp = LinearProgram::from_rows(costs, rows, lower.to_vec(), upper.to_vec());
            let result = solve_lp(&lp, lp_settings).map_err(|e| {
                GdpError::BoundTightening(format!("OBBT on variable {}: {}", var, e))
            })?;
            match result.status {
                LpStatus::Optimal => {
                    let value = result.x[var.0];
                    if direction > 0.0 {
                        lower[var.0] = lower[var.0].max(value);
                    } else {
                        upper[var.0] = upper[var.0].min(value);
                    }
                }
                LpStatus::Infeasible => return Ok(false),
                status => {
                    log::debug!("OBBT on variable {} stopped: {}", var, status);
                }
            }
        }
        if lower[var.0] > upper[var.0] {
            // Round-off on a degenerate range.
            let mid = 0.5 * (lower[var.0] + upper[var.0]);
            lower[var.0] = mid;
            upper[var.0] = mid;
        }
    }
    Ok(true)
}

fn count_changes(master: &MasterProblem, lower: &[f64], upper: &[f64]) -> usize {
    let n = master.num_model_vars();
    (0..n)
        .filter(|&j| lower[j] > master.col_lower()[j] || upper[j] < master.col_upper()[j])
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::{Expr, Relation};

    use crate::settings::Strategy;

    /// x in [0, 10]; low: x <= 3 and x^2 >= 1; high: x >= 6.
    fn model() -> (GdpModel, DisjunctId, DisjunctId) {
        let mut m = GdpModel::new("m");
        let x = m.add_continuous("x", Some(0.0), Some(10.0));
        let low = m.add_disjunct("low");
        m.add_disjunct_constraint(low, "cap", Expr::from(x), Relation::Le(3.0));
        m.add_disjunct_constraint(low, "sq", Expr::from(x).powi(2), Relation::Ge(1.0));
        let high = m.add_disjunct("high");
        m.add_disjunct_constraint(high, "floor", Expr::from(x), Relation::Ge(6.0));
        m.add_disjunction("unit", &[low, high], true);
        m.minimize(Expr::from(x).powi(2));
        (m, low, high)
    }

    #[test]
    fn test_fbbt_boxes() {
        let (m, low, high) = model();
        let block = UtilBlock::build(&m).unwrap();
        let mut settings = GdpSettings::with_strategy(Strategy::Gloa);
        settings.calc_disjunctive_bounds = true;
        let mut master = MasterProblem::build(&m, &block, &settings).unwrap();

        let stats = tighten_disjunct_bounds(&m, &block, &mut master, &settings).unwrap();
        assert_eq!(stats.disjuncts, 2);
        assert_eq!(stats.infeasible, 0);

        let b = master.disjunct_bounds(low).unwrap();
        assert!((b.upper[0] - 3.0).abs() < 1e-9);
        // xor row forces the other indicator to 0
        assert_eq!(b.upper[2], 0.0);
        let b = master.disjunct_bounds(high).unwrap();
        assert!((b.lower[0] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible_disjunct() {
        let (mut m, _, _) = model();
        let x = VarId(0);
        let dead = m.add_disjunct("dead");
        m.add_disjunct_constraint(dead, "big", Expr::from(x), Relation::Ge(20.0));
        m.disjunctions[0].disjuncts.push(dead);
        let block = UtilBlock::build(&m).unwrap();
        let mut settings = GdpSettings::with_strategy(Strategy::Gloa);
        settings.calc_disjunctive_bounds = true;
        let mut master = MasterProblem::build(&m, &block, &settings).unwrap();

        let stats = tighten_disjunct_bounds(&m, &block, &mut master, &settings).unwrap();
        assert_eq!(stats.infeasible, 1);
        assert!(master.disjunct_bounds(dead).unwrap().infeasible);
    }

    #[test]
    fn test_obbt_matches_fbbt_on_simple_rows() {
        let (m, low, _) = model();
        let block = UtilBlock::build(&m).unwrap();
        let mut settings = GdpSettings::with_strategy(Strategy::Gloa);
        settings.calc_disjunctive_bounds = true;
        settings.obbt_disjunctive_bounds = true;
        let mut master = MasterProblem::build(&m, &block, &settings).unwrap();

        tighten_disjunct_bounds(&m, &block, &mut master, &settings).unwrap();
        let b = master.disjunct_bounds(low).unwrap();
        assert!((b.upper[0] - 3.0).abs() < 1e-7);
        assert!(b.lower[0].abs() < 1e-7);
    }
}
