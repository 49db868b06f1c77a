//! Master initialization strategies.
//!
//! Each strategy picks one or more discrete assignments from restricted
//! master solves and runs the regular subproblem step on them, so the master
//! starts the main loop with cuts from several disjuncts already in place.
//! Restricted solves never update the dual bound.

use gdp_core::{DisjunctId, VarId};

use super::driver::{MasterOutcome, SolveLoop};
use crate::error::{GdpError, GdpResult};
use crate::settings::InitStrategy;

pub(super) fn initialize(run: &mut SolveLoop<'_>) -> GdpResult<()> {
    let strategy = run.settings.init_strategy;
    if strategy != InitStrategy::NoInit {
        log::info!("Initializing master with {:?}", strategy);
    }
    match strategy {
        InitStrategy::NoInit => Ok(()),
        InitStrategy::SetCovering => set_covering(run),
        InitStrategy::MaxBinary => max_binary(run),
        InitStrategy::FixDisjuncts => fix_disjuncts(run),
        InitStrategy::CustomDisjuncts => custom_disjuncts(run),
    }
}

/// Subproblem plus no-good cut for one initialization assignment.
fn try_assignment(run: &mut SolveLoop<'_>) -> GdpResult<Option<Vec<DisjunctId>>> {
    let master_x = run.master_point()?;
    let active = run.solve_subproblem(&master_x)?;
    run.exclude_assignment(&master_x)?;
    Ok(active)
}

/// Solve covering MILPs until every selectable disjunct has been active in
/// a feasible subproblem.
///
/// Uncovered disjuncts weigh `uncovered + 1`, covered ones 1, so each MILP
/// prefers assignments that cover as many new disjuncts as possible.
fn set_covering(run: &mut SolveLoop<'_>) -> GdpResult<()> {
    let n = run.block.num_vars();
    let mut needs_cover: Vec<bool> = run
        .block
        .indicator_vars
        .iter()
        .map(|y| run.master.col_upper()[y.0] >= 0.5)
        .collect();

    for iteration in 0..run.settings.set_cover_iterlim {
        let uncovered = needs_cover.iter().filter(|&&c| c).count();
        if uncovered == 0 {
            log::info!("Set covering complete after {} iterations", iteration);
            return Ok(());
        }
        if run.time_limit_exceeded() {
            return Ok(());
        }

        let weight = (uncovered + 1) as f64;
        let mut costs = vec![0.0; n];
        for (y, &needed) in run.block.indicator_vars.iter().zip(&needs_cover) {
            costs[y.0] = if needed { -weight } else { -1.0 };
        }

        match run.solve_master(Some(&costs), &[])? {
            MasterOutcome::Point(_) => {}
            MasterOutcome::Infeasible => {
                log::info!("Set covering MILP infeasible: no assignments left");
                return Ok(());
            }
            other => {
                log::warn!("Set covering MILP stopped without a point ({:?})", other);
                return Ok(());
            }
        }

        if let Some(active) = try_assignment(run)? {
            for d in active {
                if let Some(pos) = run.block.disjunct_position(d) {
                    needs_cover[pos] = false;
                }
            }
        }
    }

    let uncovered = needs_cover.iter().filter(|&&c| c).count();
    if uncovered > 0 {
        log::warn!(
            "Set covering iteration limit ({}) reached with {} disjuncts uncovered",
            run.settings.set_cover_iterlim,
            uncovered
        );
    }
    Ok(())
}

/// One MILP maximizing the number of binaries at 1.
fn max_binary(run: &mut SolveLoop<'_>) -> GdpResult<()> {
    let mut costs = vec![0.0; run.block.num_vars()];
    for y in run.block.binary_vars(run.subproblem.model()) {
        costs[y.0] = -1.0;
    }
    match run.solve_master(Some(&costs), &[])? {
        MasterOutcome::Point(_) => {
            try_assignment(run)?;
        }
        other => log::warn!("Max-binary MILP produced no point ({:?})", other),
    }
    Ok(())
}

/// Use the indicator values stored on the model.
fn fix_disjuncts(run: &mut SolveLoop<'_>) -> GdpResult<()> {
    let model = run.subproblem.model();
    let fixed: Vec<(VarId, f64)> = run
        .block
        .indicator_vars
        .iter()
        .map(|&y| (y, model.var(y).value.unwrap_or(0.0).round().clamp(0.0, 1.0)))
        .collect();

    match run.solve_master(None, &fixed)? {
        MasterOutcome::Point(_) => {
            try_assignment(run)?;
        }
        other => log::warn!("Stored disjunct selection is not usable ({:?})", other),
    }
    Ok(())
}

/// One restricted master per user list, with the listed disjuncts forced true.
fn custom_disjuncts(run: &mut SolveLoop<'_>) -> GdpResult<()> {
    let settings = run.settings;
    for (k, list) in settings.custom_init_disjuncts.iter().enumerate() {
        if run.time_limit_exceeded() {
            return Ok(());
        }

        let mut fixed = Vec::with_capacity(list.len());
        for &d in list {
            let pos = run.block.disjunct_position(d).ok_or_else(|| {
                GdpError::Configuration(format!(
                    "custom_init_disjuncts list {} names unknown disjunct {}",
                    k, d.0
                ))
            })?;
            fixed.push((run.block.indicator_vars[pos], 1.0));
        }

        match run.solve_master(None, &fixed)? {
            MasterOutcome::Point(_) => match try_assignment(run)? {
                Some(_) => log::debug!("Custom initialization {} feasible", k),
                None => log::info!("Custom initialization {} gave an infeasible subproblem", k),
            },
            other => log::warn!("Custom initialization {} has no master point ({:?})", k, other),
        }
    }
    Ok(())
}
