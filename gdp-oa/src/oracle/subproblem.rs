//! Working copy of the model for the fixed-disjunct subproblems.
//!
//! Fixing is scoped: [`Subproblem::fix_master_solution`] returns a guard that
//! records every variable it touches and restores the previous state when it
//! is dropped, whichever way the iteration ends.

use gdp_core::{DisjunctId, GdpModel, VarId};

use super::{NlpProblem, NlpRow};
use crate::error::{GdpError, GdpResult};
use crate::model::UtilBlock;
use crate::settings::GdpSettings;

/// Working copy of the original model.
#[derive(Debug, Clone)]
pub struct Subproblem {
    model: GdpModel,
}

/// Previous state of a variable touched by the guard.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SavedVar {
    var: VarId,
    fixed: bool,
    value: Option<f64>,
}

impl Subproblem {
    /// Clone `model` into a working copy.
    pub fn new(model: &GdpModel) -> Self {
        Self {
            model: model.clone(),
        }
    }

    /// The working model.
    pub fn model(&self) -> &GdpModel {
        &self.model
    }

    /// Fixed flag and value of every variable.
    pub fn fixed_state(&self) -> Vec<(bool, Option<f64>)> {
        self.model.vars.iter().map(|v| (v.fixed, v.value)).collect()
    }

    /// Fix the indicators (and with `force_subproblem_nlp`, every other
    /// discrete variable) at their master values.
    ///
    /// `master_x` is indexed by variable id. Values must be within
    /// `integer_tolerance` of an integer; they are rounded when
    /// `round_discrete_vars` is set.
    pub fn fix_master_solution(
        &mut self,
        block: &UtilBlock,
        master_x: &[f64],
        settings: &GdpSettings,
    ) -> GdpResult<FixedSubproblem<'_>> {
        let mut guard = FixedSubproblem {
            model: &mut self.model,
            saved: Vec::new(),
            active: Vec::new(),
            start: Vec::new(),
        };

        let mut to_fix: Vec<VarId> = block.indicator_vars.clone();
        if settings.force_subproblem_nlp {
            to_fix.extend(block.discrete_vars.iter().copied());
        }

        for var in to_fix {
            let raw = master_x[var.0];
            if (raw - raw.round()).abs() > settings.integer_tolerance {
                return Err(GdpError::SubproblemSolve(format!(
                    "Master value {} of discrete variable '{}' is not integral",
                    raw,
                    guard.model.var(var).name
                )));
            }
            let value = if settings.round_discrete_vars {
                raw.round()
            } else {
                raw
            };
            guard.fix(var, value);
        }

        guard.active = block
            .disjuncts
            .iter()
            .zip(&block.indicator_vars)
            .filter(|&(_, &y)| guard.model.var(y).value.unwrap_or(0.0) > 0.5)
            .map(|(&d, _)| d)
            .collect();

        let lower = guard.model.lower_bounds();
        let upper = guard.model.upper_bounds();
        guard.start = master_x
            .iter()
            .zip(lower.iter().zip(&upper))
            .map(|(&v, (&l, &u))| v.max(l).min(u))
            .collect();

        log::debug!(
            "Subproblem fixed {} variables, {} active disjuncts",
            guard.saved.len(),
            guard.active.len()
        );
        Ok(guard)
    }
}

/// Subproblem with master decisions fixed; restores the model on drop.
#[derive(Debug)]
pub struct FixedSubproblem<'a> {
    model: &'a mut GdpModel,
    saved: Vec<SavedVar>,
    active: Vec<DisjunctId>,
    start: Vec<f64>,
}

impl FixedSubproblem<'_> {
    fn fix(&mut self, var: VarId, value: f64) {
        let v = self.model.var(var);
        self.saved.push(SavedVar {
            var,
            fixed: v.fixed,
            value: v.value,
        });
        self.model.fix(var, value);
    }

    /// Load `x` into the free variables. Restored with everything else.
    pub fn load_solution(&mut self, x: &[f64]) {
        for (j, &value) in x.iter().enumerate().take(self.model.vars.len()) {
            let var = VarId(j);
            let v = self.model.var(var);
            if v.fixed {
                continue;
            }
            self.saved.push(SavedVar {
                var,
                fixed: false,
                value: v.value,
            });
            self.model.var_mut(var).value = Some(value);
        }
    }

    /// Model with the master decisions fixed.
    pub fn model(&self) -> &GdpModel {
        self.model
    }

    /// Disjuncts selected by the master.
    pub fn active_disjuncts(&self) -> &[DisjunctId] {
        &self.active
    }

    /// NLP over the global constraints and those of the selected disjuncts.
    pub fn nlp_problem(&self, block: &UtilBlock) -> NlpProblem {
        let constraints = block
            .constraints
            .iter()
            .filter_map(|&cid| {
                let con = self.model.constraint(cid);
                let enforced = con.owner.map_or(true, |d| self.active.contains(&d));
                enforced.then(|| NlpRow {
                    id: cid,
                    body: con.body.clone(),
                    lower: con.lower,
                    upper: con.upper,
                })
            })
            .collect();

        NlpProblem {
            lower: self.model.lower_bounds(),
            upper: self.model.upper_bounds(),
            integer: self
                .model
                .vars
                .iter()
                .map(|v| v.var_type.is_discrete() && !v.fixed)
                .collect(),
            objective: block.objective.clone(),
            sense: block.sense,
            constraints,
            start: self.start.clone(),
        }
    }
}

impl Drop for FixedSubproblem<'_> {
    fn drop(&mut self) {
        // Reverse order restores the oldest state if a variable was fixed twice.
        for saved in self.saved.drain(..).rev() {
            let var = self.model.var_mut(saved.var);
            var.fixed = saved.fixed;
            var.value = saved.value;
        }
    }
}
