//! Cut generation for logic-based outer approximation.
//!
//! This module provides the cut generators used after each subproblem:
//! - Outer-approximation cuts (first-order Taylor expansion, LOA)
//! - Affine McCormick cuts valid over a whole disjunct (GLOA)
//! - No-good cuts excluding one discrete assignment
//! - Cut pool management

mod affine;
mod no_good;
mod outer_approx;
mod pool;

use std::collections::BTreeMap;

use gdp_core::{ConstraintId, DisjunctId, GdpModel, VarId};

use crate::error::GdpResult;
use crate::master::{LinearCut, MasterProblem};
use crate::model::UtilBlock;
use crate::settings::GdpSettings;

pub use affine::AffineCutGenerator;
pub use no_good::{no_good_cut, NoGoodOutcome};
pub use outer_approx::OuterApproximationGenerator;
pub use pool::{CutPool, CutPoolStats, PooledCut};

/// Everything a cut generator may look at after a feasible subproblem.
pub struct CutContext<'a> {
    /// Subproblem model.
    pub model: &'a GdpModel,
    /// Canonical component lists.
    pub block: &'a UtilBlock,
    /// Master the cuts are destined for.
    pub master: &'a MasterProblem,
    /// Subproblem solution, indexed by variable id.
    pub point: &'a [f64],
    /// Constraint multipliers reported by the NLP oracle.
    pub duals: Option<&'a BTreeMap<ConstraintId, f64>>,
    /// Disjuncts selected in this subproblem.
    pub active_disjuncts: &'a [DisjunctId],
    /// Solver settings.
    pub settings: &'a GdpSettings,
}

impl CutContext<'_> {
    /// Nonlinear constraints enforced in the subproblem: global ones plus
    /// those of the selected disjuncts.
    pub fn enforced_nonlinear(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.block
            .nonlinear_constraints
            .iter()
            .copied()
            .filter(move |&c| match self.model.constraint(c).owner {
                None => true,
                Some(d) => self.active_disjuncts.contains(&d),
            })
    }
}

/// A generator of linear cuts from a subproblem solution.
pub trait CutGenerator {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Cuts for the master at the subproblem point.
    fn generate(&mut self, ctx: &CutContext<'_>) -> GdpResult<Vec<LinearCut>>;
}

/// Terms `(column, coefficient)` from a map keyed by variable.
fn dense_terms(map: &BTreeMap<VarId, f64>) -> Vec<(usize, f64)> {
    map.iter().map(|(v, &a)| (v.0, a)).collect()
}
