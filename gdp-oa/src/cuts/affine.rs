//! Affine cuts from McCormick relaxations (GLOA).
//!
//! For a constraint `l <= g(x) <= u` enforced in a disjunct with box B, the
//! McCormick relaxation at the subproblem point gives affine functions
//! `cv_aff <= g <= cc_aff` valid over all of B. The cuts
//!
//! ```text
//! cv_aff(x) <= u        cc_aff(x) >= l
//! ```
//!
//! are therefore valid for every point of the disjunct, not just near x*.
//! Without convexity they still never remove a feasible point.

use gdp_core::{Expr, Sense};

use super::{CutContext, CutGenerator};
use crate::error::GdpResult;
use crate::master::{CutSource, LinearCut};

/// McCormick affine cut generator.
#[derive(Debug, Default)]
pub struct AffineCutGenerator {
    /// Cuts generated so far.
    pub cuts_generated: usize,

    /// Relaxations that failed (unbounded variable, domain error).
    pub relaxations_skipped: usize,
}

impl AffineCutGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self::default()
    }
}

fn sparse(coefs: &[f64]) -> Vec<(usize, f64)> {
    coefs
        .iter()
        .enumerate()
        .filter(|&(_, &a)| a != 0.0)
        .map(|(j, &a)| (j, a))
        .collect()
}

impl CutGenerator for AffineCutGenerator {
    fn name(&self) -> &'static str {
        "affine"
    }

    fn generate(&mut self, ctx: &CutContext<'_>) -> GdpResult<Vec<LinearCut>> {
        let n = ctx.block.num_vars();
        let x = &ctx.point[..n];
        let global_lower = &ctx.master.col_lower()[..n];
        let global_upper = &ctx.master.col_upper()[..n];
        let mut cuts = Vec::new();

        for cid in ctx.enforced_nonlinear() {
            let con = ctx.model.constraint(cid);
            let (lower, upper) = match con.owner.and_then(|d| ctx.master.disjunct_bounds(d)) {
                Some(b) => (&b.lower[..n], &b.upper[..n]),
                None => (global_lower, global_upper),
            };

            let relaxed = match con.body.mccormick(lower, upper, x) {
                Ok(r) => r,
                Err(e) => {
                    log::debug!("No affine cut for '{}': {}", con.name, e);
                    self.relaxations_skipped += 1;
                    continue;
                }
            };
            let activation = con.owner.map(|d| ctx.model.disjunct(d).indicator);

            if let Some(u) = con.upper {
                let (coefs, constant) = relaxed.under_estimator();
                cuts.push(
                    LinearCut::new(
                        sparse(&coefs),
                        u - constant,
                        CutSource::Affine { constraint: cid },
                    )
                    .with_name(format!("affine_{}_ub", con.name))
                    .with_activation(activation),
                );
            }
            if let Some(l) = con.lower {
                let (coefs, constant) = relaxed.over_estimator();
                let negated: Vec<f64> = coefs.iter().map(|a| -a).collect();
                cuts.push(
                    LinearCut::new(
                        sparse(&negated),
                        constant - l,
                        CutSource::Affine { constraint: cid },
                    )
                    .with_name(format!("affine_{}_lb", con.name))
                    .with_activation(activation),
                );
            }
        }

        if let Some(eta) = ctx.master.eta_column() {
            match objective_cut(
                &ctx.block.objective,
                ctx.block.sense,
                eta,
                global_lower,
                global_upper,
                x,
            ) {
                Some(cut) => cuts.push(cut),
                None => self.relaxations_skipped += 1,
            }
        }

        self.cuts_generated += cuts.len();
        log::debug!("Generated {} affine cuts", cuts.len());
        Ok(cuts)
    }
}

/// Affine epigraph cut on the objective over the global box.
///
/// Minimization: `cv_aff(x) <= eta`. Maximization: `eta <= cc_aff(x)`.
fn objective_cut(
    objective: &Expr,
    sense: Sense,
    eta: usize,
    lower: &[f64],
    upper: &[f64],
    x: &[f64],
) -> Option<LinearCut> {
    let relaxed = match objective.mccormick(lower, upper, x) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("No affine objective cut: {}", e);
            return None;
        }
    };
    let cut = match sense {
        Sense::Minimize => {
            let (coefs, constant) = relaxed.under_estimator();
            let mut terms = sparse(&coefs);
            terms.push((eta, -1.0));
            LinearCut::new(terms, -constant, CutSource::ObjectiveAffine)
        }
        Sense::Maximize => {
            let (coefs, constant) = relaxed.over_estimator();
            let negated: Vec<f64> = coefs.iter().map(|a| -a).collect();
            let mut terms = sparse(&negated);
            terms.push((eta, 1.0));
            LinearCut::new(terms, constant, CutSource::ObjectiveAffine)
        }
    };
    Some(cut.with_name("affine_objective"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::{DisjunctId, GdpModel, Relation, VarId};

    use crate::master::{DisjunctBox, MasterProblem};
    use crate::model::UtilBlock;
    use crate::settings::{GdpSettings, Strategy};

    /// x in [-2, 3], disjunct d: 0.25 <= x^2 <= 1 (the lower side is nonconvex).
    fn model() -> (GdpModel, DisjunctId) {
        let mut m = GdpModel::new("m");
        let x = m.add_continuous("x", Some(-2.0), Some(3.0));
        let d = m.add_disjunct("d");
        m.add_disjunct_constraint(d, "sq", Expr::from(x).powi(2), Relation::Range(0.25, 1.0));
        m.add_disjunction("dj", &[d], true);
        m.maximize(-(Expr::from(x) - 1.0).powi(2));
        (m, d)
    }

    #[test]
    fn test_affine_cuts_are_globally_valid() {
        let (m, d) = model();
        let block = UtilBlock::build(&m).unwrap();
        let settings = GdpSettings::with_strategy(Strategy::Gloa);
        let master = MasterProblem::build(&m, &block, &settings).unwrap();

        let point = [0.8, 1.0];
        let ctx = CutContext {
            model: &m,
            block: &block,
            master: &master,
            point: &point,
            duals: None,
            active_disjuncts: &[d],
            settings: &settings,
        };
        let cuts = AffineCutGenerator::new().generate(&ctx).unwrap();
        // upper side, lower side, objective
        assert_eq!(cuts.len(), 3);
        assert!(cuts[..2].iter().all(|c| c.activation == Some(VarId(1))));

        let eta = master.eta_column().unwrap();
        for i in 0..=50 {
            let x = -2.0 + 5.0 * i as f64 / 50.0;
            let mut col = vec![0.0; master.num_cols()];
            col[0] = x;
            col[1] = 1.0;
            col[eta] = -(x - 1.0) * (x - 1.0);
            // The objective cut admits every true objective value
            assert!(cuts[2].violation(&col) <= 1e-9);
            let feasible = x * x >= 0.25 && x * x <= 1.0;
            if feasible {
                assert!(cuts[0].violation(&col) <= 1e-9, "x = {}", x);
                assert!(cuts[1].violation(&col) <= 1e-9, "x = {}", x);
            }
        }
    }

    #[test]
    fn test_uses_disjunct_box() {
        let (m, d) = model();
        let block = UtilBlock::build(&m).unwrap();
        let settings = GdpSettings::with_strategy(Strategy::Gloa);
        let mut master = MasterProblem::build(&m, &block, &settings).unwrap();
        let mut lower = master.col_lower().to_vec();
        let mut upper = master.col_upper().to_vec();
        lower[0] = -1.0;
        upper[0] = 1.0;
        master.set_disjunct_bounds(
            d,
            DisjunctBox {
                lower,
                upper,
                infeasible: false,
            },
        );

        let point = [0.5, 1.0];
        let ctx = CutContext {
            model: &m,
            block: &block,
            master: &master,
            point: &point,
            duals: None,
            active_disjuncts: &[d],
            settings: &settings,
        };
        let cuts = AffineCutGenerator::new().generate(&ctx).unwrap();
        // The upper-side cut uses the tangent of x^2 at 0.5: x - 0.25 <= 1
        let ub = &cuts[0];
        assert_eq!(ub.terms.len(), 1);
        assert!((ub.terms[0].1 - 1.0).abs() < 1e-12);
        assert!((ub.rhs - 1.25).abs() < 1e-12);
    }
}
