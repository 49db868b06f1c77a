//! Outer-approximation cut generation.
//!
//! At the subproblem point x*, a nonlinear constraint `l <= g(x) <= u` is
//! replaced by its first-order Taylor expansion:
//!
//! ```text
//! upper side:   grad g(x*)^T x <= u - g(x*) + grad g(x*)^T x*
//! lower side:  -grad g(x*)^T x <= g(x*) - l - grad g(x*)^T x*
//! ```
//!
//! For convex g the upper-side cut never removes a feasible point. Cuts on
//! disjunct constraints carry the disjunct indicator as activation variable,
//! so they only bind when that disjunct is selected again.

use gdp_core::{Constraint, Expr, Sense};

use super::{dense_terms, CutContext, CutGenerator};
use crate::error::GdpResult;
use crate::master::{CutSource, LinearCut};

/// Which sides of a ranged constraint receive a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sides {
    upper: bool,
    lower: bool,
}

/// First-order (Taylor) cut generator.
#[derive(Debug, Default)]
pub struct OuterApproximationGenerator {
    /// Cuts generated so far.
    pub cuts_generated: usize,
}

impl OuterApproximationGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self::default()
    }

    fn sides(
        &self,
        con: &Constraint,
        value: f64,
        dual: Option<f64>,
        ctx: &CutContext<'_>,
    ) -> Sides {
        match (con.lower, con.upper) {
            (None, None) => Sides {
                upper: false,
                lower: false,
            },
            (None, Some(_)) => Sides {
                upper: true,
                lower: false,
            },
            (Some(_), None) => Sides {
                upper: false,
                lower: true,
            },
            (Some(l), Some(u)) => {
                if let Some(d) = dual.filter(|d| d.abs() > ctx.settings.small_dual_tolerance) {
                    return Sides {
                        upper: d > 0.0,
                        lower: d < 0.0,
                    };
                }
                let tol = ctx.settings.constraint_tolerance;
                Sides {
                    upper: (value - u).abs() <= tol,
                    lower: (value - l).abs() <= tol,
                }
            }
        }
    }
}

impl CutGenerator for OuterApproximationGenerator {
    fn name(&self) -> &'static str {
        "outer approximation"
    }

    fn generate(&mut self, ctx: &CutContext<'_>) -> GdpResult<Vec<LinearCut>> {
        let x = ctx.point;
        let mut cuts = Vec::new();

        for cid in ctx.enforced_nonlinear() {
            let con = ctx.model.constraint(cid);
            let value = con.body.eval(x);
            let grad = con.body.gradient(x);
            let dual = ctx.duals.and_then(|d| d.get(&cid).copied());
            let sides = self.sides(con, value, dual, ctx);

            let activation = con.owner.map(|d| ctx.model.disjunct(d).indicator);
            let terms = dense_terms(&grad);
            let slope_at_point: f64 = terms.iter().map(|&(j, a)| a * x[j]).sum();

            if let (true, Some(u)) = (sides.upper, con.upper) {
                let cut = LinearCut::new(
                    terms.clone(),
                    u - value + slope_at_point,
                    CutSource::OuterApproximation { constraint: cid },
                )
                .with_name(format!("oa_{}_ub", con.name))
                .with_activation(activation);
                cuts.push(cut);
            }
            if let (true, Some(l)) = (sides.lower, con.lower) {
                let negated = terms.iter().map(|&(j, a)| (j, -a)).collect();
                let cut = LinearCut::new(
                    negated,
                    value - l - slope_at_point,
                    CutSource::OuterApproximation { constraint: cid },
                )
                .with_name(format!("oa_{}_lb", con.name))
                .with_activation(activation);
                cuts.push(cut);
            }
        }

        if let Some(eta) = ctx.master.eta_column() {
            cuts.push(objective_cut(&ctx.block.objective, ctx.block.sense, eta, x));
        }

        self.cuts_generated += cuts.len();
        log::debug!("Generated {} OA cuts", cuts.len());
        Ok(cuts)
    }
}

/// Epigraph cut on the objective at `x`.
///
/// Minimization: `f(x*) + grad f(x*)^T (x - x*) <= eta`.
/// Maximization: `eta <= f(x*) + grad f(x*)^T (x - x*)`.
fn objective_cut(objective: &Expr, sense: Sense, eta: usize, x: &[f64]) -> LinearCut {
    let value = objective.eval(x);
    let terms = dense_terms(&objective.gradient(x));
    let slope_at_point: f64 = terms.iter().map(|&(j, a)| a * x[j]).sum();
    let offset = value - slope_at_point;

    let (mut terms, rhs) = match sense {
        Sense::Minimize => (terms, -offset),
        Sense::Maximize => (terms.into_iter().map(|(j, a)| (j, -a)).collect(), offset),
    };
    let eta_coef = match sense {
        Sense::Minimize => -1.0,
        Sense::Maximize => 1.0,
    };
    terms.push((eta, eta_coef));
    LinearCut::new(terms, rhs, CutSource::ObjectiveOuterApproximation).with_name("oa_objective")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::{GdpModel, Relation, VarId};

    use crate::master::MasterProblem;
    use crate::model::UtilBlock;
    use crate::settings::GdpSettings;

    #[test]
    fn test_objective_cut_is_tangent() {
        // f(x) = x^2 at x* = 3: 6x - 9 <= eta
        let f = Expr::from(VarId(0)).powi(2);
        let cut = objective_cut(&f, Sense::Minimize, 1, &[3.0, 0.0]);
        assert!(cut.violation(&[3.0, 9.0]).abs() < 1e-12);
        // Every point of the epigraph satisfies it
        for i in 0..=10 {
            let x = i as f64 - 5.0;
            assert!(cut.violation(&[x, x * x]) <= 1e-12);
        }
        // A point under the tangent is cut off
        assert!(cut.is_violated(&[3.0, 8.0], 1e-9));

        let cut = objective_cut(&f, Sense::Maximize, 1, &[3.0, 0.0]);
        assert!(cut.is_violated(&[3.0, 10.0], 1e-9));
        assert!(!cut.is_violated(&[3.0, 9.0], 1e-9));
    }

    #[test]
    fn test_constraint_cut_with_activation() {
        let mut m = GdpModel::new("m");
        let x = m.add_continuous("x", Some(0.0), Some(4.0));
        let d = m.add_disjunct("d");
        m.add_disjunct_constraint(d, "circle", Expr::from(x).powi(2), Relation::Le(4.0));
        m.add_disjunction("dj", &[d], true);
        m.minimize(Expr::from(x));
        let block = UtilBlock::build(&m).unwrap();
        let settings = GdpSettings::default();
        let master = MasterProblem::build(&m, &block, &settings).unwrap();

        let point = [2.0, 1.0];
        let ctx = CutContext {
            model: &m,
            block: &block,
            master: &master,
            point: &point,
            duals: None,
            active_disjuncts: &[d],
            settings: &settings,
        };
        let cuts = OuterApproximationGenerator::new().generate(&ctx).unwrap();
        assert_eq!(cuts.len(), 1);
        // 4x <= 8
        assert_eq!(cuts[0].terms, vec![(0, 4.0)]);
        assert!((cuts[0].rhs - 8.0).abs() < 1e-12);
        assert_eq!(cuts[0].activation, Some(VarId(1)));

        // Not generated when the disjunct is not selected
        let ctx = CutContext {
            active_disjuncts: &[],
            ..ctx
        };
        assert!(OuterApproximationGenerator::new().generate(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_ranged_constraint_side_selection() {
        let mut m = GdpModel::new("m");
        let x = m.add_continuous("x", Some(-3.0), Some(3.0));
        m.add_constraint("ring", Expr::from(x).powi(2), Relation::Range(1.0, 4.0));
        m.minimize(Expr::from(x));
        let block = UtilBlock::build(&m).unwrap();
        let settings = GdpSettings::default();
        let master = MasterProblem::build(&m, &block, &settings).unwrap();

        let mut gen = OuterApproximationGenerator::new();
        let point = [2.0];
        let ctx = CutContext {
            model: &m,
            block: &block,
            master: &master,
            point: &point,
            duals: None,
            active_disjuncts: &[],
            settings: &settings,
        };
        // x^2 = 4 sits on the upper side
        let cuts = gen.generate(&ctx).unwrap();
        assert_eq!(cuts.len(), 1);
        assert!(cuts[0].name.as_deref().unwrap().ends_with("_ub"));

        // A negative multiplier selects the lower side regardless of activity
        let duals = [(gdp_core::ConstraintId(0), -0.5)].into_iter().collect();
        let ctx = CutContext {
            duals: Some(&duals),
            ..ctx
        };
        let cuts = gen.generate(&ctx).unwrap();
        assert_eq!(cuts.len(), 1);
        assert!(cuts[0].name.as_deref().unwrap().ends_with("_lb"));
        assert_eq!(gen.cuts_generated, 2);
    }
}
