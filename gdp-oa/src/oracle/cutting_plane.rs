//! Kelley cutting-plane NLP oracle.
//!
//! Solves convex subproblems by successive linearization:
//!
//! ```text
//! minimize    t                      (or the linear objective directly)
//! subject to  linear rows
//!             g(x_k) + grad g(x_k)^T (x - x_k) <= u   for every violated row and point x_k
//!             f(x_k) + grad f(x_k)^T (x - x_k) <= t
//! ```
//!
//! Each round solves the LP (or, with unfixed integers, the MILP) relaxation
//! and linearizes whatever the new point violates. The method stops once no
//! nonlinear row is violated and the epigraph value matches the objective.
//! Nonlinear equalities are not supported.

use std::time::Instant;

use gdp_core::{solve_lp, LinearProgram, LinearRow, LpSettings, LpStatus, VarType};

use super::{NlpOracle, NlpProblem, NlpResult, NlpStatus};
use crate::error::GdpResult;
use crate::master::{MipOracle, MipStatus};
use crate::search::BranchAndBoundMilp;
use crate::settings::CuttingPlaneSettings;

/// Outcome of one relaxation solve.
enum Relaxation {
    Point(Vec<f64>),
    Stopped(NlpStatus),
}

/// Kelley / extended cutting-plane NLP oracle.
#[derive(Debug, Clone, Default)]
pub struct CuttingPlaneNlp {
    settings: CuttingPlaneSettings,
    /// Linearization rounds used by the most recent solve.
    pub last_iterations: usize,
}

impl CuttingPlaneNlp {
    /// Create an oracle with the given settings.
    pub fn new(settings: CuttingPlaneSettings) -> Self {
        Self {
            settings,
            last_iterations: 0,
        }
    }

    fn solve_relaxation(
        &self,
        lp: &LinearProgram,
        integer: bool,
        time_limit_ms: Option<u64>,
    ) -> GdpResult<Relaxation> {
        if integer {
            let mut milp = BranchAndBoundMilp::new(self.settings.milp.clone());
            let result = milp.solve(lp, time_limit_ms)?;
            return Ok(match result.status {
                MipStatus::Optimal if result.has_solution() => Relaxation::Point(result.x),
                MipStatus::Infeasible => Relaxation::Stopped(NlpStatus::Infeasible),
                MipStatus::TimeLimit => Relaxation::Stopped(NlpStatus::TimeLimit),
                MipStatus::NodeLimit => Relaxation::Stopped(NlpStatus::IterationLimit),
                _ => Relaxation::Stopped(NlpStatus::Error),
            });
        }

        let lp_settings = LpSettings {
            time_limit_ms,
            ..self.settings.milp.lp_settings.clone()
        };
        let result = solve_lp(lp, &lp_settings)?;
        Ok(match result.status {
            LpStatus::Optimal => Relaxation::Point(result.x),
            LpStatus::Infeasible => Relaxation::Stopped(NlpStatus::Infeasible),
            LpStatus::TimeLimit => Relaxation::Stopped(NlpStatus::TimeLimit),
            LpStatus::MaxIters => Relaxation::Stopped(NlpStatus::IterationLimit),
            LpStatus::Unbounded => Relaxation::Stopped(NlpStatus::Error),
        })
    }
}

/// Linearization `grad^T x <= rhs` of `sign * (g(x) - side) <= 0` at `x0`.
fn linearize(body: &gdp_core::Expr, x0: &[f64], side: f64, sign: f64) -> Option<LinearRow> {
    let value = body.eval(x0);
    let grad = body.gradient(x0);
    if !value.is_finite() || grad.values().any(|g| !g.is_finite()) {
        return None;
    }
    let terms: Vec<(usize, f64)> = grad.iter().map(|(v, &g)| (v.0, sign * g)).collect();
    let slope: f64 = terms.iter().map(|&(j, a)| a * x0[j]).sum();
    Some(LinearRow::le(terms, slope - sign * (value - side)))
}

impl NlpOracle for CuttingPlaneNlp {
    fn name(&self) -> &str {
        "cutting_plane"
    }

    fn solve(&mut self, problem: &NlpProblem, time_limit_ms: Option<u64>) -> GdpResult<NlpResult> {
        let start = Instant::now();
        let settings = &self.settings;
        let n = problem.num_vars();
        let sign = problem.sense.sign();
        let clamp = settings.bound_clamp;
        self.last_iterations = 0;

        if let Some(row) = problem
            .constraints
            .iter()
            .find(|r| !r.is_linear() && r.is_equality())
        {
            log::warn!(
                "Nonlinear equality constraint {} is not supported by the cutting-plane oracle",
                row.id
            );
            return Ok(NlpResult::no_solution(NlpStatus::Error, problem.sense));
        }

        let mut col_lower: Vec<f64> = problem.lower.iter().map(|&l| l.max(-clamp)).collect();
        let mut col_upper: Vec<f64> = problem.upper.iter().map(|&u| u.min(clamp)).collect();
        let mut kinds: Vec<VarType> = problem
            .integer
            .iter()
            .map(|&i| if i { VarType::Integer } else { VarType::Continuous })
            .collect();

        let mut rows = Vec::new();
        let mut nonlinear = Vec::new();
        for row in &problem.constraints {
            match row.body.linear_part() {
                Some(lin) => rows.push(LinearRow {
                    terms: lin.terms.iter().map(|(v, &a)| (v.0, a)).collect(),
                    lower: row.lower.map_or(f64::NEG_INFINITY, |l| l - lin.constant),
                    upper: row.upper.map_or(f64::INFINITY, |u| u - lin.constant),
                }),
                None => nonlinear.push(row),
            }
        }

        // Objective: linear costs, or an epigraph column t >= sign * f(x).
        let mut costs = vec![0.0; n];
        let mut offset = 0.0;
        let epigraph = match problem.objective.linear_part() {
            Some(lin) => {
                for (v, &a) in &lin.terms {
                    costs[v.0] += sign * a;
                }
                offset = sign * lin.constant;
                None
            }
            None => {
                let (lo, hi) = match problem.objective.interval(&col_lower, &col_upper) {
                    Ok(iv) => {
                        let (a, b) = if sign > 0.0 { (iv.lo, iv.hi) } else { (-iv.hi, -iv.lo) };
                        (a.max(-clamp), b.min(clamp))
                    }
                    Err(_) => (-clamp, clamp),
                };
                col_lower.push(lo);
                col_upper.push(hi.max(lo));
                kinds.push(VarType::Continuous);
                costs.push(1.0);
                Some(n)
            }
        };

        let mut point: Vec<f64> = problem
            .start
            .iter()
            .zip(col_lower.iter().zip(&col_upper))
            .map(|(&v, (&l, &u))| v.max(l).min(u))
            .collect();
        if let Some(t) = epigraph {
            point.push(col_lower[t]);
        }

        for iteration in 0..=settings.max_iter {
            // Linearize whatever the current point violates.
            let mut added = 0usize;
            for row in &nonlinear {
                let value = row.body.eval(&point[..n]);
                if value.is_nan() {
                    log::warn!("Constraint {} evaluates to NaN", row.id);
                    return Ok(NlpResult::no_solution(NlpStatus::Error, problem.sense));
                }
                if let Some(u) = row.upper.filter(|&u| value > u + settings.feas_tol) {
                    if let Some(cut) = linearize(&row.body, &point[..n], u, 1.0) {
                        rows.push(cut);
                        added += 1;
                    }
                }
                if let Some(l) = row.lower.filter(|&l| value < l - settings.feas_tol) {
                    if let Some(cut) = linearize(&row.body, &point[..n], l, -1.0) {
                        rows.push(cut);
                        added += 1;
                    }
                }
            }
            if let Some(t) = epigraph {
                let f = sign * problem.objective.eval(&point[..n]);
                if f.is_nan() {
                    log::warn!("Objective evaluates to NaN");
                    return Ok(NlpResult::no_solution(NlpStatus::Error, problem.sense));
                }
                if f > point[t] + settings.opt_tol * (1.0 + f.abs()) {
                    if let Some(mut cut) = linearize(&problem.objective, &point[..n], 0.0, sign) {
                        // sign * f(x) <= t
                        cut.terms.push((t, -1.0));
                        rows.push(cut);
                        added += 1;
                    }
                }
            }

            if added == 0 && iteration > 0 {
                let x = point[..n].to_vec();
                let obj_val = problem.objective.eval(&x);
                log::debug!(
                    "Cutting-plane oracle converged after {} rounds, objective {:.8e}",
                    iteration,
                    obj_val
                );
                return Ok(NlpResult {
                    status: NlpStatus::Optimal,
                    x,
                    obj_val,
                    duals: None,
                });
            }
            if iteration == settings.max_iter {
                break;
            }

            let remaining = match time_limit_ms {
                Some(limit) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    if elapsed >= limit {
                        return Ok(NlpResult::no_solution(NlpStatus::TimeLimit, problem.sense));
                    }
                    Some(limit - elapsed)
                }
                None => None,
            };

            let mut lp = LinearProgram::from_rows(
                costs.clone(),
                &rows,
                col_lower.clone(),
                col_upper.clone(),
            )
            .with_integrality(kinds.clone());
            lp.objective_offset = offset;

            self.last_iterations = iteration + 1;
            match self.solve_relaxation(&lp, problem.has_integers(), remaining)? {
                Relaxation::Point(x) => point = x,
                Relaxation::Stopped(status) => {
                    log::debug!("Cutting-plane relaxation stopped: {:?}", status);
                    return Ok(NlpResult::no_solution(status, problem.sense));
                }
            }
        }

        log::debug!(
            "Cutting-plane oracle hit its iteration limit (violation {:.3e})",
            problem.max_violation(&point[..n])
        );
        Ok(NlpResult {
            status: NlpStatus::IterationLimit,
            x: point[..n].to_vec(),
            obj_val: problem.objective.eval(&point[..n]),
            duals: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::{ConstraintId, Expr, Sense, VarId};

    use crate::oracle::NlpRow;

    fn var(i: usize) -> Expr {
        Expr::from(VarId(i))
    }

    fn problem(objective: Expr, sense: Sense, constraints: Vec<NlpRow>) -> NlpProblem {
        NlpProblem {
            lower: vec![-5.0, -5.0],
            upper: vec![5.0, 5.0],
            integer: vec![false, false],
            objective,
            sense,
            constraints,
            start: vec![0.0, 0.0],
        }
    }

    #[test]
    fn test_unconstrained_quadratic() {
        let p = problem(
            (var(0) - 1.0).powi(2) + (var(1) + 2.0).powi(2),
            Sense::Minimize,
            Vec::new(),
        );
        let result = CuttingPlaneNlp::default().solve(&p, None).unwrap();
        assert_eq!(result.status, NlpStatus::Optimal);
        assert!((result.x[0] - 1.0).abs() < 1e-2);
        assert!((result.x[1] + 2.0).abs() < 1e-2);
        assert!(result.obj_val < 1e-4);
    }

    #[test]
    fn test_disk_constraint_linear_objective() {
        // max x0 + x1 over the unit disk: optimum sqrt(2)
        let disk = NlpRow {
            id: ConstraintId(0),
            body: var(0).powi(2) + var(1).powi(2),
            lower: None,
            upper: Some(1.0),
        };
        let p = problem(var(0) + var(1), Sense::Maximize, vec![disk]);
        let result = CuttingPlaneNlp::default().solve(&p, None).unwrap();
        assert_eq!(result.status, NlpStatus::Optimal);
        assert!((result.obj_val - 2f64.sqrt()).abs() < 1e-3);
        assert!(p.max_violation(&result.x) <= 1e-6);
    }

    #[test]
    fn test_infeasible() {
        let disk = NlpRow {
            id: ConstraintId(0),
            body: var(0).powi(2) + var(1).powi(2),
            lower: None,
            upper: Some(1.0),
        };
        let far = NlpRow {
            id: ConstraintId(1),
            body: var(0),
            lower: Some(3.0),
            upper: None,
        };
        let p = problem(var(0), Sense::Minimize, vec![disk, far]);
        let result = CuttingPlaneNlp::default().solve(&p, None).unwrap();
        assert_eq!(result.status, NlpStatus::Infeasible);
        assert!(!result.status.is_feasible());
    }

    #[test]
    fn test_nonlinear_equality_unsupported() {
        let circle = NlpRow {
            id: ConstraintId(0),
            body: var(0).powi(2),
            lower: Some(1.0),
            upper: Some(1.0),
        };
        let p = problem(var(0), Sense::Minimize, vec![circle]);
        let result = CuttingPlaneNlp::default().solve(&p, None).unwrap();
        assert_eq!(result.status, NlpStatus::Error);
    }

    #[test]
    fn test_integer_variables() {
        // min (x0 - 1.6)^2 with x0 integer: x0 = 2
        let mut p = problem(
            (var(0) - 1.6).powi(2) + var(1).powi(2),
            Sense::Minimize,
            Vec::new(),
        );
        p.integer[0] = true;
        let result = CuttingPlaneNlp::default().solve(&p, None).unwrap();
        assert_eq!(result.status, NlpStatus::Optimal);
        assert!((result.x[0] - 2.0).abs() < 1e-6);
    }
}
