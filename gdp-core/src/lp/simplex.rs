//! Dense two-phase primal simplex.
//!
//! The bounded problem is rewritten in standard form `A z = b, z >= 0`:
//! columns are shifted to their finite bound (or split when free), finite
//! column ranges become extra rows, and every row side gets its own slack.
//! Phase I minimizes the sum of artificials; Phase II the real objective.
//! Pricing is Dantzig's rule, switching to Bland's rule after a run of
//! degenerate pivots.

use std::time::Instant;

use nalgebra::DMatrix;

use super::{LinearProgram, LpError, LpResult, LpSettings, LpStatus};

/// How an original column is expressed in standard-form columns.
#[derive(Debug, Clone, Copy)]
enum ColMap {
    Fixed(f64),
    Shifted { col: usize, offset: f64, sign: f64 },
    Free { pos: usize, neg: usize },
}

impl ColMap {
    fn value(&self, z: &[f64]) -> f64 {
        match *self {
            ColMap::Fixed(v) => v,
            ColMap::Shifted { col, offset, sign } => offset + sign * z[col],
            ColMap::Free { pos, neg } => z[pos] - z[neg],
        }
    }
}

struct StandardForm {
    /// Dense rows of `A z = b` over structural + slack columns.
    rows: Vec<Vec<(usize, f64)>>,
    rhs: Vec<f64>,
    /// Column whose +1 coefficient can start the basis, per row.
    slack_basis: Vec<Option<usize>>,
    cost: Vec<f64>,
    num_cols: usize,
    maps: Vec<ColMap>,
}

enum Outcome {
    Optimal,
    Unbounded,
    MaxIters,
    TimeLimit,
}

/// Solve a linear program (integrality is ignored).
pub fn solve_lp(lp: &LinearProgram, settings: &LpSettings) -> Result<LpResult, LpError> {
    lp.validate()?;

    let infeasible = LpResult {
        status: LpStatus::Infeasible,
        x: Vec::new(),
        obj_val: f64::INFINITY,
        iterations: 0,
    };

    let Some(sf) = standardize(lp, settings.tol_feas) else {
        return Ok(infeasible);
    };

    let m = sf.rows.len();
    let n_struct = sf.num_cols;

    // Rows without a usable slack start from an artificial column.
    let n_total = n_struct + sf.slack_basis.iter().filter(|s| s.is_none()).count();

    // Tableau: m constraint rows + 1 objective row; last column is rhs.
    let rhs_col = n_total;
    let mut t = DMatrix::<f64>::zeros(m + 1, n_total + 1);
    let mut basis = vec![0usize; m];
    let mut next_art = n_struct;
    for i in 0..m {
        for &(j, v) in &sf.rows[i] {
            t[(i, j)] += v;
        }
        t[(i, rhs_col)] = sf.rhs[i];
        basis[i] = match sf.slack_basis[i] {
            Some(s) => s,
            None => {
                t[(i, next_art)] = 1.0;
                next_art += 1;
                next_art - 1
            }
        };
    }

    let start = Instant::now();
    let mut solver = Tableau {
        t,
        basis,
        m,
        rhs_col,
        n_struct,
        iterations: 0,
        settings,
        start,
    };

    // Phase I
    if n_total > n_struct {
        let mut phase1_cost = vec![0.0; n_total];
        for c in phase1_cost.iter_mut().skip(n_struct) {
            *c = 1.0;
        }
        solver.set_objective(&phase1_cost);
        match solver.iterate(n_total) {
            Outcome::Optimal | Outcome::Unbounded => {}
            Outcome::MaxIters => return Ok(solver.stopped(LpStatus::MaxIters)),
            Outcome::TimeLimit => return Ok(solver.stopped(LpStatus::TimeLimit)),
        }
        let infeasibility = -solver.t[(m, rhs_col)];
        if infeasibility > settings.tol_feas * (1.0 + m as f64) {
            log::trace!("LP phase I infeasibility {:.3e}", infeasibility);
            return Ok(LpResult {
                iterations: solver.iterations,
                ..infeasible
            });
        }
        solver.drive_out_artificials();
    }

    // Phase II
    let mut cost = sf.cost.clone();
    cost.resize(n_total, 0.0);
    solver.set_objective(&cost);
    let status = match solver.iterate(n_struct) {
        Outcome::Optimal => LpStatus::Optimal,
        Outcome::Unbounded => {
            return Ok(LpResult {
                status: LpStatus::Unbounded,
                x: Vec::new(),
                obj_val: f64::NEG_INFINITY,
                iterations: solver.iterations,
            })
        }
        Outcome::MaxIters => return Ok(solver.stopped(LpStatus::MaxIters)),
        Outcome::TimeLimit => return Ok(solver.stopped(LpStatus::TimeLimit)),
    };

    let mut z = vec![0.0; n_total];
    for (i, &b) in solver.basis.iter().enumerate() {
        z[b] = solver.t[(i, rhs_col)].max(0.0);
    }
    let x: Vec<f64> = sf.maps.iter().map(|map| map.value(&z)).collect();
    let obj_val = lp.objective_value(&x);

    Ok(LpResult {
        status,
        x,
        obj_val,
        iterations: solver.iterations,
    })
}

/// Rewrite `lp` in standard form. Returns None if infeasibility is detected
/// on bounds or on rows with no free columns.
fn standardize(lp: &LinearProgram, tol: f64) -> Option<StandardForm> {
    let n = lp.num_cols();
    let mut maps = Vec::with_capacity(n);
    let mut cost = Vec::new();
    let mut rows: Vec<Vec<(usize, f64)>> = Vec::new();
    let mut rhs = Vec::new();
    let mut slack_basis = Vec::new();
    let mut range_rows: Vec<(usize, f64)> = Vec::new();

    for j in 0..n {
        let (lb, ub) = (lp.col_lower[j], lp.col_upper[j]);
        let c = lp.objective[j];
        if lb > ub + tol {
            return None;
        }
        let map = if lb.is_finite() && ub.is_finite() && (ub - lb).abs() <= tol {
            ColMap::Fixed(lb)
        } else if lb.is_finite() {
            let col = cost.len();
            cost.push(c);
            if ub.is_finite() {
                range_rows.push((col, ub - lb));
            }
            ColMap::Shifted {
                col,
                offset: lb,
                sign: 1.0,
            }
        } else if ub.is_finite() {
            let col = cost.len();
            cost.push(-c);
            ColMap::Shifted {
                col,
                offset: ub,
                sign: -1.0,
            }
        } else {
            let pos = cost.len();
            cost.push(c);
            cost.push(-c);
            ColMap::Free { pos, neg: pos + 1 }
        };
        maps.push(map);
    }

    // Structural rows are built first; slacks are numbered after all structurals.
    let mut pending: Vec<(Vec<(usize, f64)>, f64, f64)> = Vec::new();
    for (i, row) in lp.a.outer_iterator().enumerate() {
        let mut terms: Vec<(usize, f64)> = Vec::new();
        let mut shift = 0.0;
        for (j, &a) in row.iter() {
            match maps[j] {
                ColMap::Fixed(v) => shift += a * v,
                ColMap::Shifted { col, offset, sign } => {
                    shift += a * offset;
                    terms.push((col, a * sign));
                }
                ColMap::Free { pos, neg } => {
                    terms.push((pos, a));
                    terms.push((neg, -a));
                }
            }
        }
        let (lo, up) = (lp.row_lower[i] - shift, lp.row_upper[i] - shift);
        if lo > up + tol {
            return None;
        }
        if terms.iter().all(|&(_, a)| a == 0.0) {
            if lo > tol || up < -tol {
                return None;
            }
            continue;
        }
        pending.push((terms, lo, up));
    }
    for &(col, width) in &range_rows {
        pending.push((vec![(col, 1.0)], f64::NEG_INFINITY, width));
    }

    let mut next_col = cost.len();
    for (terms, lo, up) in pending {
        let equality = lo.is_finite() && up.is_finite() && (up - lo).abs() <= tol;
        let mut sides = Vec::with_capacity(2);
        if equality {
            sides.push((0.0, up));
        } else {
            if up.is_finite() {
                sides.push((1.0, up));
            }
            if lo.is_finite() {
                sides.push((-1.0, lo));
            }
        }
        for (slack_sign, b) in sides {
            let mut r = terms.clone();
            let mut slack = None;
            if slack_sign != 0.0 {
                r.push((next_col, slack_sign));
                slack = Some(next_col);
                next_col += 1;
            }
            let flip = b < 0.0;
            if flip {
                r.iter_mut().for_each(|(_, a)| *a = -*a);
            }
            let sign_after = if flip { -slack_sign } else { slack_sign };
            slack_basis.push(if sign_after > 0.0 { slack } else { None });
            rhs.push(if flip { -b } else { b });
            rows.push(r);
        }
    }
    cost.resize(next_col, 0.0);

    Some(StandardForm {
        rows,
        rhs,
        slack_basis,
        cost,
        num_cols: next_col,
        maps,
    })
}

struct Tableau<'a> {
    t: DMatrix<f64>,
    basis: Vec<usize>,
    m: usize,
    rhs_col: usize,
    n_struct: usize,
    iterations: usize,
    settings: &'a LpSettings,
    start: Instant,
}

impl Tableau<'_> {
    /// Load reduced costs `c - c_B^T B^{-1} A` into the objective row.
    fn set_objective(&mut self, cost: &[f64]) {
        let m = self.m;
        for j in 0..=self.rhs_col {
            self.t[(m, j)] = if j < cost.len() { cost[j] } else { 0.0 };
        }
        for i in 0..m {
            let cb = cost[self.basis[i]];
            if cb != 0.0 {
                for j in 0..=self.rhs_col {
                    let v = self.t[(i, j)];
                    self.t[(m, j)] -= cb * v;
                }
            }
        }
    }

    /// Pivot until optimal over columns `0..n_enter`.
    fn iterate(&mut self, n_enter: usize) -> Outcome {
        let tol_opt = self.settings.tol_opt;
        let tol_pivot = self.settings.tol_pivot;
        let mut degenerate_run = 0usize;

        loop {
            if self.iterations >= self.settings.max_iter {
                return Outcome::MaxIters;
            }
            if let Some(limit) = self.settings.time_limit_ms {
                if self.start.elapsed().as_millis() as u64 >= limit {
                    return Outcome::TimeLimit;
                }
            }

            let bland = degenerate_run >= self.settings.bland_threshold;
            let mut entering = None;
            let mut best = -tol_opt;
            for j in 0..n_enter {
                let d = self.t[(self.m, j)];
                if d < -tol_opt {
                    if bland {
                        entering = Some(j);
                        break;
                    }
                    if d < best {
                        best = d;
                        entering = Some(j);
                    }
                }
            }
            let Some(q) = entering else {
                return Outcome::Optimal;
            };

            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..self.m {
                let a = self.t[(i, q)];
                if a > tol_pivot {
                    let ratio = self.t[(i, self.rhs_col)].max(0.0) / a;
                    leaving = match leaving {
                        None => Some((i, ratio)),
                        Some((r, best_ratio)) => {
                            if ratio < best_ratio - 1e-12
                                || (ratio <= best_ratio + 1e-12 && self.basis[i] < self.basis[r])
                            {
                                Some((i, ratio))
                            } else {
                                Some((r, best_ratio))
                            }
                        }
                    };
                }
            }
            let Some((r, ratio)) = leaving else {
                return Outcome::Unbounded;
            };

            if ratio <= 1e-12 {
                degenerate_run += 1;
            } else {
                degenerate_run = 0;
            }
            self.pivot(r, q);
        }
    }

    fn pivot(&mut self, r: usize, q: usize) {
        let width = self.rhs_col + 1;
        let p = self.t[(r, q)];
        for j in 0..width {
            self.t[(r, j)] /= p;
        }
        for i in 0..=self.m {
            if i == r {
                continue;
            }
            let factor = self.t[(i, q)];
            if factor != 0.0 {
                for j in 0..width {
                    let v = self.t[(r, j)];
                    self.t[(i, j)] -= factor * v;
                }
                self.t[(i, q)] = 0.0;
            }
        }
        self.basis[r] = q;
        self.iterations += 1;
    }

    /// Pivot basic artificials (at zero level) out on any structural column.
    /// Rows where no such pivot exists are redundant and keep their artificial.
    fn drive_out_artificials(&mut self) {
        for r in 0..self.m {
            if self.basis[r] < self.n_struct {
                continue;
            }
            let col = (0..self.n_struct).find(|&j| self.t[(r, j)].abs() > self.settings.tol_pivot);
            if let Some(q) = col {
                self.pivot(r, q);
            }
        }
    }

    fn stopped(&self, status: LpStatus) -> LpResult {
        LpResult {
            status,
            x: Vec::new(),
            obj_val: f64::NAN,
            iterations: self.iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::LinearRow;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-7, "{} != {}", a, b);
    }

    #[test]
    fn test_simple_max() {
        // max 3x + 2y  s.t. x + y <= 4, x + 3y <= 6, x <= 3
        let rows = vec![
            LinearRow::le(vec![(0, 1.0), (1, 1.0)], 4.0),
            LinearRow::le(vec![(0, 1.0), (1, 3.0)], 6.0),
        ];
        let lp = LinearProgram::from_rows(
            vec![-3.0, -2.0],
            &rows,
            vec![0.0, 0.0],
            vec![3.0, f64::INFINITY],
        );
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Optimal);
        assert_close(res.x[0], 3.0);
        assert_close(res.x[1], 1.0);
        assert_close(res.obj_val, -11.0);
    }

    #[test]
    fn test_equality_and_ge_rows() {
        // min x + y  s.t. x + y >= 2, x - y == 1
        let rows = vec![
            LinearRow::ge(vec![(0, 1.0), (1, 1.0)], 2.0),
            LinearRow::eq(vec![(0, 1.0), (1, -1.0)], 1.0),
        ];
        let lp = LinearProgram::from_rows(vec![1.0, 1.0], &rows, vec![0.0; 2], vec![10.0; 2]);
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Optimal);
        assert_close(res.x[0], 1.5);
        assert_close(res.x[1], 0.5);
    }

    #[test]
    fn test_free_and_negative_columns() {
        // min x  s.t. x >= -5 via row, x free
        let rows = vec![LinearRow::ge(vec![(0, 1.0)], -5.0)];
        let lp = LinearProgram::from_rows(
            vec![1.0],
            &rows,
            vec![f64::NEG_INFINITY],
            vec![f64::INFINITY],
        );
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Optimal);
        assert_close(res.x[0], -5.0);

        // max x with x <= -2 upper bound only
        let lp = LinearProgram::from_rows(vec![-1.0], &[], vec![f64::NEG_INFINITY], vec![-2.0]);
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_close(res.x[0], -2.0);
    }

    #[test]
    fn test_infeasible() {
        let rows = vec![
            LinearRow::le(vec![(0, 1.0)], 1.0),
            LinearRow::ge(vec![(0, 1.0)], 2.0),
        ];
        let lp = LinearProgram::from_rows(vec![1.0], &rows, vec![0.0], vec![10.0]);
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let rows = vec![LinearRow::ge(vec![(0, 1.0), (1, -1.0)], 0.0)];
        let lp = LinearProgram::from_rows(
            vec![-1.0, 0.0],
            &rows,
            vec![0.0, 0.0],
            vec![f64::INFINITY, f64::INFINITY],
        );
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Unbounded);
    }

    #[test]
    fn test_fixed_column_and_empty_row() {
        let rows = vec![
            LinearRow::le(vec![(0, 1.0)], 5.0),
            LinearRow::le(vec![(0, 1.0), (1, 1.0)], 3.0),
        ];
        let lp = LinearProgram::from_rows(vec![0.0, -1.0], &rows, vec![2.0, 0.0], vec![2.0, 9.0]);
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Optimal);
        assert_close(res.x[0], 2.0);
        assert_close(res.x[1], 1.0);

        let rows = vec![LinearRow::ge(vec![(0, 1.0)], 3.0)];
        let lp = LinearProgram::from_rows(vec![0.0], &rows, vec![2.0], vec![2.0]);
        let res = solve_lp(&lp, &LpSettings::default()).unwrap();
        assert_eq!(res.status, LpStatus::Infeasible);
    }
}
