//! McCormick relaxations with subgradients.
//!
//! Composition rules follow the standard factorable scheme: sums add, constant
//! multiples scale (swapping convex and concave parts for negative factors),
//! bilinear products use the composite McCormick envelope, and univariate
//! functions use `f(mid(cv, cc, z_opt))` on their convex side and a secant on
//! their concave side. Every node is finally clamped to its interval range.

use super::interval::Interval;
use super::RelaxError;
use crate::expr::Expr;

/// Relaxation of an expression at a reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct McCormick {
    /// Natural interval range of the expression.
    pub interval: Interval,
    /// Convex underestimator value.
    pub cv: f64,
    /// Concave overestimator value.
    pub cc: f64,
    /// Subgradient of the convex underestimator.
    pub cv_grad: Vec<f64>,
    /// Supergradient of the concave overestimator.
    pub cc_grad: Vec<f64>,
    /// Reference point the gradients were taken at (the input projected onto the box).
    pub point: Vec<f64>,
}

impl McCormick {
    fn constant(c: f64, n: usize) -> Self {
        Self {
            interval: Interval::point(c),
            cv: c,
            cc: c,
            cv_grad: vec![0.0; n],
            cc_grad: vec![0.0; n],
            point: Vec::new(),
        }
    }

    /// Affine underestimator `(coefficients, constant)` valid on the box.
    pub fn under_estimator(&self) -> (Vec<f64>, f64) {
        let constant = self.cv - dot(&self.cv_grad, &self.point);
        (self.cv_grad.clone(), constant)
    }

    /// Affine overestimator `(coefficients, constant)` valid on the box.
    pub fn over_estimator(&self) -> (Vec<f64>, f64) {
        let constant = self.cc - dot(&self.cc_grad, &self.point);
        (self.cc_grad.clone(), constant)
    }

    fn clamp(mut self) -> Self {
        if self.cv < self.interval.lo {
            self.cv = self.interval.lo;
            self.cv_grad.iter_mut().for_each(|g| *g = 0.0);
        }
        if self.cc > self.interval.hi {
            self.cc = self.interval.hi;
            self.cc_grad.iter_mut().for_each(|g| *g = 0.0);
        }
        self
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

fn scaled(alpha: f64, x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| alpha * v).collect()
}

/// Median of three values.
fn mid(a: f64, b: f64, c: f64) -> f64 {
    a.min(b).max(a.max(b).min(c))
}

/// Relax `expr` over the box `[lower, upper]` at the point `x`.
///
/// Every variable appearing in `expr` must have finite bounds. Points outside
/// the box are projected onto it first.
pub fn relax(
    expr: &Expr,
    lower: &[f64],
    upper: &[f64],
    x: &[f64],
) -> Result<McCormick, RelaxError> {
    let point: Vec<f64> = x
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lb, &ub))| if lb <= ub { v.max(lb).min(ub) } else { v })
        .collect();
    let mut relaxed = relax_at(expr, lower, upper, &point)?;
    relaxed.point = point;
    Ok(relaxed)
}

fn relax_at(
    expr: &Expr,
    lower: &[f64],
    upper: &[f64],
    x: &[f64],
) -> Result<McCormick, RelaxError> {
    let n = x.len();
    let relaxed = match expr {
        Expr::Const(c) => McCormick::constant(*c, n),
        Expr::Var(v) => {
            let (lb, ub) = (lower[v.0], upper[v.0]);
            if !lb.is_finite() || !ub.is_finite() {
                return Err(RelaxError::Unbounded(v.0));
            }
            let mut grad = vec![0.0; n];
            grad[v.0] = 1.0;
            McCormick {
                interval: Interval::new(lb, ub),
                cv: x[v.0],
                cc: x[v.0],
                cv_grad: grad.clone(),
                cc_grad: grad,
                point: Vec::new(),
            }
        }
        Expr::Sum(terms) => {
            let mut acc = McCormick::constant(0.0, n);
            for t in terms {
                let r = relax_at(t, lower, upper, x)?;
                acc.interval = acc.interval.add(r.interval);
                acc.cv += r.cv;
                acc.cc += r.cc;
                axpy(1.0, &r.cv_grad, &mut acc.cv_grad);
                axpy(1.0, &r.cc_grad, &mut acc.cc_grad);
            }
            acc
        }
        Expr::Scale(c, e) => {
            let r = relax_at(e, lower, upper, x)?;
            if *c >= 0.0 {
                McCormick {
                    interval: r.interval.scale(*c),
                    cv: c * r.cv,
                    cc: c * r.cc,
                    cv_grad: scaled(*c, &r.cv_grad),
                    cc_grad: scaled(*c, &r.cc_grad),
                    point: Vec::new(),
                }
            } else {
                McCormick {
                    interval: r.interval.scale(*c),
                    cv: c * r.cc,
                    cc: c * r.cv,
                    cv_grad: scaled(*c, &r.cc_grad),
                    cc_grad: scaled(*c, &r.cv_grad),
                    point: Vec::new(),
                }
            }
        }
        Expr::Mul(a, b) => product(relax_at(a, lower, upper, x)?, relax_at(b, lower, upper, x)?),
        Expr::PowI(e, k) => {
            let r = relax_at(e, lower, upper, x)?;
            power(r, *k)
        }
        Expr::Exp(e) => {
            let r = relax_at(e, lower, upper, x)?;
            let range = r.interval.exp();
            let zmin = r.interval.lo;
            convex_parts(r, range, zmin, f64::exp, f64::exp)
        }
        Expr::Ln(e) => {
            let r = relax_at(e, lower, upper, x)?;
            let range = r.interval.ln()?;
            let zmax = r.interval.hi;
            concave_univariate(r, range, zmax, f64::ln, |z| 1.0 / z, "ln")?
        }
        Expr::Sqrt(e) => {
            let r = relax_at(e, lower, upper, x)?;
            let range = r.interval.sqrt()?;
            let zmax = r.interval.hi;
            concave_univariate(r, range, zmax, f64::sqrt, |z| 0.5 / z.sqrt(), "sqrt")?
        }
    };
    Ok(relaxed.clamp())
}

/// Composite McCormick envelope of `a * b`.
fn product(a: McCormick, b: McCormick) -> McCormick {
    let (xl, xu) = (a.interval.lo, a.interval.hi);
    let (yl, yu) = (b.interval.lo, b.interval.hi);

    // (value, gradient) of min / max of c * [a.cv, a.cc] over the relaxation
    let low = |c: f64, r: &McCormick| -> (f64, Vec<f64>) {
        if c >= 0.0 {
            (c * r.cv, scaled(c, &r.cv_grad))
        } else {
            (c * r.cc, scaled(c, &r.cc_grad))
        }
    };
    let high = |c: f64, r: &McCormick| -> (f64, Vec<f64>) {
        if c >= 0.0 {
            (c * r.cc, scaled(c, &r.cc_grad))
        } else {
            (c * r.cv, scaled(c, &r.cv_grad))
        }
    };
    let combine = |(v1, g1): (f64, Vec<f64>), (v2, g2): (f64, Vec<f64>), k: f64| {
        let mut g = g1;
        axpy(1.0, &g2, &mut g);
        (v1 + v2 - k, g)
    };

    let cv1 = combine(low(yl, &a), low(xl, &b), xl * yl);
    let cv2 = combine(low(yu, &a), low(xu, &b), xu * yu);
    let (cv, cv_grad) = if cv1.0 >= cv2.0 { cv1 } else { cv2 };

    let cc1 = combine(high(yl, &a), high(xu, &b), xu * yl);
    let cc2 = combine(high(yu, &a), high(xl, &b), xl * yu);
    let (cc, cc_grad) = if cc1.0 <= cc2.0 { cc1 } else { cc2 };

    McCormick {
        interval: a.interval.mul(b.interval),
        cv,
        cc,
        cv_grad,
        cc_grad,
        point: Vec::new(),
    }
}

fn power(r: McCormick, k: u32) -> McCormick {
    let n = r.cv_grad.len();
    let range = r.interval.powi(k);
    match k {
        0 => McCormick::constant(1.0, n),
        1 => r,
        _ => {
            let f = move |z: f64| z.powi(k as i32);
            let df = move |z: f64| k as f64 * z.powi(k as i32 - 1);
            let (l, u) = (r.interval.lo, r.interval.hi);
            if k % 2 == 0 {
                let zmin = 0.0_f64.max(l).min(u);
                convex_parts(r, range, zmin, f, df)
            } else if l >= 0.0 {
                convex_parts(r, range, l, f, df)
            } else if u <= 0.0 {
                concave_parts(r, range, u, f, df)
            } else {
                McCormick {
                    interval: range,
                    cv: range.lo,
                    cc: range.hi,
                    cv_grad: vec![0.0; n],
                    cc_grad: vec![0.0; n],
                    point: Vec::new(),
                }
            }
        }
    }
}

/// Pick the inner relaxation value closest to `target`, with its gradient.
fn select(r: &McCormick, target: f64) -> (f64, Vec<f64>) {
    let z = mid(r.cv, r.cc, target);
    if z == r.cv {
        (z, r.cv_grad.clone())
    } else if z == r.cc {
        (z, r.cc_grad.clone())
    } else {
        (z, vec![0.0; r.cv_grad.len()])
    }
}

/// Secant of `f` over the operand interval: (value at z, slope).
fn secant(f: impl Fn(f64) -> f64, interval: Interval, z: f64) -> (f64, f64) {
    let (l, u) = (interval.lo, interval.hi);
    if u - l <= f64::EPSILON * (1.0 + l.abs()) {
        return (f(l), 0.0);
    }
    let slope = (f(u) - f(l)) / (u - l);
    (f(l) + slope * (z - l), slope)
}

fn convex_parts(
    r: McCormick,
    range: Interval,
    zmin: f64,
    f: impl Fn(f64) -> f64,
    df: impl Fn(f64) -> f64,
) -> McCormick {
    let (zc, gc) = select(&r, zmin);
    let cv = f(zc);
    let cv_grad = scaled(df(zc), &gc);

    let (_, slope) = secant(&f, r.interval, r.interval.lo);
    let zmax = if slope >= 0.0 { r.interval.hi } else { r.interval.lo };
    let (zs, gs) = select(&r, zmax);
    let (cc, slope) = secant(&f, r.interval, zs);
    let cc_grad = scaled(slope, &gs);

    McCormick {
        interval: range,
        cv,
        cc,
        cv_grad,
        cc_grad,
        point: Vec::new(),
    }
}

fn concave_parts(
    r: McCormick,
    range: Interval,
    zmax: f64,
    f: impl Fn(f64) -> f64,
    df: impl Fn(f64) -> f64,
) -> McCormick {
    let (zc, gc) = select(&r, zmax);
    let cc = f(zc);
    let cc_grad = scaled(df(zc), &gc);

    let (_, slope) = secant(&f, r.interval, r.interval.lo);
    let zmin = if slope >= 0.0 { r.interval.lo } else { r.interval.hi };
    let (zs, gs) = select(&r, zmin);
    let (cv, slope) = secant(&f, r.interval, zs);
    let cv_grad = scaled(slope, &gs);

    McCormick {
        interval: range,
        cv,
        cc,
        cv_grad,
        cc_grad,
        point: Vec::new(),
    }
}

fn concave_univariate(
    r: McCormick,
    range: Interval,
    zmax: f64,
    f: fn(f64) -> f64,
    df: fn(f64) -> f64,
    op: &'static str,
) -> Result<McCormick, RelaxError> {
    let (zc, _) = select(&r, zmax);
    let slope = df(zc);
    if !slope.is_finite() {
        return Err(RelaxError::Domain {
            op,
            lower: r.interval.lo,
            upper: r.interval.hi,
        });
    }
    Ok(concave_parts(r, range, zmax, f, df))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VarId;

    fn check_bounds(expr: &Expr, lower: &[f64], upper: &[f64], points: &[Vec<f64>]) {
        for x in points {
            let r = relax(expr, lower, upper, x).unwrap();
            let f = expr.eval(x);
            assert!(r.cv <= f + 1e-9, "cv {} > f {} at {:?}", r.cv, f, x);
            assert!(r.cc >= f - 1e-9, "cc {} < f {} at {:?}", r.cc, f, x);

            let (a_lo, b_lo) = r.under_estimator();
            let (a_hi, b_hi) = r.over_estimator();
            for z in points {
                let fz = expr.eval(z);
                assert!(dot(&a_lo, z) + b_lo <= fz + 1e-8);
                assert!(dot(&a_hi, z) + b_hi >= fz - 1e-8);
            }
        }
    }

    fn grid(lower: f64, upper: f64, steps: usize) -> Vec<f64> {
        (0..=steps)
            .map(|i| lower + (upper - lower) * i as f64 / steps as f64)
            .collect()
    }

    #[test]
    fn test_mid() {
        assert_eq!(mid(1.0, 3.0, 2.0), 2.0);
        assert_eq!(mid(1.0, 3.0, 5.0), 3.0);
        assert_eq!(mid(1.0, 3.0, -5.0), 1.0);
    }

    #[test]
    fn test_square_relaxation_valid() {
        let x = VarId(0);
        let e = (Expr::from(x) - 4.0).powi(2);
        let pts: Vec<Vec<f64>> = grid(0.0, 8.0, 16).into_iter().map(|v| vec![v]).collect();
        check_bounds(&e, &[0.0], &[8.0], &pts);
    }

    #[test]
    fn test_bilinear_relaxation_valid() {
        let e = Expr::from(VarId(0)) * Expr::from(VarId(1));
        let lower = [-1.0, 0.5];
        let upper = [2.0, 3.0];
        let mut pts = Vec::new();
        for a in grid(lower[0], upper[0], 6) {
            for b in grid(lower[1], upper[1], 6) {
                pts.push(vec![a, b]);
            }
        }
        check_bounds(&e, &lower, &upper, &pts);
    }

    #[test]
    fn test_exp_and_log_relaxation_valid() {
        let x = VarId(0);
        let pts: Vec<Vec<f64>> = grid(0.5, 3.0, 10).into_iter().map(|v| vec![v]).collect();
        check_bounds(&Expr::from(x).exp(), &[0.5], &[3.0], &pts);
        check_bounds(&Expr::from(x).ln(), &[0.5], &[3.0], &pts);
        check_bounds(&(-1.0 * Expr::from(x).sqrt()), &[0.5], &[3.0], &pts);
    }

    #[test]
    fn test_exact_at_linear_point() {
        let x = VarId(0);
        let e = 3.0 * Expr::from(x) + 1.0;
        let r = relax(&e, &[0.0], &[2.0], &[1.0]).unwrap();
        assert_eq!(r.cv, 4.0);
        assert_eq!(r.cc, 4.0);
        assert_eq!(r.cv_grad, vec![3.0]);
    }

    #[test]
    fn test_unbounded_variable_rejected() {
        let e = Expr::from(VarId(0)).powi(2);
        let res = relax(&e, &[f64::NEG_INFINITY], &[1.0], &[0.0]);
        assert_eq!(res, Err(RelaxError::Unbounded(0)));
    }

    #[test]
    fn test_odd_power_across_zero_uses_range() {
        let e = Expr::from(VarId(0)).powi(3);
        let r = relax(&e, &[-1.0], &[2.0], &[0.5]).unwrap();
        assert_eq!(r.cv, -1.0);
        assert_eq!(r.cc, 8.0);
        assert_eq!(r.interval, Interval::new(-1.0, 8.0));
    }
}
