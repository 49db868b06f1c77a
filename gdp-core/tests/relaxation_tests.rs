//! Validity of interval and McCormick relaxations on composite expressions.

use gdp_core::{Expr, VarId};

fn grid2(lo: [f64; 2], hi: [f64; 2], steps: usize) -> Vec<Vec<f64>> {
    let mut pts = Vec::new();
    for i in 0..=steps {
        for j in 0..=steps {
            let a = lo[0] + (hi[0] - lo[0]) * i as f64 / steps as f64;
            let b = lo[1] + (hi[1] - lo[1]) * j as f64 / steps as f64;
            pts.push(vec![a, b]);
        }
    }
    pts
}

fn check(expr: &Expr, lo: [f64; 2], hi: [f64; 2]) {
    let pts = grid2(lo, hi, 5);
    let range = expr.interval(&lo, &hi).expect("interval failed");
    for x in &pts {
        let f = expr.eval(x);
        assert!(range.contains(f, 1e-9), "{} outside {}", f, range);

        let r = expr.mccormick(&lo, &hi, x).expect("relaxation failed");
        assert!(r.cv <= f + 1e-8 && f <= r.cc + 1e-8);

        let (g, c) = r.under_estimator();
        for z in &pts {
            let lin: f64 = g.iter().zip(z).map(|(a, b)| a * b).sum::<f64>() + c;
            assert!(lin <= expr.eval(z) + 1e-7, "underestimator cut off {:?}", z);
        }
        let (g, c) = r.over_estimator();
        for z in &pts {
            let lin: f64 = g.iter().zip(z).map(|(a, b)| a * b).sum::<f64>() + c;
            assert!(lin >= expr.eval(z) - 1e-7, "overestimator cut off {:?}", z);
        }
    }
}

#[test]
fn test_quadratic_with_bilinear_term() {
    let (x, y) = (VarId(0), VarId(1));
    // x^2 - 2xy + 3y
    let e = Expr::from(x).powi(2) - 2.0 * (Expr::from(x) * Expr::from(y)) + 3.0 * Expr::from(y);
    check(&e, [-1.0, 0.0], [2.0, 3.0]);
}

#[test]
fn test_exp_of_linear() {
    let (x, y) = (VarId(0), VarId(1));
    let e = (0.5 * Expr::from(x) - Expr::from(y)).exp();
    check(&e, [0.0, -1.0], [2.0, 1.0]);
}

#[test]
fn test_log_of_product() {
    let (x, y) = (VarId(0), VarId(1));
    let e = (Expr::from(x) * Expr::from(y)).ln();
    check(&e, [1.0, 0.5], [3.0, 2.0]);
}

#[test]
fn test_negated_sqrt_sum() {
    let (x, y) = (VarId(0), VarId(1));
    let e = -(Expr::from(x) + Expr::from(y) + 1.0).sqrt();
    check(&e, [0.0, 0.0], [4.0, 4.0]);
}
