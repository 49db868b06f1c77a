//! Expression trees for objectives and constraint bodies.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::model::VarId;
use crate::relax::{self, Interval, McCormick, RelaxError};

/// An algebraic expression over model variables.
///
/// Values are always supplied as a dense slice indexed by [`VarId::index`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant.
    Const(f64),
    /// Variable reference.
    Var(VarId),
    /// Sum of terms.
    Sum(Vec<Expr>),
    /// Constant multiple.
    Scale(f64, Box<Expr>),
    /// Product of two expressions.
    Mul(Box<Expr>, Box<Expr>),
    /// Non-negative integer power.
    PowI(Box<Expr>, u32),
    /// Natural exponential.
    Exp(Box<Expr>),
    /// Natural logarithm.
    Ln(Box<Expr>),
    /// Square root.
    Sqrt(Box<Expr>),
}

/// Affine expression `sum(coef * var) + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    /// Coefficients by variable.
    pub terms: BTreeMap<VarId, f64>,
    /// Constant offset.
    pub constant: f64,
}

impl LinearExpr {
    /// Constant affine expression.
    pub fn constant(c: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: c,
        }
    }

    /// Evaluate at a point.
    pub fn eval(&self, x: &[f64]) -> f64 {
        self.terms
            .iter()
            .fold(self.constant, |acc, (v, c)| acc + c * x[v.0])
    }

    fn scaled(mut self, factor: f64) -> Self {
        for c in self.terms.values_mut() {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }

    fn merge(&mut self, other: LinearExpr) {
        for (v, c) in other.terms {
            *self.terms.entry(v).or_insert(0.0) += c;
        }
        self.constant += other.constant;
    }
}

impl Expr {
    /// Constant expression.
    pub fn constant(c: f64) -> Self {
        Expr::Const(c)
    }

    /// Variable expression.
    pub fn var(v: VarId) -> Self {
        Expr::Var(v)
    }

    /// Affine expression from coefficient pairs.
    pub fn linear(terms: &[(VarId, f64)], constant: f64) -> Self {
        let mut parts: Vec<Expr> = terms
            .iter()
            .map(|&(v, c)| Expr::Scale(c, Box::new(Expr::Var(v))))
            .collect();
        if constant != 0.0 || parts.is_empty() {
            parts.push(Expr::Const(constant));
        }
        Expr::Sum(parts)
    }

    /// Integer power.
    pub fn powi(self, n: u32) -> Self {
        Expr::PowI(Box::new(self), n)
    }

    /// Natural exponential.
    pub fn exp(self) -> Self {
        Expr::Exp(Box::new(self))
    }

    /// Natural logarithm.
    pub fn ln(self) -> Self {
        Expr::Ln(Box::new(self))
    }

    /// Square root.
    pub fn sqrt(self) -> Self {
        Expr::Sqrt(Box::new(self))
    }

    /// Evaluate at a point.
    pub fn eval(&self, x: &[f64]) -> f64 {
        match self {
            Expr::Const(c) => *c,
            Expr::Var(v) => x[v.0],
            Expr::Sum(terms) => terms.iter().map(|t| t.eval(x)).sum(),
            Expr::Scale(c, e) => c * e.eval(x),
            Expr::Mul(a, b) => a.eval(x) * b.eval(x),
            Expr::PowI(e, n) => e.eval(x).powi(*n as i32),
            Expr::Exp(e) => e.eval(x).exp(),
            Expr::Ln(e) => e.eval(x).ln(),
            Expr::Sqrt(e) => e.eval(x).sqrt(),
        }
    }

    /// Gradient at a point, keyed by variable. Variables with no path to the
    /// root still get an entry (possibly zero) if they appear in the tree.
    pub fn gradient(&self, x: &[f64]) -> BTreeMap<VarId, f64> {
        let mut grad = BTreeMap::new();
        self.accumulate(x, 1.0, &mut grad);
        grad
    }

    fn accumulate(&self, x: &[f64], adj: f64, grad: &mut BTreeMap<VarId, f64>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(v) => *grad.entry(*v).or_insert(0.0) += adj,
            Expr::Sum(terms) => {
                for t in terms {
                    t.accumulate(x, adj, grad);
                }
            }
            Expr::Scale(c, e) => e.accumulate(x, adj * c, grad),
            Expr::Mul(a, b) => {
                let (va, vb) = (a.eval(x), b.eval(x));
                a.accumulate(x, adj * vb, grad);
                b.accumulate(x, adj * va, grad);
            }
            Expr::PowI(e, n) => {
                let d = match n {
                    0 => 0.0,
                    _ => *n as f64 * e.eval(x).powi(*n as i32 - 1),
                };
                e.accumulate(x, adj * d, grad);
            }
            Expr::Exp(e) => e.accumulate(x, adj * e.eval(x).exp(), grad),
            Expr::Ln(e) => e.accumulate(x, adj / e.eval(x), grad),
            Expr::Sqrt(e) => e.accumulate(x, adj / (2.0 * e.eval(x).sqrt()), grad),
        }
    }

    /// Affine form of the expression, or None if it is nonlinear.
    pub fn linear_part(&self) -> Option<LinearExpr> {
        match self {
            Expr::Const(c) => Some(LinearExpr::constant(*c)),
            Expr::Var(v) => {
                let mut lin = LinearExpr::default();
                lin.terms.insert(*v, 1.0);
                Some(lin)
            }
            Expr::Sum(terms) => {
                let mut lin = LinearExpr::default();
                for t in terms {
                    lin.merge(t.linear_part()?);
                }
                Some(lin)
            }
            Expr::Scale(c, e) => Some(e.linear_part()?.scaled(*c)),
            Expr::Mul(a, b) => {
                let (la, lb) = (a.linear_part()?, b.linear_part()?);
                if la.terms.is_empty() {
                    Some(lb.scaled(la.constant))
                } else if lb.terms.is_empty() {
                    Some(la.scaled(lb.constant))
                } else {
                    None
                }
            }
            Expr::PowI(e, n) => {
                if *n == 0 {
                    return Some(LinearExpr::constant(1.0));
                }
                let lin = e.linear_part()?;
                if *n == 1 {
                    Some(lin)
                } else if lin.terms.is_empty() {
                    Some(LinearExpr::constant(lin.constant.powi(*n as i32)))
                } else {
                    None
                }
            }
            Expr::Exp(e) => constant_only(e, f64::exp),
            Expr::Ln(e) => constant_only(e, f64::ln),
            Expr::Sqrt(e) => constant_only(e, f64::sqrt),
        }
    }

    /// True if the expression is affine.
    pub fn is_linear(&self) -> bool {
        self.linear_part().is_some()
    }

    /// Variables referenced by the expression.
    pub fn variables(&self) -> BTreeSet<VarId> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut BTreeSet<VarId>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(v) => {
                vars.insert(*v);
            }
            Expr::Sum(terms) => terms.iter().for_each(|t| t.collect_vars(vars)),
            Expr::Mul(a, b) => {
                a.collect_vars(vars);
                b.collect_vars(vars);
            }
            Expr::Scale(_, e)
            | Expr::PowI(e, _)
            | Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::Sqrt(e) => e.collect_vars(vars),
        }
    }

    /// Range of the expression over a box.
    pub fn interval(&self, lower: &[f64], upper: &[f64]) -> Result<Interval, RelaxError> {
        relax::interval::evaluate(self, lower, upper)
    }

    /// McCormick relaxation over a box, evaluated at `x`.
    pub fn mccormick(
        &self,
        lower: &[f64],
        upper: &[f64],
        x: &[f64],
    ) -> Result<McCormick, RelaxError> {
        relax::mccormick::relax(self, lower, upper, x)
    }
}

fn constant_only(e: &Expr, f: fn(f64) -> f64) -> Option<LinearExpr> {
    let lin = e.linear_part()?;
    if lin.terms.is_empty() {
        Some(LinearExpr::constant(f(lin.constant)))
    } else {
        None
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(v) => write!(f, "x[{}]", v.0),
            Expr::Sum(terms) => {
                write!(f, "(")?;
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            Expr::Scale(c, e) => write!(f, "{}*{}", c, e),
            Expr::Mul(a, b) => write!(f, "{}*{}", a, b),
            Expr::PowI(e, n) => write!(f, "{}^{}", e, n),
            Expr::Exp(e) => write!(f, "exp({})", e),
            Expr::Ln(e) => write!(f, "ln({})", e),
            Expr::Sqrt(e) => write!(f, "sqrt({})", e),
        }
    }
}

impl From<VarId> for Expr {
    fn from(v: VarId) -> Self {
        Expr::Var(v)
    }
}

impl From<f64> for Expr {
    fn from(c: f64) -> Self {
        Expr::Const(c)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Sum(mut a), Expr::Sum(b)) => {
                a.extend(b);
                Expr::Sum(a)
            }
            (Expr::Sum(mut a), b) => {
                a.push(b);
                Expr::Sum(a)
            }
            (a, b) => Expr::Sum(vec![a, b]),
        }
    }
}

impl Add<f64> for Expr {
    type Output = Expr;

    fn add(self, rhs: f64) -> Expr {
        self + Expr::Const(rhs)
    }
}

impl Add<Expr> for f64 {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Const(self) + rhs
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(-c),
            Expr::Scale(c, e) => Expr::Scale(-c, e),
            e => Expr::Scale(-1.0, Box::new(e)),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Sub<f64> for Expr {
    type Output = Expr;

    fn sub(self, rhs: f64) -> Expr {
        self + Expr::Const(-rhs)
    }
}

impl Sub<Expr> for f64 {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Const(self) + (-rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(c), e) | (e, Expr::Const(c)) => Expr::Scale(c, Box::new(e)),
            (a, b) => Expr::Mul(Box::new(a), Box::new(b)),
        }
    }
}

impl Mul<f64> for Expr {
    type Output = Expr;

    fn mul(self, rhs: f64) -> Expr {
        Expr::Scale(rhs, Box::new(self))
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Scale(self, Box::new(rhs))
    }
}

impl std::iter::Sum for Expr {
    fn sum<I: Iterator<Item = Expr>>(iter: I) -> Expr {
        Expr::Sum(iter.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_and_gradient() {
        let x = VarId(0);
        let y = VarId(1);
        // x^2 * y + exp(y)
        let e = Expr::from(x).powi(2) * Expr::from(y) + Expr::from(y).exp();
        let pt = [3.0, 0.5];
        let expected = 9.0 * 0.5 + 0.5_f64.exp();
        assert!((e.eval(&pt) - expected).abs() < 1e-12);

        let g = e.gradient(&pt);
        assert!((g[&x] - 2.0 * 3.0 * 0.5).abs() < 1e-12);
        assert!((g[&y] - (9.0 + 0.5_f64.exp())).abs() < 1e-12);
    }

    #[test]
    fn test_linear_part() {
        let x = VarId(0);
        let y = VarId(1);
        let e = 2.0 * Expr::from(x) - Expr::from(y) * 3.0 + 4.0;
        let lin = e.linear_part().unwrap();
        assert_eq!(lin.terms[&x], 2.0);
        assert_eq!(lin.terms[&y], -3.0);
        assert_eq!(lin.constant, 4.0);

        assert!(!(Expr::from(x) * Expr::from(y)).is_linear());
        assert!(!Expr::from(x).powi(2).is_linear());
        assert!(Expr::constant(2.0).exp().is_linear());
    }

    #[test]
    fn test_variables() {
        let e = Expr::from(VarId(2)).ln() + Expr::from(VarId(0)).sqrt();
        let vars: Vec<_> = e.variables().into_iter().collect();
        assert_eq!(vars, vec![VarId(0), VarId(2)]);
    }

    #[test]
    fn test_linear_builder() {
        let e = Expr::linear(&[(VarId(0), 1.0), (VarId(1), -2.0)], 5.0);
        assert_eq!(e.eval(&[1.0, 1.0]), 4.0);
    }
}
