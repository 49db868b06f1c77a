//! Natural interval extension.

use std::fmt;

use super::RelaxError;
use crate::expr::Expr;

/// Closed interval `[lo, hi]`; endpoints may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Lower endpoint.
    pub lo: f64,
    /// Upper endpoint.
    pub hi: f64,
}

impl Interval {
    /// Interval from endpoints.
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Degenerate interval.
    pub fn point(v: f64) -> Self {
        Self { lo: v, hi: v }
    }

    /// True if both endpoints are finite.
    pub fn is_bounded(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite()
    }

    /// Width `hi - lo`.
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// True if `v` lies in the interval (with tolerance).
    pub fn contains(&self, v: f64, tol: f64) -> bool {
        v >= self.lo - tol && v <= self.hi + tol
    }

    /// Interval sum.
    pub fn add(self, other: Interval) -> Interval {
        Interval::new(self.lo + other.lo, self.hi + other.hi)
    }

    /// Multiplication by a constant.
    pub fn scale(self, c: f64) -> Interval {
        if c == 0.0 {
            Interval::point(0.0)
        } else if c > 0.0 {
            Interval::new(c * self.lo, c * self.hi)
        } else {
            Interval::new(c * self.hi, c * self.lo)
        }
    }

    /// Interval product, treating `0 * inf` as 0.
    pub fn mul(self, other: Interval) -> Interval {
        let products = [
            ext_mul(self.lo, other.lo),
            ext_mul(self.lo, other.hi),
            ext_mul(self.hi, other.lo),
            ext_mul(self.hi, other.hi),
        ];
        let lo = products.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = products.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Interval::new(lo, hi)
    }

    /// Integer power.
    pub fn powi(self, n: u32) -> Interval {
        if n == 0 {
            return Interval::point(1.0);
        }
        let p = |v: f64| v.powi(n as i32);
        if n % 2 == 1 || self.lo >= 0.0 {
            Interval::new(p(self.lo), p(self.hi))
        } else if self.hi <= 0.0 {
            Interval::new(p(self.hi), p(self.lo))
        } else {
            Interval::new(0.0, p(self.lo).max(p(self.hi)))
        }
    }

    /// Exponential.
    pub fn exp(self) -> Interval {
        Interval::new(self.lo.exp(), self.hi.exp())
    }

    /// Natural logarithm; requires a strictly positive range.
    pub fn ln(self) -> Result<Interval, RelaxError> {
        if self.lo <= 0.0 {
            return Err(RelaxError::Domain {
                op: "ln",
                lower: self.lo,
                upper: self.hi,
            });
        }
        Ok(Interval::new(self.lo.ln(), self.hi.ln()))
    }

    /// Square root; requires a non-negative range.
    pub fn sqrt(self) -> Result<Interval, RelaxError> {
        if self.lo < 0.0 {
            return Err(RelaxError::Domain {
                op: "sqrt",
                lower: self.lo,
                upper: self.hi,
            });
        }
        Ok(Interval::new(self.lo.sqrt(), self.hi.sqrt()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

fn ext_mul(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        0.0
    } else {
        a * b
    }
}

/// Range of `expr` over the box `[lower, upper]`.
pub fn evaluate(expr: &Expr, lower: &[f64], upper: &[f64]) -> Result<Interval, RelaxError> {
    Ok(match expr {
        Expr::Const(c) => Interval::point(*c),
        Expr::Var(v) => Interval::new(lower[v.0], upper[v.0]),
        Expr::Sum(terms) => {
            let mut acc = Interval::point(0.0);
            for t in terms {
                acc = acc.add(evaluate(t, lower, upper)?);
            }
            acc
        }
        Expr::Scale(c, e) => evaluate(e, lower, upper)?.scale(*c),
        Expr::Mul(a, b) => evaluate(a, lower, upper)?.mul(evaluate(b, lower, upper)?),
        Expr::PowI(e, n) => evaluate(e, lower, upper)?.powi(*n),
        Expr::Exp(e) => evaluate(e, lower, upper)?.exp(),
        Expr::Ln(e) => evaluate(e, lower, upper)?.ln()?,
        Expr::Sqrt(e) => evaluate(e, lower, upper)?.sqrt()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VarId;

    #[test]
    fn test_mul_signs() {
        let a = Interval::new(-1.0, 2.0);
        let b = Interval::new(-3.0, 4.0);
        assert_eq!(a.mul(b), Interval::new(-6.0, 8.0));
    }

    #[test]
    fn test_mul_zero_times_infinite() {
        let a = Interval::new(0.0, 1.0);
        let b = Interval::new(0.0, f64::INFINITY);
        let p = a.mul(b);
        assert_eq!(p.lo, 0.0);
        assert_eq!(p.hi, f64::INFINITY);
    }

    #[test]
    fn test_even_power_straddling_zero() {
        let a = Interval::new(-2.0, 3.0);
        assert_eq!(a.powi(2), Interval::new(0.0, 9.0));
        assert_eq!(a.powi(3), Interval::new(-8.0, 27.0));
    }

    #[test]
    fn test_domain_errors() {
        assert!(Interval::new(-1.0, 1.0).ln().is_err());
        assert!(Interval::new(-1.0, 1.0).sqrt().is_err());
        assert!(Interval::new(0.0, 4.0).sqrt().is_ok());
    }

    #[test]
    fn test_evaluate_expression() {
        let x = VarId(0);
        let e = (Expr::from(x) - 4.0).powi(2);
        let r = evaluate(&e, &[0.0], &[8.0]).unwrap();
        assert_eq!(r, Interval::new(0.0, 16.0));
    }
}
