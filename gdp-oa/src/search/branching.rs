//! Branching variable selection.

use gdp_core::VarType;

use super::BoundChange;

/// A branching decision.
#[derive(Debug, Clone)]
pub struct BranchDecision {
    /// Variable to branch on.
    pub var: usize,

    /// Current (fractional) value.
    pub value: f64,

    /// Bound change for "down" branch (x <= floor(value)).
    pub down_branch: BoundChange,

    /// Bound change for "up" branch (x >= ceil(value)).
    pub up_branch: BoundChange,
}

/// Fractional discrete columns as (column, value, distance to nearest integer).
pub fn fractional_vars(x: &[f64], kinds: &[VarType], tol: f64) -> Vec<(usize, f64, f64)> {
    x.iter()
        .zip(kinds)
        .enumerate()
        .filter(|(_, (_, kind))| kind.is_discrete())
        .filter_map(|(j, (&v, _))| {
            let frac = (v - v.round()).abs();
            (frac > tol).then_some((j, v, frac))
        })
        .collect()
}

/// Select the variable closest to 0.5 fractionality (most fractional).
///
/// Returns None if the point is integer-feasible.
pub fn select_most_fractional(
    x: &[f64],
    kinds: &[VarType],
    lower: &[f64],
    upper: &[f64],
    tol: f64,
) -> Option<BranchDecision> {
    let (var, value, _) = fractional_vars(x, kinds, tol)
        .into_iter()
        .max_by(|(_, _, f1), (_, _, f2)| f1.total_cmp(f2))?;

    Some(BranchDecision {
        var,
        value,
        down_branch: BoundChange::down_branch(var, lower[var], value),
        up_branch: BoundChange::up_branch(var, upper[var], value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [VarType; 3] = [VarType::Binary, VarType::Integer, VarType::Continuous];

    #[test]
    fn test_most_fractional() {
        // Fractionalities: x0 = 0.3, x1 = 0.45; x2 is continuous
        let x = [0.3, 2.55, 0.5];
        let d = select_most_fractional(&x, &KINDS, &[0.0; 3], &[1.0, 5.0, 1.0], 1e-6).unwrap();
        assert_eq!(d.var, 1);
        assert_eq!(d.down_branch.new_ub, 2.0);
        assert_eq!(d.up_branch.new_lb, 3.0);
        assert_eq!(d.up_branch.new_ub, 5.0);
    }

    #[test]
    fn test_integer_feasible() {
        let x = [1.0, 3.0 + 1e-8, 0.5];
        assert!(select_most_fractional(&x, &KINDS, &[0.0; 3], &[1.0, 5.0, 1.0], 1e-6).is_none());
    }
}
