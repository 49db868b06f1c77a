//! End-to-end tests for the GLOA strategy and disjunctive bound tightening.

use gdp_core::{DisjunctId, Expr, GdpModel, Relation, VarId};
use gdp_oa::{solve, GdpSettings, Phase, Strategy, TerminationCondition};

/// x in [0, 8]; low: x^2 <= 4; high: x >= 5, x^2 <= 36; min (x - 4)^2.
///
/// Optimum 1 at x = 5 in `high`; `low` gives 4 at x = 2.
fn curved_units() -> (GdpModel, VarId, DisjunctId) {
    let mut m = GdpModel::new("curved_units");
    let x = m.add_continuous("x", Some(0.0), Some(8.0));
    let low = m.add_disjunct("low");
    m.add_disjunct_constraint(low, "sq_low", Expr::from(x).powi(2), Relation::Le(4.0));
    let high = m.add_disjunct("high");
    m.add_disjunct_constraint(high, "x_high", Expr::from(x), Relation::Ge(5.0));
    m.add_disjunct_constraint(high, "sq_high", Expr::from(x).powi(2), Relation::Le(36.0));
    m.add_disjunction("unit", &[low, high], true);
    m.minimize((Expr::from(x) - 4.0).powi(2));
    (m, x, high)
}

fn gloa() -> GdpSettings {
    GdpSettings::with_strategy(Strategy::Gloa)
}

#[test]
fn test_gloa_converges() {
    let (mut m, x, high) = curved_units();
    let results = solve(&mut m, gloa()).unwrap();

    println!("\n=== GLOA ===");
    println!("Termination: {}", results.termination);
    println!("Bounds: {} / {}", results.primal_bound, results.dual_bound);
    println!("Cuts: {:?}", results.cuts);

    assert_eq!(results.termination, TerminationCondition::Converged);
    assert!((results.primal_bound - 1.0).abs() < 1e-5);
    assert!(results.dual_bound <= results.primal_bound + 1e-6);
    assert!((m.var(x).value.unwrap() - 5.0).abs() < 1e-4);
    assert!((m.var(m.disjunct(high).indicator).value.unwrap() - 1.0).abs() < 1e-6);
    assert!(results.cuts.affine > 0);
    assert_eq!(results.cuts.outer_approximation, 0);
}

#[test]
fn test_loa_on_same_model_uses_oa_cuts() {
    let (mut m, _, _) = curved_units();
    let results = solve(&mut m, GdpSettings::with_strategy(Strategy::Loa)).unwrap();
    assert_eq!(results.termination, TerminationCondition::Converged);
    assert!((results.primal_bound - 1.0).abs() < 1e-5);
    assert!(results.cuts.outer_approximation > 0);
    assert_eq!(results.cuts.affine, 0);
}

#[test]
fn test_gloa_with_disjunctive_bounds() {
    let (mut m, _, _) = curved_units();
    let mut settings = gloa();
    settings.calc_disjunctive_bounds = true;
    let results = solve(&mut m, settings).unwrap();
    assert_eq!(results.termination, TerminationCondition::Converged);
    assert!((results.primal_bound - 1.0).abs() < 1e-5);
    assert!(results.timing.get(Phase::DisjunctiveBounding) > std::time::Duration::ZERO);
    // Once before initialization, then before every round of affine cuts.
    assert!(results.tightening_passes >= 2);

    let (mut m, _, _) = curved_units();
    let mut settings = gloa();
    settings.calc_disjunctive_bounds = true;
    settings.obbt_disjunctive_bounds = true;
    let results = solve(&mut m, settings).unwrap();
    assert_eq!(results.termination, TerminationCondition::Converged);
    assert!((results.primal_bound - 1.0).abs() < 1e-5);
}

#[test]
fn test_gloa_skips_impossible_disjunct() {
    let (mut m, x, _) = curved_units();
    let dead = m.add_disjunct("dead");
    m.add_disjunct_constraint(dead, "far", Expr::from(x), Relation::Ge(20.0));
    m.disjunctions[0].disjuncts.push(dead);

    let mut settings = gloa();
    settings.calc_disjunctive_bounds = true;
    let results = solve(&mut m, settings).unwrap();
    assert_eq!(results.termination, TerminationCondition::Converged);
    assert!((results.primal_bound - 1.0).abs() < 1e-5);
    // Only the two selectable disjuncts reach the subproblem.
    assert_eq!(results.nlp_solves, 2);
    // Both subproblems are feasible, so each refreshes the boxes.
    assert_eq!(results.tightening_passes, 3);
    assert_eq!(m.var(m.disjunct(dead).indicator).value, Some(0.0));
}

#[test]
fn test_loa_tightens_only_once() {
    let (mut m, _, _) = curved_units();
    let mut settings = GdpSettings::with_strategy(Strategy::Loa);
    settings.calc_disjunctive_bounds = true;
    let results = solve(&mut m, settings).unwrap();
    assert_eq!(results.termination, TerminationCondition::Converged);
    assert_eq!(results.tightening_passes, 1);
}
