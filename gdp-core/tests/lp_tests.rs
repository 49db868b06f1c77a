//! End-to-end tests for the LP engine.

use gdp_core::{solve_lp, LinearProgram, LinearRow, LpSettings, LpStatus};

#[test]
fn test_transportation_lp() {
    // Two plants (supply 30, 25), three markets (demand 15, 20, 15).
    // x[p][m] at column 3p + m.
    let cost = vec![4.0, 6.0, 9.0, 5.0, 3.0, 7.0];
    let mut rows = Vec::new();
    rows.push(LinearRow::le(vec![(0, 1.0), (1, 1.0), (2, 1.0)], 30.0));
    rows.push(LinearRow::le(vec![(3, 1.0), (4, 1.0), (5, 1.0)], 25.0));
    for m in 0..3 {
        let demand = [15.0, 20.0, 15.0][m];
        rows.push(LinearRow::ge(vec![(m, 1.0), (3 + m, 1.0)], demand));
    }

    let lp = LinearProgram::from_rows(cost, &rows, vec![0.0; 6], vec![f64::INFINITY; 6]);
    let result = solve_lp(&lp, &LpSettings::default()).expect("LP solve failed");

    println!("\n=== Transportation LP ===");
    println!("Status: {:?}", result.status);
    println!("x = {:?}", result.x);
    println!("obj = {}", result.obj_val);

    assert_eq!(result.status, LpStatus::Optimal);
    // Market 1 from plant 0, market 2 from plant 1, market 3 split by cost.
    // Plant 1 ships 20 to market 2, leaving 5 at cost 7 vs 9 from plant 0.
    let expected = 15.0 * 4.0 + 20.0 * 3.0 + 5.0 * 7.0 + 10.0 * 9.0;
    assert!((result.obj_val - expected).abs() < 1e-6, "obj {}", result.obj_val);
    assert!(lp.is_feasible(&result.x, 1e-7));
}

#[test]
fn test_degenerate_lp_terminates() {
    // Classic degenerate vertex at the origin.
    let rows = vec![
        LinearRow::le(vec![(0, 0.5), (1, -5.5), (2, -2.5), (3, 9.0)], 0.0),
        LinearRow::le(vec![(0, 0.5), (1, -1.5), (2, -0.5), (3, 1.0)], 0.0),
        LinearRow::le(vec![(0, 1.0)], 1.0),
    ];
    let lp = LinearProgram::from_rows(
        vec![-10.0, 57.0, 9.0, 24.0],
        &rows,
        vec![0.0; 4],
        vec![f64::INFINITY; 4],
    );
    let result = solve_lp(&lp, &LpSettings::default()).expect("LP solve failed");
    assert_eq!(result.status, LpStatus::Optimal);
    assert!((result.obj_val + 1.0).abs() < 1e-6, "obj {}", result.obj_val);
}

#[test]
fn test_objective_offset_and_ranges() {
    // min x - y + 10  s.t. 1 <= x + y <= 3, x in [0, 2], y in [-1, 1]
    let rows = vec![LinearRow {
        terms: vec![(0, 1.0), (1, 1.0)],
        lower: 1.0,
        upper: 3.0,
    }];
    let mut lp = LinearProgram::from_rows(vec![1.0, -1.0], &rows, vec![0.0, -1.0], vec![2.0, 1.0]);
    lp.objective_offset = 10.0;

    let result = solve_lp(&lp, &LpSettings::default()).expect("LP solve failed");
    assert_eq!(result.status, LpStatus::Optimal);
    assert!((result.x[0] - 0.0).abs() < 1e-7);
    assert!((result.x[1] - 1.0).abs() < 1e-7);
    assert!((result.obj_val - 9.0).abs() < 1e-7);
}

#[test]
fn test_iteration_limit() {
    let rows = vec![
        LinearRow::le(vec![(0, 1.0), (1, 1.0)], 4.0),
        LinearRow::le(vec![(0, 1.0), (1, 3.0)], 6.0),
    ];
    let lp = LinearProgram::from_rows(vec![-3.0, -2.0], &rows, vec![0.0; 2], vec![3.0, 10.0]);
    let settings = LpSettings {
        max_iter: 1,
        ..Default::default()
    };
    let result = solve_lp(&lp, &settings).expect("LP solve failed");
    assert_eq!(result.status, LpStatus::MaxIters);
    assert!(result.x.is_empty());
}
