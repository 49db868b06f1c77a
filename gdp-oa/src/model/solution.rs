//! Solve results and incumbent tracking.

use std::fmt;

use gdp_core::Sense;

use crate::settings::Strategy;
use crate::timing::Timing;

/// Why the solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCondition {
    /// Gap closed within tolerance (or search space exhausted with an incumbent).
    Converged,
    /// No feasible solution exists.
    Infeasible,
    /// Master iteration limit reached.
    IterationLimit,
    /// Wall-clock limit reached.
    TimeLimit,
    /// An oracle failed and the solve was aborted.
    Error,
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationCondition::Converged => "optimal",
            TerminationCondition::Infeasible => "infeasible",
            TerminationCondition::IterationLimit => "maxIterations",
            TerminationCondition::TimeLimit => "maxTimeLimit",
            TerminationCondition::Error => "error",
        };
        f.write_str(s)
    }
}

/// Number of cuts added to the master, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CutCounts {
    /// Outer-approximation cuts (constraints and objective).
    pub outer_approximation: usize,
    /// Affine McCormick cuts.
    pub affine: usize,
    /// No-good cuts.
    pub no_good: usize,
}

impl CutCounts {
    /// Total cuts of all kinds.
    pub fn total(&self) -> usize {
        self.outer_approximation + self.affine + self.no_good
    }
}

/// Outcome of a GDPopt solve.
#[derive(Debug, Clone)]
pub struct SolveResults {
    /// Algorithm that produced the result.
    pub strategy: Strategy,
    /// Objective sense of the model.
    pub sense: Sense,
    /// Termination condition.
    pub termination: TerminationCondition,
    /// Best feasible objective value (+inf / -inf if none).
    pub primal_bound: f64,
    /// Best relaxation bound.
    pub dual_bound: f64,
    /// Master iterations performed.
    pub iterations: usize,
    /// Master MILP solves (initialization included).
    pub mip_solves: usize,
    /// Subproblem NLP solves (initialization included).
    pub nlp_solves: usize,
    /// Cuts added to the master.
    pub cuts: CutCounts,
    /// Disjunctive bound tightening passes.
    pub tightening_passes: usize,
    /// Time spent per phase.
    pub timing: Timing,
    /// Variable values of the incumbent, indexed by variable id.
    pub incumbent: Option<Vec<f64>>,
    /// (primal, dual) after every bound update.
    pub bound_history: Vec<(f64, f64)>,
    /// Failure message, if the solve ended with an error.
    pub message: Option<String>,
}

impl SolveResults {
    /// Empty results for a solve that has not started.
    pub fn new(strategy: Strategy, sense: Sense) -> Self {
        Self {
            strategy,
            sense,
            termination: TerminationCondition::Error,
            primal_bound: sense.infeasible_value(),
            dual_bound: sense.unbounded_value(),
            iterations: 0,
            mip_solves: 0,
            nlp_solves: 0,
            cuts: CutCounts::default(),
            tightening_passes: 0,
            timing: Timing::new(),
            incumbent: None,
            bound_history: Vec::new(),
            message: None,
        }
    }

    /// Absolute gap `|primal - dual|` (inf if either bound is infinite).
    pub fn absolute_gap(&self) -> f64 {
        absolute_gap(self.primal_bound, self.dual_bound)
    }

    /// Relative gap `|primal - dual| / |primal|`.
    pub fn relative_gap(&self) -> f64 {
        relative_gap(self.primal_bound, self.dual_bound)
    }
}

/// Absolute gap between two bounds.
pub fn absolute_gap(primal: f64, dual: f64) -> f64 {
    if primal.is_infinite() || dual.is_infinite() {
        return f64::INFINITY;
    }
    (primal - dual).abs()
}

/// Relative gap between two bounds.
pub fn relative_gap(primal: f64, dual: f64) -> f64 {
    if primal.is_infinite() || dual.is_infinite() {
        return f64::INFINITY;
    }
    let denom = primal.abs().max(1e-10);
    (primal - dual).abs() / denom
}

/// Tracks the best known subproblem solution (incumbent).
#[derive(Debug, Clone)]
pub struct IncumbentTracker {
    /// Current best solution (if any).
    pub solution: Option<Vec<f64>>,

    /// Objective value of the incumbent.
    pub obj_val: f64,

    /// Number of times the incumbent was replaced.
    pub update_count: u64,
}

impl IncumbentTracker {
    /// Create an empty tracker for the given sense.
    pub fn new(sense: Sense) -> Self {
        Self {
            solution: None,
            obj_val: sense.infeasible_value(),
            update_count: 0,
        }
    }

    /// Check if we have an incumbent.
    pub fn has_incumbent(&self) -> bool {
        self.solution.is_some()
    }

    /// Replace the incumbent. Callers decide whether the point improves.
    pub fn replace(&mut self, x: &[f64], obj: f64) {
        self.solution = Some(x.to_vec());
        self.obj_val = obj;
        self.update_count += 1;
    }
}
