//! Branch-and-bound tree controller and the built-in MILP oracle.

use std::time::Instant;

use gdp_core::{solve_lp, LinearProgram, LpStatus, Sense, VarType};

use super::{select_most_fractional, BranchDecision, NodeQueue, SearchNode};
use crate::error::GdpResult;
use crate::master::{MipOracle, MipSolveResult, MipStatus};
use crate::model::{absolute_gap, relative_gap, IncumbentTracker};
use crate::settings::MilpSettings;

/// Bookkeeping for one master (or inner subproblem) MILP search.
///
/// Always minimizes; the caller flips the objective for maximization.
pub struct BranchAndBound {
    queue: NodeQueue,
    /// Best integer-feasible point of this search.
    pub incumbent: IncumbentTracker,
    next_node_id: u64,
    nodes_explored: u64,
    nodes_pruned: u64,
    // Nodes whose LP hit a pivot or time limit keep their parent bound here.
    unresolved_bound: f64,
    nodes_unresolved: u64,
    start_time: Option<Instant>,
    settings: MilpSettings,
}

impl BranchAndBound {
    /// Empty search using `settings`.
    pub fn new(settings: MilpSettings) -> Self {
        Self {
            queue: NodeQueue::new(settings.node_selection),
            incumbent: IncumbentTracker::new(Sense::Minimize),
            next_node_id: 1,
            nodes_explored: 0,
            nodes_pruned: 0,
            unresolved_bound: f64::INFINITY,
            nodes_unresolved: 0,
            start_time: None,
            settings,
        }
    }

    /// Start the clock and open the root with the relaxation value `root_bound`.
    pub fn initialize(&mut self, root_bound: f64) {
        self.start_time = Some(Instant::now());

        let mut root = SearchNode::root();
        root.dual_bound = root_bound;
        self.queue.push(root);
    }

    /// Pop the next open node.
    pub fn next_node(&mut self) -> Option<SearchNode> {
        self.queue.pop()
    }

    /// Count a solved node.
    pub fn node_explored(&mut self) {
        self.nodes_explored += 1;
    }

    /// Count a node cut off by bound or infeasibility.
    pub fn node_pruned(&mut self) {
        self.nodes_pruned += 1;
    }

    /// Count a node whose LP stopped early; `bound` stays in the global bound.
    pub fn node_unresolved(&mut self, bound: f64) {
        self.nodes_unresolved += 1;
        self.unresolved_bound = self.unresolved_bound.min(bound);
    }

    /// Split `parent` on `decision` into its (down, up) children.
    pub fn branch(
        &mut self,
        parent: &SearchNode,
        decision: BranchDecision,
    ) -> (SearchNode, SearchNode) {
        let down_id = self.next_node_id;
        let up_id = self.next_node_id + 1;
        self.next_node_id += 2;

        (
            parent.child(down_id, decision.down_branch),
            parent.child(up_id, decision.up_branch),
        )
    }

    /// Open `node`.
    pub fn enqueue(&mut self, node: SearchNode) {
        self.queue.push(node);
    }

    /// Offer an integer-feasible point. Open nodes it dominates are dropped.
    ///
    /// Returns false if `obj` does not beat the incumbent.
    pub fn update_incumbent(&mut self, x: &[f64], obj: f64) -> bool {
        let improved = !self.incumbent.has_incumbent() || obj < self.incumbent.obj_val;
        if !improved {
            return false;
        }
        self.incumbent.replace(x, obj);

        let pruned = self.queue.prune_by_bound(obj, self.settings.gap_abs_tol);
        self.nodes_pruned += pruned as u64;

        if self.settings.verbose {
            log::info!("New incumbent: obj={:.6e}, pruned {} nodes", obj, pruned);
        }
        true
    }

    /// Best dual bound over open and unresolved nodes.
    pub fn best_bound(&self) -> f64 {
        self.queue.best_bound().min(self.unresolved_bound)
    }

    /// True if the incumbent is within the gap tolerances of `bound`.
    fn gap_closed(&self, bound: f64) -> bool {
        if !self.incumbent.has_incumbent() {
            return false;
        }
        let inc = self.incumbent.obj_val;
        bound >= inc
            || absolute_gap(inc, bound) <= self.settings.gap_abs_tol
            || relative_gap(inc, bound) <= self.settings.gap_tol
    }

    /// Relative gap between the incumbent and [`Self::best_bound`].
    pub fn gap(&self) -> f64 {
        relative_gap(self.incumbent.obj_val, self.best_bound())
    }

    /// Milliseconds since [`Self::initialize`].
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Milliseconds left before the time limit, if there is one.
    pub fn remaining_ms(&self) -> Option<u64> {
        self.settings
            .time_limit_ms
            .map(|limit| limit.saturating_sub(self.elapsed_ms()))
    }

    /// The time limit has run out.
    pub fn time_limit_exceeded(&self) -> bool {
        self.settings
            .time_limit_ms
            .is_some_and(|limit| self.elapsed_ms() >= limit)
    }

    /// Status to stop with, or `None` while the search should go on.
    ///
    /// An empty queue without an incumbent is only a proof of infeasibility
    /// when no node was left unresolved.
    pub fn check_termination(&self) -> Option<MipStatus> {
        if self.queue.is_empty() {
            return Some(if self.incumbent.has_incumbent() {
                MipStatus::Optimal
            } else if self.nodes_unresolved > 0 {
                MipStatus::Error
            } else {
                MipStatus::Infeasible
            });
        }

        if self.gap_closed(self.best_bound()) {
            return Some(MipStatus::Optimal);
        }

        if self.time_limit_exceeded() {
            return Some(MipStatus::TimeLimit);
        }

        if self.nodes_explored >= self.settings.max_nodes {
            return Some(MipStatus::NodeLimit);
        }

        None
    }

    /// Oracle result for a search stopped with `status`.
    pub fn finalize(&self, status: MipStatus) -> MipSolveResult {
        let bound = match status {
            MipStatus::Infeasible => f64::INFINITY,
            _ if self.incumbent.has_incumbent() => self.best_bound().min(self.incumbent.obj_val),
            _ => self.best_bound(),
        };
        MipSolveResult {
            status,
            x: self.incumbent.solution.clone().unwrap_or_default(),
            obj_val: self.incumbent.obj_val,
            bound,
            nodes: self.nodes_explored,
        }
    }

    /// Progress line every `log_freq` nodes when verbose.
    pub fn log_progress(&self) {
        if !self.settings.verbose {
            return;
        }

        if self.nodes_explored % self.settings.log_freq.max(1) != 0 {
            return;
        }

        log::info!(
            "Nodes: {} ({} open) | Bound: {:.6e} | Incumbent: {:.6e} | Gap: {:.2}% | Time: {:.1}s",
            self.nodes_explored,
            self.queue.len(),
            self.best_bound(),
            self.incumbent.obj_val,
            self.gap() * 100.0,
            self.elapsed_ms() as f64 / 1000.0,
        );
    }

    /// Counters of the search so far.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes_explored: self.nodes_explored,
            nodes_pruned: self.nodes_pruned,
            nodes_open: self.queue.len() as u64,
            nodes_unresolved: self.nodes_unresolved,
            incumbent_updates: self.incumbent.update_count,
            best_bound: self.best_bound(),
            incumbent_obj: self.incumbent.obj_val,
            elapsed_ms: self.elapsed_ms(),
        }
    }
}

/// Counters of one MILP search.
#[derive(Debug, Clone)]
pub struct TreeStats {
    /// Nodes whose LP was solved.
    pub nodes_explored: u64,
    /// Nodes dropped by bound or infeasibility.
    pub nodes_pruned: u64,
    /// Nodes still in the queue.
    pub nodes_open: u64,
    /// Nodes whose LP stopped on a limit.
    pub nodes_unresolved: u64,
    /// Times the incumbent improved.
    pub incumbent_updates: u64,
    /// Lowest bound over open and unresolved nodes.
    pub best_bound: f64,
    /// Incumbent objective (`+inf` without one).
    pub incumbent_obj: f64,
    /// Wall time of the search.
    pub elapsed_ms: u64,
}

/// LP-based branch-and-bound over [`solve_lp`].
///
/// Used as the default master oracle and for subproblems that keep unfixed
/// integer variables.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBoundMilp {
    settings: MilpSettings,
    last_stats: Option<TreeStats>,
}

impl BranchAndBoundMilp {
    /// Create an oracle with the given settings.
    pub fn new(settings: MilpSettings) -> Self {
        Self {
            settings,
            last_stats: None,
        }
    }

    /// Tree statistics of the most recent solve.
    pub fn last_stats(&self) -> Option<&TreeStats> {
        self.last_stats.as_ref()
    }

    fn run(
        &mut self,
        lp: &LinearProgram,
        time_limit_ms: Option<u64>,
    ) -> GdpResult<MipSolveResult> {
        lp.validate()?;
        let n = lp.num_cols();
        let kinds = lp
            .integrality
            .clone()
            .unwrap_or_else(|| vec![VarType::Continuous; n]);
        let int_tol = self.settings.int_feas_tol;

        let mut root_lower = lp.col_lower.clone();
        let mut root_upper = lp.col_upper.clone();
        for j in (0..n).filter(|&j| kinds[j].is_discrete()) {
            root_lower[j] = (root_lower[j] - int_tol).ceil();
            root_upper[j] = (root_upper[j] + int_tol).floor();
            if root_lower[j] > root_upper[j] {
                log::debug!("Column {} has no integer in its domain", j);
                return Ok(MipSolveResult::no_solution(MipStatus::Infeasible));
            }
        }

        let mut settings = self.settings.clone();
        settings.time_limit_ms = match (settings.time_limit_ms, time_limit_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut work = lp.clone();
        work.integrality = None;
        let mut lp_settings = settings.lp_settings.clone();
        let mut tree = BranchAndBound::new(settings);
        tree.initialize(f64::NEG_INFINITY);

        let status = loop {
            if let Some(status) = tree.check_termination() {
                break status;
            }
            let Some(node) = tree.next_node() else {
                continue;
            };
            tree.node_explored();

            if tree.incumbent.has_incumbent()
                && node.can_prune(tree.incumbent.obj_val, self.settings.gap_abs_tol)
            {
                tree.node_pruned();
                continue;
            }

            work.col_lower.copy_from_slice(&root_lower);
            work.col_upper.copy_from_slice(&root_upper);
            node.apply_bounds(&mut work.col_lower, &mut work.col_upper);
            if node.bound_changes.iter().any(|bc| bc.is_infeasible()) {
                tree.node_pruned();
                continue;
            }

            lp_settings.time_limit_ms = tree.remaining_ms();
            let relaxation = solve_lp(&work, &lp_settings)?;
            match relaxation.status {
                LpStatus::Optimal => {}
                LpStatus::Infeasible => {
                    tree.node_pruned();
                    continue;
                }
                LpStatus::Unbounded => {
                    log::debug!("Node {} relaxation unbounded", node.id);
                    let mut result = MipSolveResult::no_solution(MipStatus::Unbounded);
                    result.nodes = tree.stats().nodes_explored;
                    self.last_stats = Some(tree.stats());
                    return Ok(result);
                }
                LpStatus::MaxIters | LpStatus::TimeLimit => {
                    log::warn!(
                        "Node {} relaxation stopped early ({}); keeping its parent bound",
                        node.id,
                        relaxation.status
                    );
                    tree.node_unresolved(node.dual_bound);
                    continue;
                }
            }

            let bound = relaxation.obj_val;
            if tree.incumbent.has_incumbent()
                && bound >= tree.incumbent.obj_val - self.settings.gap_abs_tol
            {
                tree.node_pruned();
                continue;
            }

            let decision = select_most_fractional(
                &relaxation.x,
                &kinds,
                &work.col_lower,
                &work.col_upper,
                int_tol,
            );
            match decision {
                None => {
                    let mut x = relaxation.x;
                    for j in (0..n).filter(|&j| kinds[j].is_discrete()) {
                        x[j] = x[j].round();
                    }
                    let obj = lp.objective_value(&x);
                    tree.update_incumbent(&x, obj);
                }
                Some(decision) => {
                    let mut node = node;
                    node.dual_bound = bound;
                    let (down, up) = tree.branch(&node, decision);
                    tree.enqueue(down);
                    tree.enqueue(up);
                }
            }

            tree.log_progress();
        };

        let stats = tree.stats();
        log::debug!(
            "Branch-and-bound finished: {:?} after {} nodes ({} pruned, {} unresolved)",
            status,
            stats.nodes_explored,
            stats.nodes_pruned,
            stats.nodes_unresolved
        );
        self.last_stats = Some(stats);
        Ok(tree.finalize(status))
    }
}

impl MipOracle for BranchAndBoundMilp {
    fn name(&self) -> &str {
        "bnb"
    }

    fn solve(
        &mut self,
        lp: &LinearProgram,
        time_limit_ms: Option<u64>,
    ) -> GdpResult<MipSolveResult> {
        self.run(lp, time_limit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::LinearRow;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }

    #[test]
    fn test_root_only_search_without_point_is_infeasible() {
        let mut tree = BranchAndBound::new(MilpSettings::default());
        tree.initialize(0.0);

        assert!(tree.next_node().is_some());
        assert!(tree.next_node().is_none());
        assert_eq!(tree.check_termination(), Some(MipStatus::Infeasible));
    }

    #[test]
    fn test_incumbent_only_improves() {
        let mut tree = BranchAndBound::new(MilpSettings::default());
        tree.initialize(0.0);

        assert!(tree.update_incumbent(&[1.0; 3], 100.0));
        assert!(!tree.update_incumbent(&[2.0; 3], 150.0));
        assert_eq!(tree.incumbent.obj_val, 100.0);
        assert!(tree.update_incumbent(&[0.5; 3], 50.0));
        assert_eq!(tree.incumbent.obj_val, 50.0);
        assert_eq!(tree.stats().incumbent_updates, 2);
    }

    #[test]
    fn test_integer_program() {
        // min -5x - 4y  s.t.  6x + 4y <= 24,  x + 2y <= 6,  x, y >= 0 integer
        let rows = vec![
            LinearRow::le(vec![(0, 6.0), (1, 4.0)], 24.0),
            LinearRow::le(vec![(0, 1.0), (1, 2.0)], 6.0),
        ];
        let lp = LinearProgram::from_rows(
            vec![-5.0, -4.0],
            &rows,
            vec![0.0; 2],
            vec![f64::INFINITY; 2],
        )
        .with_integrality(vec![VarType::Integer; 2]);

        let mut oracle = BranchAndBoundMilp::default();
        let result = oracle.solve(&lp, None).unwrap();
        assert_eq!(result.status, MipStatus::Optimal);
        assert_close(result.obj_val, -20.0);
        assert_close(result.x[0], 4.0);
        assert_close(result.x[1], 0.0);
        assert!(result.bound <= result.obj_val + 1e-9);
        assert!(oracle.last_stats().unwrap().nodes_explored >= 1);
    }

    #[test]
    fn test_integer_infeasible() {
        // 0.5 <= z <= 0.7 admits no binary value
        let rows = vec![LinearRow {
            terms: vec![(0, 1.0)],
            lower: 0.5,
            upper: 0.7,
        }];
        let lp = LinearProgram::from_rows(vec![1.0], &rows, vec![0.0], vec![1.0])
            .with_integrality(vec![VarType::Binary]);

        let result = BranchAndBoundMilp::default().solve(&lp, None).unwrap();
        assert_eq!(result.status, MipStatus::Infeasible);
        assert!(!result.has_solution());
    }

    #[test]
    fn test_unbounded_relaxation() {
        let lp = LinearProgram::from_rows(
            vec![-1.0, 0.0],
            &[],
            vec![0.0; 2],
            vec![f64::INFINITY, 1.0],
        )
        .with_integrality(vec![VarType::Continuous, VarType::Binary]);

        let result = BranchAndBoundMilp::default().solve(&lp, None).unwrap();
        assert_eq!(result.status, MipStatus::Unbounded);
    }

    #[test]
    fn test_node_limit_keeps_best_point() {
        // every level of this knapsack has a fractional relaxation
        let rows = vec![LinearRow::le(
            vec![(0, 3.0), (1, 4.0), (2, 5.0), (3, 6.0)],
            10.0,
        )];
        let lp = LinearProgram::from_rows(
            vec![-4.0, -5.0, -6.0, -7.0],
            &rows,
            vec![0.0; 4],
            vec![1.0; 4],
        )
        .with_integrality(vec![VarType::Binary; 4]);

        let mut settings = MilpSettings::default();
        settings.max_nodes = 1;
        let result = BranchAndBoundMilp::new(settings).solve(&lp, None).unwrap();
        assert_eq!(result.status, MipStatus::NodeLimit);
        assert!(result.bound.is_finite());

        let full = BranchAndBoundMilp::default().solve(&lp, None).unwrap();
        assert_eq!(full.status, MipStatus::Optimal);
        // {x1, x3}: weight 10, value 12
        assert_close(full.obj_val, -12.0);
        assert_close(full.x[1] + full.x[3], 2.0);
    }
}
