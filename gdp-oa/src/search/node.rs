//! Nodes of the master MILP search tree.

const EMPTY_DOMAIN_TOL: f64 = 1e-9;

/// Column bounds imposed by one branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundChange {
    /// Column index.
    pub var: usize,
    /// Lower bound after the branch.
    pub new_lb: f64,
    /// Upper bound after the branch.
    pub new_ub: f64,
}

impl BoundChange {
    /// `x <= floor(value)`, keeping the current lower bound.
    pub fn down_branch(var: usize, old_lb: f64, value: f64) -> Self {
        Self {
            var,
            new_lb: old_lb,
            new_ub: value.floor(),
        }
    }

    /// `x >= ceil(value)`, keeping the current upper bound.
    pub fn up_branch(var: usize, old_ub: f64, value: f64) -> Self {
        Self {
            var,
            new_lb: value.ceil(),
            new_ub: old_ub,
        }
    }

    /// The branch leaves the column without a feasible value.
    pub fn is_infeasible(&self) -> bool {
        self.new_lb > self.new_ub + EMPTY_DOMAIN_TOL
    }
}

/// Open subtree of the master MILP.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Creation order; the root is 0.
    pub id: u64,
    /// Branches taken from the root.
    pub depth: usize,
    /// Every branch on the path, root side first. Later entries win.
    pub bound_changes: Vec<BoundChange>,
    /// Relaxation value inherited from the parent until the node is solved.
    pub dual_bound: f64,
}

impl SearchNode {
    /// The unbranched problem.
    pub fn root() -> Self {
        Self {
            id: 0,
            depth: 0,
            bound_changes: Vec::new(),
            dual_bound: f64::NEG_INFINITY,
        }
    }

    /// Child that adds `branch` to this node's path.
    pub fn child(&self, id: u64, branch: BoundChange) -> Self {
        let bound_changes = self
            .bound_changes
            .iter()
            .copied()
            .chain(std::iter::once(branch))
            .collect();
        Self {
            id,
            depth: self.depth + 1,
            bound_changes,
            dual_bound: self.dual_bound,
        }
    }

    /// Overwrite `lower`/`upper` with the path's branches.
    pub fn apply_bounds(&self, lower: &mut [f64], upper: &mut [f64]) {
        for change in &self.bound_changes {
            lower[change.var] = change.new_lb;
            upper[change.var] = change.new_ub;
        }
    }

    /// Nothing in this subtree can beat `incumbent_obj` by more than `tol`.
    pub fn can_prune(&self, incumbent_obj: f64, tol: f64) -> bool {
        self.dual_bound >= incumbent_obj - tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_bounds_apply_in_order() {
        // Branch twice on the same indicator column: the deeper branch wins.
        let first = SearchNode::root().child(1, BoundChange::up_branch(3, 1.0, 0.4));
        let second = first.child(2, BoundChange::down_branch(3, 1.0, 1.0));
        assert_eq!(second.depth, 2);

        let mut lower = vec![0.0; 4];
        let mut upper = vec![1.0; 4];
        first.apply_bounds(&mut lower, &mut upper);
        assert_eq!((lower[3], upper[3]), (1.0, 1.0));

        let (mut lower, mut upper) = (vec![0.0; 4], vec![1.0; 4]);
        second.apply_bounds(&mut lower, &mut upper);
        assert_eq!((lower[3], upper[3]), (1.0, 1.0));
        assert_eq!(second.bound_changes.len(), 2);
    }

    #[test]
    fn test_empty_domain_detection() {
        assert!(!BoundChange::down_branch(0, 0.0, 0.6).is_infeasible());
        assert!(!BoundChange::up_branch(0, 1.0, 0.6).is_infeasible());
        // lower bound already at 1 and the down branch asks for x <= 0
        assert!(BoundChange::down_branch(0, 1.0, 0.6).is_infeasible());
    }

    #[test]
    fn test_child_inherits_bound_until_solved() {
        let mut root = SearchNode::root();
        root.dual_bound = 7.5;
        let child = root.child(4, BoundChange::up_branch(0, 1.0, 0.5));
        assert_eq!(child.dual_bound, 7.5);
        assert!(child.can_prune(7.5, 1e-9));
        assert!(!child.can_prune(9.0, 1e-9));
    }
}
