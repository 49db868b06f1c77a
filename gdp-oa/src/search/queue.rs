//! Open-node pool of the branch-and-bound tree.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::SearchNode;
use crate::settings::NodeSelection;

/// Heap entry: the node plus the key it was filed under.
struct OpenNode {
    key: f64,
    node: SearchNode,
}

impl OpenNode {
    fn rank(&self, other: &Self) -> Ordering {
        // Larger key pops first; among equal keys the most recent node wins,
        // which keeps best-bound plunging along the last branch.
        self.key
            .total_cmp(&other.key)
            .then(self.node.id.cmp(&other.node.id))
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.rank(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

/// Open nodes ordered by the selection rule.
pub struct NodeQueue {
    selection: NodeSelection,
    open: BinaryHeap<OpenNode>,
    pushed: u64,
}

impl NodeQueue {
    /// Empty pool using `selection`.
    pub fn new(selection: NodeSelection) -> Self {
        Self {
            selection,
            open: BinaryHeap::new(),
            pushed: 0,
        }
    }

    fn key(&self, node: &SearchNode) -> f64 {
        match self.selection {
            NodeSelection::BestBound => -node.dual_bound,
            NodeSelection::DepthFirst => node.depth as f64,
        }
    }

    /// File a node.
    pub fn push(&mut self, node: SearchNode) {
        let key = self.key(&node);
        self.open.push(OpenNode { key, node });
        self.pushed += 1;
    }

    /// Remove the next node to explore.
    pub fn pop(&mut self) -> Option<SearchNode> {
        self.open.pop().map(|entry| entry.node)
    }

    /// Lowest dual bound over the open nodes; `+inf` when none are open.
    pub fn best_bound(&self) -> f64 {
        self.open
            .iter()
            .map(|entry| entry.node.dual_bound)
            .fold(f64::INFINITY, f64::min)
    }

    /// Drop every open node the incumbent value makes useless.
    ///
    /// Returns how many were dropped.
    pub fn prune_by_bound(&mut self, incumbent_obj: f64, tol: f64) -> usize {
        let before = self.open.len();
        self.open
            .retain(|entry| !entry.node.can_prune(incumbent_obj, tol));
        before - self.open.len()
    }

    /// True if no node is open.
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Number of open nodes.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Nodes filed since creation.
    pub fn total_added(&self) -> u64 {
        self.pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, bound: f64, depth: usize) -> SearchNode {
        let mut n = SearchNode::root();
        n.id = id;
        n.dual_bound = bound;
        n.depth = depth;
        n
    }

    fn drain(queue: &mut NodeQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.pop()).map(|n| n.id).collect()
    }

    #[test]
    fn test_best_bound_order() {
        let mut queue = NodeQueue::new(NodeSelection::BestBound);
        for (id, bound) in [(1, 10.0), (2, 5.0), (3, 15.0), (4, 5.0)] {
            queue.push(node(id, bound, 0));
        }
        assert_eq!(queue.best_bound(), 5.0);
        // equal bounds: newest first
        assert_eq!(drain(&mut queue), vec![4, 2, 1, 3]);
        assert_eq!(queue.best_bound(), f64::INFINITY);
    }

    #[test]
    fn test_depth_first_order() {
        let mut queue = NodeQueue::new(NodeSelection::DepthFirst);
        queue.push(node(1, 0.0, 0));
        queue.push(node(2, 0.0, 2));
        queue.push(node(3, 0.0, 1));
        assert_eq!(drain(&mut queue), vec![2, 3, 1]);
        assert_eq!(queue.total_added(), 3);
    }

    #[test]
    fn test_prune_by_incumbent() {
        let mut queue = NodeQueue::new(NodeSelection::BestBound);
        for i in 0..5 {
            queue.push(node(i, i as f64 * 10.0, 0));
        }
        // bounds 30 and 40 cannot beat 25
        assert_eq!(queue.prune_by_bound(25.0, 1e-9), 2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.best_bound(), 0.0);
    }
}
