//! Cut pool for the master problem.
//!
//! Cuts are only ever added: the master grows monotonically for the whole
//! solve. The pool rejects cuts that are parallel duplicates of an existing
//! cut with the same activation variable.

use std::collections::BTreeMap;

use crate::master::{CutSource, LinearCut};

/// A cut with pool metadata.
#[derive(Debug, Clone)]
pub struct PooledCut {
    /// The underlying linear cut.
    pub cut: LinearCut,

    /// Unique ID in the pool.
    pub id: usize,

    /// Master iteration in which the cut was added.
    pub added_iter: usize,
}

/// Statistics for the cut pool.
#[derive(Debug, Default, Clone)]
pub struct CutPoolStats {
    /// Total cuts added.
    pub total_added: usize,

    /// Cuts rejected as duplicates.
    pub duplicates: usize,

    /// Cuts added per source family: OA, affine, no-good, user.
    pub by_source: [usize; 4],
}

/// Cut pool for managing generated cuts.
#[derive(Debug, Clone, Default)]
pub struct CutPool {
    /// All cuts in the pool, in insertion order.
    cuts: Vec<PooledCut>,

    /// Current master iteration.
    iteration: usize,

    /// Statistics.
    stats: CutPoolStats,
}

impl CutPool {
    /// Create an empty cut pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration recorded on newly added cuts.
    pub fn set_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    /// Add a cut to the pool.
    ///
    /// Returns the cut ID and whether it's a duplicate (in which case the
    /// ID is that of the existing cut).
    pub fn add(&mut self, cut: LinearCut) -> (usize, bool) {
        if let Some(existing) = self.cuts.iter().find(|p| is_duplicate(&cut, &p.cut)) {
            self.stats.duplicates += 1;
            return (existing.id, true);
        }

        let id = self.cuts.len();
        self.stats.total_added += 1;
        self.stats.by_source[family(cut.source)] += 1;
        self.cuts.push(PooledCut {
            cut,
            id,
            added_iter: self.iteration,
        });

        (id, false)
    }

    /// Get a cut by ID.
    pub fn get(&self, id: usize) -> Option<&PooledCut> {
        self.cuts.get(id)
    }

    /// Iterate over all cuts.
    pub fn iter(&self) -> impl Iterator<Item = &PooledCut> {
        self.cuts.iter()
    }

    /// Get pool statistics.
    pub fn stats(&self) -> &CutPoolStats {
        &self.stats
    }

    /// Number of cuts in pool.
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    /// Check if pool is empty.
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }
}

fn family(source: CutSource) -> usize {
    match source {
        CutSource::OuterApproximation { .. } | CutSource::ObjectiveOuterApproximation => 0,
        CutSource::Affine { .. } | CutSource::ObjectiveAffine => 1,
        CutSource::NoGood => 2,
        CutSource::User => 3,
    }
}

fn merged(cut: &LinearCut) -> BTreeMap<usize, f64> {
    let mut terms = BTreeMap::new();
    for &(j, a) in &cut.terms {
        *terms.entry(j).or_insert(0.0) += a;
    }
    terms.retain(|_, a| a.abs() > 1e-12);
    terms
}

/// Check if two cuts are duplicates: same activation, parallel normals
/// pointing the same way, and equal normalized right-hand sides.
fn is_duplicate(a: &LinearCut, b: &LinearCut) -> bool {
    if a.activation != b.activation {
        return false;
    }
    let a_terms = merged(a);
    let b_terms = merged(b);
    if a_terms.len() != b_terms.len() || !a_terms.keys().eq(b_terms.keys()) {
        return false;
    }

    let a_norm: f64 = a_terms.values().map(|x| x * x).sum::<f64>().sqrt();
    let b_norm: f64 = b_terms.values().map(|x| x * x).sum::<f64>().sqrt();

    if a_norm < 1e-10 || b_norm < 1e-10 {
        return a_norm < 1e-10 && b_norm < 1e-10;
    }

    let dot: f64 = a_terms
        .values()
        .zip(b_terms.values())
        .map(|(ai, bi)| ai * bi)
        .sum();
    let cos_angle = dot / (a_norm * b_norm);

    if cos_angle > 0.9999 {
        let rhs_diff = (a.rhs / a_norm - b.rhs / b_norm).abs();
        return rhs_diff < 1e-8;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::VarId;

    fn make_cut(terms: Vec<(usize, f64)>, rhs: f64) -> LinearCut {
        LinearCut::new(terms, rhs, CutSource::User)
    }

    #[test]
    fn test_pool_add_and_get() {
        let mut pool = CutPool::new();

        let (id1, dup1) = pool.add(make_cut(vec![(0, 1.0), (1, 2.0)], 3.0));
        let (id2, dup2) = pool.add(make_cut(vec![(0, 4.0), (1, 5.0)], 6.0));

        assert!(!dup1);
        assert!(!dup2);
        assert_ne!(id1, id2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().by_source[3], 2);
    }

    #[test]
    fn test_duplicate_detection() {
        let mut pool = CutPool::new();

        let (id1, dup1) = pool.add(make_cut(vec![(0, 1.0), (1, 2.0)], 3.0));
        let (id2, dup2) = pool.add(make_cut(vec![(1, 2.0), (0, 1.0)], 3.0));
        // Parallel cut (same after normalization)
        let (id3, dup3) = pool.add(make_cut(vec![(0, 2.0), (1, 4.0)], 6.0));
        // Opposite direction is a different half-space
        let (_, dup4) = pool.add(make_cut(vec![(0, -1.0), (1, -2.0)], -3.0));

        assert!(!dup1);
        assert!(dup2);
        assert!(dup3);
        assert!(!dup4);
        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().duplicates, 2);
    }

    #[test]
    fn test_activation_distinguishes_cuts() {
        let mut pool = CutPool::new();
        pool.add(make_cut(vec![(0, 1.0)], 1.0).with_activation(Some(VarId(3))));
        let (_, dup) = pool.add(make_cut(vec![(0, 1.0)], 1.0).with_activation(Some(VarId(4))));
        assert!(!dup);
        let (_, dup) = pool.add(make_cut(vec![(0, 1.0)], 1.0).with_activation(Some(VarId(4))));
        assert!(dup);
    }
}
