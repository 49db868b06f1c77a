//! Primal/dual bound tracking.
//!
//! Both bounds move monotonically: for minimization the dual bound only goes
//! up and the primal bound only goes down (mirrored for maximization). The
//! dual bound may jump to the infeasibility sentinel (`+inf` for
//! minimization), which signals that the master has no feasible point left.

use std::time::Duration;

use gdp_core::Sense;

use crate::model::{absolute_gap, relative_gap, TerminationCondition};
use crate::settings::GdpSettings;

/// Primal and dual bounds with their update history.
#[derive(Debug, Clone)]
pub struct BoundTracker {
    sense: Sense,
    primal: f64,
    dual: f64,
    history: Vec<(f64, f64)>,
    improvement_tol: f64,
}

impl BoundTracker {
    /// Unbounded tracker for the given sense.
    pub fn new(sense: Sense, improvement_tol: f64) -> Self {
        Self {
            sense,
            primal: sense.infeasible_value(),
            dual: sense.unbounded_value(),
            history: Vec::new(),
            improvement_tol,
        }
    }

    /// Best feasible objective value.
    pub fn primal(&self) -> f64 {
        self.primal
    }

    /// Best relaxation bound.
    pub fn dual(&self) -> f64 {
        self.dual
    }

    /// (primal, dual) after every bound change.
    pub fn history(&self) -> &[(f64, f64)] {
        &self.history
    }

    /// True once a feasible objective value has been recorded.
    pub fn has_primal(&self) -> bool {
        self.primal.is_finite()
    }

    /// True if the dual bound proves the master infeasible.
    pub fn dual_is_infeasible(&self) -> bool {
        self.dual == self.sense.infeasible_value()
    }

    /// Record a master solve.
    ///
    /// An infeasible master moves the dual bound to the infeasibility
    /// sentinel. Otherwise `objective`, capped at the primal bound, replaces
    /// the dual bound only if it is tighter. Returns true if the dual bound
    /// changed.
    pub fn update_after_master_solve(&mut self, feasible: bool, objective: f64) -> bool {
        if !feasible {
            let changed = !self.dual_is_infeasible();
            self.set_dual_infeasible();
            return changed;
        }
        if objective.is_nan() {
            return false;
        }
        // Assignments cut off by no-good cuts are covered by the incumbent.
        let objective = if self.has_primal() && self.sense.improves(self.primal, objective, 0.0) {
            self.primal
        } else {
            objective
        };
        let tighter = match self.sense {
            Sense::Minimize => objective > self.dual,
            Sense::Maximize => objective < self.dual,
        };
        if tighter {
            self.dual = objective;
            self.record();
            log::debug!("Dual bound improved to {:.8e}", objective);
        }
        tighter
    }

    /// Record a feasible subproblem objective.
    ///
    /// Returns true if `primal` improves on the current primal bound by more
    /// than the improvement tolerance; only then is the bound replaced.
    pub fn update_primal(&mut self, primal: f64) -> bool {
        if !primal.is_finite() {
            return false;
        }
        let improved = !self.has_primal()
            || self
                .sense
                .improves(primal, self.primal, self.improvement_tol);
        if improved {
            self.primal = primal;
            self.record();
            log::debug!("Primal bound improved to {:.8e}", primal);
        }
        improved
    }

    /// Force the dual bound to the infeasibility sentinel.
    ///
    /// The sentinel is not written to the history.
    pub fn set_dual_infeasible(&mut self) {
        self.dual = self.sense.infeasible_value();
    }

    /// Check the termination criteria in order: infeasibility proof, gap,
    /// iteration limit, time limit.
    ///
    /// When the dual bound is the sentinel but an incumbent exists, the
    /// search space is exhausted: the solve converged and the dual bound is
    /// clamped to the primal bound.
    pub fn check_termination(
        &mut self,
        iteration: usize,
        elapsed: Duration,
        settings: &GdpSettings,
    ) -> Option<TerminationCondition> {
        if self.dual_is_infeasible() {
            if self.has_primal() {
                self.dual = self.primal;
                self.record();
                log::info!("Discrete search space exhausted; incumbent is optimal");
                return Some(TerminationCondition::Converged);
            }
            log::info!("Master problem infeasible: model has no feasible solution");
            return Some(TerminationCondition::Infeasible);
        }

        let gap = self.sense.sign() * (self.primal - self.dual);
        if self.primal.is_finite() && self.dual.is_finite() {
            let rel = gap / self.primal.abs().max(1e-10);
            if gap <= settings.gap_abs_tol || rel <= settings.gap_rel_tol {
                log::info!(
                    "Converged: primal {:.8e}, dual {:.8e}, abs gap {:.3e}, rel gap {:.3e}",
                    self.primal,
                    self.dual,
                    absolute_gap(self.primal, self.dual),
                    relative_gap(self.primal, self.dual),
                );
                return Some(TerminationCondition::Converged);
            }
        }

        if iteration >= settings.iteration_limit {
            log::info!("Iteration limit of {} reached", settings.iteration_limit);
            return Some(TerminationCondition::IterationLimit);
        }

        if let Some(limit) = settings.time_limit_ms {
            if elapsed >= Duration::from_millis(limit) {
                log::info!("Time limit of {} ms reached", limit);
                return Some(TerminationCondition::TimeLimit);
            }
        }

        None
    }

    fn record(&mut self) {
        self.history.push((self.primal, self.dual));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_bound_is_monotone() {
        let mut b = BoundTracker::new(Sense::Minimize, 1e-9);
        assert!(b.update_after_master_solve(true, 1.0));
        assert!(!b.update_after_master_solve(true, 0.5));
        assert_eq!(b.dual(), 1.0);
        assert!(b.update_after_master_solve(true, 2.0));
        assert_eq!(b.dual(), 2.0);

        let mut b = BoundTracker::new(Sense::Maximize, 1e-9);
        b.update_after_master_solve(true, 10.0);
        b.update_after_master_solve(true, 12.0);
        assert_eq!(b.dual(), 10.0);
    }

    #[test]
    fn test_primal_requires_strict_improvement() {
        let mut b = BoundTracker::new(Sense::Minimize, 1e-3);
        assert!(b.update_primal(5.0));
        assert!(!b.update_primal(4.9995));
        assert!(b.update_primal(4.0));
        assert!(!b.update_primal(f64::NAN));
        assert_eq!(b.primal(), 4.0);
    }

    #[test]
    fn test_dual_capped_at_primal() {
        let mut b = BoundTracker::new(Sense::Minimize, 1e-9);
        b.update_after_master_solve(true, 0.0);
        b.update_primal(1.0);
        assert!(b.update_after_master_solve(true, 3.0));
        assert_eq!(b.dual(), 1.0);
    }

    #[test]
    fn test_infeasible_master() {
        let settings = GdpSettings::default();
        let mut b = BoundTracker::new(Sense::Minimize, 1e-9);
        b.update_after_master_solve(false, f64::NAN);
        assert_eq!(b.dual(), f64::INFINITY);
        assert_eq!(
            b.check_termination(1, Duration::ZERO, &settings),
            Some(TerminationCondition::Infeasible)
        );
    }

    #[test]
    fn test_exhausted_with_incumbent_converges() {
        let settings = GdpSettings::default();
        let mut b = BoundTracker::new(Sense::Minimize, 1e-9);
        b.update_after_master_solve(true, 1.0);
        b.update_primal(3.0);
        b.set_dual_infeasible();
        assert_eq!(
            b.check_termination(2, Duration::ZERO, &settings),
            Some(TerminationCondition::Converged)
        );
        assert_eq!(b.dual(), 3.0);
        for w in b.history().windows(2) {
            assert!(w[1].1 >= w[0].1);
            assert!(w[1].0 <= w[0].0);
        }
    }

    #[test]
    fn test_gap_and_limits() {
        let settings = GdpSettings::default()
            .with_iteration_limit(5)
            .with_time_limit(10);
        let mut b = BoundTracker::new(Sense::Maximize, 1e-9);
        b.update_after_master_solve(true, 10.0);
        b.update_primal(5.0);
        assert_eq!(b.check_termination(1, Duration::ZERO, &settings), None);
        assert_eq!(
            b.check_termination(5, Duration::ZERO, &settings),
            Some(TerminationCondition::IterationLimit)
        );
        assert_eq!(
            b.check_termination(1, Duration::from_millis(11), &settings),
            Some(TerminationCondition::TimeLimit)
        );
        b.update_primal(10.0 - 1e-7);
        assert_eq!(
            b.check_termination(1, Duration::ZERO, &settings),
            Some(TerminationCondition::Converged)
        );
    }
}
