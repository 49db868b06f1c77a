//! Solver lifecycle.

use crate::model::TerminationCondition;

/// Lifecycle of one solve: running until the first termination condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverState {
    /// Iterating.
    #[default]
    Running,
    /// Stopped; the condition never changes afterwards.
    Terminated(TerminationCondition),
}

impl SolverState {
    /// True while the loop should continue.
    pub fn is_running(self) -> bool {
        matches!(self, SolverState::Running)
    }

    /// Final condition, if terminated.
    pub fn condition(self) -> Option<TerminationCondition> {
        match self {
            SolverState::Running => None,
            SolverState::Terminated(cond) => Some(cond),
        }
    }

    /// Move to `Terminated(cond)`.
    ///
    /// Returns false (and keeps the first condition) if already terminated.
    pub fn terminate(&mut self, cond: TerminationCondition) -> bool {
        match *self {
            SolverState::Running => {
                *self = SolverState::Terminated(cond);
                true
            }
            SolverState::Terminated(first) => {
                log::debug!("Ignoring termination '{}' after '{}'", cond, first);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_condition_wins() {
        let mut state = SolverState::default();
        assert!(state.is_running());
        assert_eq!(state.condition(), None);

        assert!(state.terminate(TerminationCondition::IterationLimit));
        assert!(!state.terminate(TerminationCondition::Converged));
        assert!(!state.is_running());
        assert_eq!(state.condition(), Some(TerminationCondition::IterationLimit));
    }
}
