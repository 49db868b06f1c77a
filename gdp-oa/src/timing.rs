//! Wall-clock accounting per solver phase.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Named timing buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Whole solve call.
    Total,
    /// Master initialization strategy.
    Initialization,
    /// Master MILP solves.
    Mip,
    /// Subproblem NLP solves.
    Nlp,
    /// Outer-approximation cut generation.
    OaCutGeneration,
    /// Affine (McCormick) cut generation.
    AffineCutGeneration,
    /// No-good cut generation.
    IntegerCutGeneration,
    /// Disjunctive bound tightening.
    DisjunctiveBounding,
}

impl Phase {
    /// Label used in logs and reports.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Total => "total",
            Phase::Initialization => "initialization",
            Phase::Mip => "mip",
            Phase::Nlp => "nlp",
            Phase::OaCutGeneration => "OA cut generation",
            Phase::AffineCutGeneration => "affine cut generation",
            Phase::IntegerCutGeneration => "integer cut generation",
            Phase::DisjunctiveBounding => "disjunctive bounding",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accumulated durations per phase.
#[derive(Debug, Clone, Default)]
pub struct Timing {
    buckets: BTreeMap<Phase, Duration>,
}

impl Timing {
    /// Empty timing record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the time elapsed since `start` to `phase`.
    pub fn record(&mut self, phase: Phase, start: Instant) {
        self.add(phase, start.elapsed());
    }

    /// Add a duration to `phase`.
    pub fn add(&mut self, phase: Phase, duration: Duration) {
        *self.buckets.entry(phase).or_default() += duration;
    }

    /// Total time spent in `phase`.
    pub fn get(&self, phase: Phase) -> Duration {
        self.buckets.get(&phase).copied().unwrap_or_default()
    }

    /// Seconds spent in `phase`.
    pub fn seconds(&self, phase: Phase) -> f64 {
        self.get(phase).as_secs_f64()
    }

    /// Iterate over recorded phases.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, Duration)> + '_ {
        self.buckets.iter().map(|(p, d)| (*p, *d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_per_phase() {
        let mut timing = Timing::new();
        timing.add(Phase::Mip, Duration::from_millis(5));
        timing.add(Phase::Mip, Duration::from_millis(7));
        timing.add(Phase::Nlp, Duration::from_millis(1));

        assert_eq!(timing.get(Phase::Mip), Duration::from_millis(12));
        assert_eq!(timing.get(Phase::Total), Duration::ZERO);
        assert_eq!(timing.iter().count(), 2);
        assert_eq!(Phase::OaCutGeneration.to_string(), "OA cut generation");
    }
}
