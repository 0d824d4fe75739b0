//! Pipeline coherence scoring
//!
//! Four signals in `[0, 1]` describe how much a sequence of phase groups reads
//! like one workflow. Their weighted sum is compared against the detector's
//! minimum confidence.

use super::PhaseMatch;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight of the phase ordering signal
pub const ORDERING_WEIGHT: f64 = 0.35;
/// Weight of the task coverage signal
pub const COVERAGE_WEIGHT: f64 = 0.25;
/// Weight of the mean detection confidence signal
pub const CONFIDENCE_WEIGHT: f64 = 0.25;
/// Weight of the non-repetition signal
pub const NON_REPETITION_WEIGHT: f64 = 0.15;

/// Signal value at or above which a signal counts as strong
pub const STRONG_SIGNAL: f64 = 0.7;
/// Signal value at or above which a signal counts as moderate
pub const MODERATE_SIGNAL: f64 = 0.5;

/// Three-tier rating of one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLevel {
    /// At or above [`STRONG_SIGNAL`]
    Strong,
    /// At or above [`MODERATE_SIGNAL`]
    Moderate,
    /// Below [`MODERATE_SIGNAL`]
    Weak,
}

impl SignalLevel {
    /// Rate a signal value
    pub fn rate(value: f64) -> Self {
        if value >= STRONG_SIGNAL {
            SignalLevel::Strong
        } else if value >= MODERATE_SIGNAL {
            SignalLevel::Moderate
        } else {
            SignalLevel::Weak
        }
    }

    /// Glyph used in reasoning text
    pub fn glyph(&self) -> &'static str {
        match self {
            SignalLevel::Strong => "✓",
            SignalLevel::Moderate => "~",
            SignalLevel::Weak => "✗",
        }
    }
}

/// The four coherence signals of a phase sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoherenceSignals {
    /// Share of group transitions that do not move backwards
    pub ordering: f64,
    /// Share of tasks that belong to a phase group
    pub coverage: f64,
    /// Mean confidence of the phase groups
    pub confidence: f64,
    /// One minus the share of phases that recur after other phases
    pub non_repetition: f64,
}

impl CoherenceSignals {
    /// Compute the signals for at least two phase groups over `total_tasks` tasks
    pub fn compute(groups: &[PhaseMatch], total_tasks: usize) -> Self {
        let transitions = groups.len().saturating_sub(1);
        let ordering = if transitions == 0 {
            1.0
        } else {
            let forward = groups
                .windows(2)
                .filter(|pair| pair[1].phase.priority() >= pair[0].phase.priority())
                .count();
            forward as f64 / transitions as f64
        };

        let covered: usize = groups.iter().map(|g| g.task_count).sum();
        let coverage = if total_tasks == 0 {
            0.0
        } else {
            covered as f64 / total_tasks as f64
        };

        let confidence = if groups.is_empty() {
            0.0
        } else {
            groups.iter().map(|g| g.confidence).sum::<f64>() / groups.len() as f64
        };

        let mut occurrences: HashMap<_, usize> = HashMap::new();
        for group in groups {
            *occurrences.entry(group.phase).or_default() += 1;
        }
        let repeated = occurrences.values().filter(|count| **count > 1).count();
        let non_repetition = if groups.is_empty() {
            1.0
        } else {
            1.0 - repeated as f64 / groups.len() as f64
        };

        Self {
            ordering,
            coverage,
            confidence,
            non_repetition,
        }
    }

    /// Weighted combination of the four signals
    pub fn weighted_score(&self) -> f64 {
        self.ordering * ORDERING_WEIGHT
            + self.coverage * COVERAGE_WEIGHT
            + self.confidence * CONFIDENCE_WEIGHT
            + self.non_repetition * NON_REPETITION_WEIGHT
    }

    /// Pipe-joined per-signal annotations
    pub fn reasoning(&self) -> String {
        [
            (self.ordering, "phase ordering"),
            (self.coverage, "task coverage"),
            (self.confidence, "detection confidence"),
            (self.non_repetition, "no phase repetition"),
        ]
        .iter()
        .map(|(value, label)| {
            format!(
                "{} {} ({:.0}%)",
                SignalLevel::rate(*value).glyph(),
                label,
                value * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
    }
}
