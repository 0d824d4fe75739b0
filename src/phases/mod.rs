//! Workflow phase detection
//!
//! Classifies each task of a task file into a pipeline stage
//! (setup → install → configure → deploy → activate → verify → cleanup),
//! groups consecutive tasks sharing a stage, and judges whether the file reads
//! as one coherent pipeline that should stay together or as a mix of concerns
//! that is a candidate for splitting.
//!
//! Per-task scoring adds [`MODULE_SIGNAL`] when the task's module belongs to a
//! phase and [`KEYWORD_SIGNAL`] when its name contains one of the phase's
//! keywords. The best-scoring phase wins; ties go to the phase listed first in
//! the [`PhasePatterns`] table. Tasks without any signal are `unknown` and do
//! not join a group.

use crate::config::{ensure_confidence, DEFAULT_PHASE_MIN_CONFIDENCE};
use crate::role::{short_module_name, Task, TaskFile};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

mod coherence;
mod patterns;

pub use coherence::{
    CoherenceSignals, SignalLevel, CONFIDENCE_WEIGHT, COVERAGE_WEIGHT, MODERATE_SIGNAL,
    NON_REPETITION_WEIGHT, ORDERING_WEIGHT, STRONG_SIGNAL,
};
pub use patterns::{PhasePattern, PhasePatterns};

/// Score contributed by a module that belongs to a phase
pub const MODULE_SIGNAL: f64 = 0.7;
/// Score contributed by a task name keyword of a phase
pub const KEYWORD_SIGNAL: f64 = 0.3;
/// Files with fewer tasks are not analyzed
pub const MIN_TASKS_FOR_DETECTION: usize = 3;

/// Workflow phase of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Prerequisites: directories, users, repositories
    Setup,
    /// Software installation
    Install,
    /// Configuration files and settings
    Configure,
    /// Application code and artifacts
    Deploy,
    /// Starting and enabling services
    Activate,
    /// Health checks and assertions
    Verify,
    /// Removing temporary or obsolete state
    Cleanup,
    /// No phase signal found
    Unknown,
}

impl Phase {
    /// The seven named phases in pipeline order
    pub const KNOWN: [Phase; 7] = [
        Phase::Setup,
        Phase::Install,
        Phase::Configure,
        Phase::Deploy,
        Phase::Activate,
        Phase::Verify,
        Phase::Cleanup,
    ];

    /// Position in the pipeline, `setup = 1` through `cleanup = 7`
    pub fn priority(&self) -> u8 {
        match self {
            Phase::Setup => 1,
            Phase::Install => 2,
            Phase::Configure => 3,
            Phase::Deploy => 4,
            Phase::Activate => 5,
            Phase::Verify => 6,
            Phase::Cleanup => 7,
            Phase::Unknown => 0,
        }
    }

    /// Lower-case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Install => "install",
            Phase::Configure => "configure",
            Phase::Deploy => "deploy",
            Phase::Activate => "activate",
            Phase::Verify => "verify",
            Phase::Cleanup => "cleanup",
            Phase::Unknown => "unknown",
        }
    }

    /// Capitalized name for messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Setup => "Setup",
            Phase::Install => "Install",
            Phase::Configure => "Configure",
            Phase::Deploy => "Deploy",
            Phase::Activate => "Activate",
            Phase::Verify => "Verify",
            Phase::Cleanup => "Cleanup",
            Phase::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous run of tasks sharing a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMatch {
    /// The shared phase
    pub phase: Phase,
    /// First line of the first task, 0 without line information
    pub start_line: usize,
    /// Last line of the last task, 0 without line information
    pub end_line: usize,
    /// Number of tasks in the run
    pub task_count: usize,
    /// Indices of the tasks in the run
    pub task_indices: Vec<usize>,
    /// Mean per-task phase score
    pub confidence: f64,
}

/// Outcome of phase detection for one task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDetectionResult {
    /// Phase groups in file order
    pub detected_phases: Vec<PhaseMatch>,
    /// Whether the file forms one coherent pipeline
    pub is_coherent_pipeline: bool,
    /// Weighted coherence score
    pub confidence: f64,
    /// Keep-together or split advice
    pub recommendation: String,
    /// Per-signal explanation
    pub reasoning: String,
    /// The individual coherence signals, when computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<CoherenceSignals>,
}

impl PhaseDetectionResult {
    fn short_circuit(detected_phases: Vec<PhaseMatch>, recommendation: &str, reasoning: String) -> Self {
        Self {
            detected_phases,
            is_coherent_pipeline: false,
            confidence: 0.0,
            recommendation: recommendation.to_string(),
            reasoning,
            signals: None,
        }
    }

    /// Phase names of the groups joined with arrows
    pub fn phase_flow(&self) -> String {
        self.detected_phases
            .iter()
            .map(|p| p.phase.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Classifies tasks into phases and scores pipeline coherence
#[derive(Debug, Clone)]
pub struct PhaseDetector {
    min_confidence: f64,
    patterns: PhasePatterns,
}

impl Default for PhaseDetector {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_PHASE_MIN_CONFIDENCE,
            patterns: PhasePatterns::default(),
        }
    }
}

impl PhaseDetector {
    /// Create a detector using the built-in phase table
    pub fn new(min_confidence: f64) -> Result<Self> {
        Self::with_patterns(min_confidence, PhasePatterns::default())
    }

    /// Create a detector using a custom phase table
    pub fn with_patterns(min_confidence: f64, patterns: PhasePatterns) -> Result<Self> {
        ensure_confidence("min_confidence", min_confidence)?;
        Ok(Self {
            min_confidence,
            patterns,
        })
    }

    /// Coherence score a file must reach to count as a pipeline
    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// The phase table in use
    pub fn patterns(&self) -> &PhasePatterns {
        &self.patterns
    }

    /// Classify one task, returning its phase and score
    pub fn classify_task(&self, task: &Task) -> (Phase, f64) {
        let module = task
            .primary_module()
            .map(|m| short_module_name(&m))
            .unwrap_or_default();
        let name = task.name_lower();

        let mut best = (Phase::Unknown, 0.0);
        for pattern in self.patterns.entries() {
            let mut score = 0.0;
            if !module.is_empty() && pattern.matches_module(&module) {
                score += MODULE_SIGNAL;
            }
            if pattern.matches_name(&name) {
                score += KEYWORD_SIGNAL;
            }
            let score = f64::min(score, 1.0);
            if score > best.1 {
                best = (pattern.phase, score);
            }
        }
        best
    }

    /// Detect phases of a task file
    pub fn detect_file(&self, file: &TaskFile) -> Result<PhaseDetectionResult> {
        self.detect_phases(&file.tasks, file.line_ranges.as_deref())
    }

    /// Detect phases of a task sequence
    ///
    /// `line_ranges`, when given, must hold one `(start, end)` pair per task.
    pub fn detect_phases(
        &self,
        tasks: &[Task],
        line_ranges: Option<&[(usize, usize)]>,
    ) -> Result<PhaseDetectionResult> {
        if let Some(ranges) = line_ranges {
            if ranges.len() != tasks.len() {
                bail!(
                    "line_ranges has {} entries but there are {} tasks",
                    ranges.len(),
                    tasks.len()
                );
            }
        }

        if tasks.len() < MIN_TASKS_FOR_DETECTION {
            return Ok(PhaseDetectionResult::short_circuit(
                Vec::new(),
                "Too few tasks to detect a workflow",
                format!("Only {} task(s); at least {} needed", tasks.len(), MIN_TASKS_FOR_DETECTION),
            ));
        }

        let classified: Vec<(Phase, f64)> = tasks.iter().map(|t| self.classify_task(t)).collect();
        let groups = group_phases(&classified, line_ranges);
        debug!(
            tasks = tasks.len(),
            groups = groups.len(),
            "classified task phases"
        );

        if groups.len() < 2 {
            let reasoning = format!("Only {} phase group(s) detected", groups.len());
            return Ok(PhaseDetectionResult::short_circuit(
                groups,
                "Not enough distinct phases to form a workflow",
                reasoning,
            ));
        }

        let signals = CoherenceSignals::compute(&groups, tasks.len());
        let confidence = signals.weighted_score();
        let is_coherent_pipeline = confidence >= self.min_confidence;

        let flow = groups
            .iter()
            .map(|g| g.phase.as_str())
            .collect::<Vec<_>>()
            .join(" → ");
        let recommendation = if is_coherent_pipeline {
            format!("Keep together: tasks form a coherent {} workflow", flow)
        } else {
            "Consider splitting: tasks do not follow one coherent workflow".to_string()
        };

        Ok(PhaseDetectionResult {
            detected_phases: groups,
            is_coherent_pipeline,
            confidence,
            recommendation,
            reasoning: signals.reasoning(),
            signals: Some(signals),
        })
    }
}

/// Merge consecutive same-phase tasks into groups, skipping unknown tasks
fn group_phases(classified: &[(Phase, f64)], line_ranges: Option<&[(usize, usize)]>) -> Vec<PhaseMatch> {
    let mut groups = Vec::new();
    let mut current: Option<(Phase, Vec<usize>, Vec<f64>)> = None;

    for (index, (phase, score)) in classified.iter().enumerate() {
        if *phase == Phase::Unknown {
            if let Some(run) = current.take() {
                groups.push(build_match(run, line_ranges));
            }
            continue;
        }

        let extends_run = matches!(&current, Some((run_phase, _, _)) if run_phase == phase);
        if extends_run {
            if let Some((_, indices, scores)) = current.as_mut() {
                indices.push(index);
                scores.push(*score);
            }
        } else {
            if let Some(run) = current.take() {
                groups.push(build_match(run, line_ranges));
            }
            current = Some((*phase, vec![index], vec![*score]));
        }
    }

    if let Some(run) = current.take() {
        groups.push(build_match(run, line_ranges));
    }
    groups
}

fn build_match(
    (phase, task_indices, scores): (Phase, Vec<usize>, Vec<f64>),
    line_ranges: Option<&[(usize, usize)]>,
) -> PhaseMatch {
    let (start_line, end_line) = match (line_ranges, task_indices.first(), task_indices.last()) {
        (Some(ranges), Some(first), Some(last)) => (ranges[*first].0, ranges[*last].1),
        _ => (0, 0),
    };
    PhaseMatch {
        phase,
        start_line,
        end_line,
        task_count: task_indices.len(),
        confidence: scores.iter().sum::<f64>() / scores.len() as f64,
        task_indices,
    }
}
