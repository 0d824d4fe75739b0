//! Per-file complexity breakdown

use super::integrations::{task_integration, IntegrationType};
use crate::concerns::{ConcernMatch, ConcernRegistry};
use crate::phases::{PhaseDetectionResult, PhaseDetector};
use crate::role::{RoleRecord, TaskFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Files with more tasks than this are god files
pub const GOD_FILE_TASKS: usize = 15;
/// Files using more distinct modules than this are god files
pub const GOD_FILE_MODULE_DIVERSITY: usize = 10;
/// Conditional share above which a file is conditional-heavy
pub const CONDITIONAL_HEAVY_PERCENTAGE: f64 = 50.0;
/// Conditional task count above which a file is conditional-heavy
pub const CONDITIONAL_HEAVY_COUNT: usize = 5;
/// Lowest confidence at which a concern is listed for a file
pub const SECONDARY_CONCERN_MIN_CONFIDENCE: f64 = 0.15;

/// Complexity summary of one task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileComplexityDetail {
    /// Path relative to `tasks/`
    pub file: String,
    /// Number of tasks
    pub task_count: usize,
    /// Tasks with a non-empty `when`
    pub conditional_count: usize,
    /// `100 * conditional_count / task_count`
    pub conditional_percentage: f64,
    /// Integration types whose modules appear in the file
    pub integration_types: BTreeSet<IntegrationType>,
    /// Distinct modules used
    pub module_diversity: usize,
    /// Dominant concern, when one reaches the concern threshold
    pub primary_concern: Option<ConcernMatch>,
    /// Every concern covering a meaningful share of the file
    pub concerns: Vec<ConcernMatch>,
    /// Phase detection, kept when phases were found
    pub phase_detection: Option<PhaseDetectionResult>,
    /// Too many tasks or too many different modules
    pub is_god_file: bool,
    /// Mostly conditional tasks
    pub is_conditional_heavy: bool,
}

/// `task_count > 15 || module_diversity > 10`
pub fn is_god_file(task_count: usize, module_diversity: usize) -> bool {
    task_count > GOD_FILE_TASKS || module_diversity > GOD_FILE_MODULE_DIVERSITY
}

/// `conditional_percentage > 50 && conditional_count > 5`
pub fn is_conditional_heavy(conditional_percentage: f64, conditional_count: usize) -> bool {
    conditional_percentage > CONDITIONAL_HEAVY_PERCENTAGE && conditional_count > CONDITIONAL_HEAVY_COUNT
}

/// Percentage of `part` in `total`, 0 for an empty total
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

/// Detectors used to describe each file
pub struct FileAnalysis<'a> {
    /// Concern detectors
    pub concerns: &'a ConcernRegistry,
    /// Primary concern threshold
    pub concern_min_confidence: f64,
    /// Phase detector
    pub phases: &'a PhaseDetector,
}

impl FileAnalysis<'_> {
    /// Describe one non-empty task file
    pub fn describe(&self, file: &TaskFile) -> FileComplexityDetail {
        let task_count = file.tasks.len();
        let conditional_count = file.tasks.iter().filter(|t| t.is_conditional()).count();
        let conditional_percentage = percentage(conditional_count, task_count);

        let integration_types = file.tasks.iter().filter_map(task_integration).collect();
        let module_diversity = file
            .tasks
            .iter()
            .map(|t| t.short_module())
            .filter(|m| !m.is_empty())
            .collect::<BTreeSet<_>>()
            .len();

        let primary_concern = match self
            .concerns
            .detect_primary_concern(&file.tasks, self.concern_min_confidence)
        {
            Ok(found) => found,
            Err(e) => {
                debug!("Concern detection failed for {}: {:#}", file.file, e);
                None
            }
        };
        let concerns = self
            .concerns
            .detect_all(&file.tasks)
            .into_iter()
            .filter(|c| c.confidence >= SECONDARY_CONCERN_MIN_CONFIDENCE)
            .collect();

        let phase_detection = match self.phases.detect_file(file) {
            Ok(result) if !result.detected_phases.is_empty() || result.is_coherent_pipeline => {
                Some(result)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Phase detection failed for {}: {:#}", file.file, e);
                None
            }
        };

        FileComplexityDetail {
            file: file.file.clone(),
            task_count,
            conditional_count,
            conditional_percentage,
            integration_types,
            module_diversity,
            primary_concern,
            concerns,
            phase_detection,
            is_god_file: is_god_file(task_count, module_diversity),
            is_conditional_heavy: is_conditional_heavy(conditional_percentage, conditional_count),
        }
    }

    /// Describe every non-empty task file, largest first
    ///
    /// The sort is stable: files with equal task counts keep role order.
    pub fn describe_role(&self, role: &RoleRecord) -> Vec<FileComplexityDetail> {
        let mut details: Vec<FileComplexityDetail> = role
            .tasks
            .iter()
            .filter(|file| !file.tasks.is_empty())
            .map(|file| self.describe(file))
            .collect();
        details.sort_by(|a, b| b.task_count.cmp(&a.task_count));
        details
    }
}
