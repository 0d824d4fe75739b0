//! Recommendation synthesis
//!
//! Rules run in a fixed order and each contributes at most a few multi-line
//! entries. The order is part of the output contract.

use super::files::FileComplexityDetail;
use super::{ComplexityCategory, ComplexityReport};
use crate::concerns::ConcernMatch;
use crate::role::{base_name, RoleRecord, TaskFile};
use std::collections::BTreeMap;

/// Composition score from which the dependency chain should be documented
pub const HIGH_COMPOSITION_SCORE: usize = 8;
/// Distinct integration types from which an architecture write-up is suggested
pub const MANY_INTEGRATIONS: usize = 3;
/// Hotspots reported
pub const MAX_HOTSPOT_RECOMMENDATIONS: usize = 2;

/// Message emitted when no other rule fires
pub const WELL_MANAGED: &str =
    "✅ Role complexity is well-managed. The current structure fits the role's size and scope.";

/// Build the ordered recommendation list for a report
pub fn generate_recommendations(role: &RoleRecord, report: &ComplexityReport) -> Vec<String> {
    let mut recommendations = Vec::new();

    match report.task_files_detail.first() {
        None if report.category == ComplexityCategory::Complex => {
            recommendations.push(format!(
                "📊 Complex role with {} tasks\n   WHY: Large roles are hard to review and test as a whole\n   HOW: Split tasks into focused files (install.yml, configure.yml, service.yml) imported from main.yml",
                report.metrics.total_tasks
            ));
        }
        None => {}
        Some(largest) if largest.is_god_file => {
            let file = role.tasks.iter().find(|f| f.file == largest.file);
            recommendations.push(god_file_recommendation(largest, file));
        }
        Some(_) => {}
    }

    for hotspot in report.conditional_hotspots.iter().take(MAX_HOTSPOT_RECOMMENDATIONS) {
        recommendations.push(format!(
            "🔀 {}: {} tasks branch on `{}`\n   WHY: Conditionals scattered over one variable hide separate code paths\n   HOW: {}",
            hotspot.file, hotspot.affected_tasks, hotspot.conditional_variable, hotspot.suggestion
        ));
    }

    if let Some(point) = most_significant(&report.inflection_points) {
        recommendations.push(format!(
            "📍 Inflection point in {} at task {} '{}'\n   WHY: `{}` steers the {} tasks that follow ({} branches)\n   HOW: Move the tasks from this point on into per-branch files selected with include_tasks",
            point.file,
            point.task_index + 1,
            point.task_name,
            point.variable,
            point.downstream_tasks,
            point.branch_count
        ));
    }

    let mut files_per_type = BTreeMap::new();
    for detail in &report.task_files_detail {
        for kind in &detail.integration_types {
            *files_per_type.entry(*kind).or_insert(0usize) += 1;
        }
    }
    for point in &report.integration_points {
        let files = files_per_type.get(&point.integration_type).copied().unwrap_or(0);
        if files > 1 {
            recommendations.push(format!(
                "🔌 {} ({}) integration is spread across {} files\n   WHY: Connection settings and error handling drift apart when duplicated\n   HOW: Consolidate the {} tasks into one file such as {}.yml",
                point.system_name, point.integration_type, files, point.integration_type, point.integration_type
            ));
        }
    }

    let metrics = &report.metrics;
    if metrics.composition_score() >= HIGH_COMPOSITION_SCORE {
        recommendations.push(format!(
            "🧩 High composition score ({}): {} role dependencies, {} role includes, {} task includes\n   HOW: Document the dependency and include chain in the role README",
            metrics.composition_score(),
            metrics.role_dependencies,
            metrics.role_includes,
            metrics.task_includes
        ));
    }

    if report.integration_points.len() >= MANY_INTEGRATIONS {
        let systems: Vec<&str> = report
            .integration_points
            .iter()
            .take(MANY_INTEGRATIONS)
            .map(|p| p.system_name.as_str())
            .collect();
        recommendations.push(format!(
            "🏗️ Role integrates with {} external systems ({})\n   HOW: Document the integration architecture: endpoints, credentials, and failure handling",
            report.integration_points.len(),
            systems.join(", ")
        ));
    }

    let credentialed: Vec<&str> = report
        .integration_points
        .iter()
        .filter(|p| p.uses_credentials)
        .map(|p| p.system_name.as_str())
        .collect();
    if !credentialed.is_empty() {
        recommendations.push(format!(
            "🔐 Credentials required for: {}\n   HOW: Keep secrets in ansible-vault or an external secret manager and mark the tasks with no_log: true",
            credentialed.join(", ")
        ));
    }

    if recommendations.is_empty() {
        recommendations.push(WELL_MANAGED.to_string());
    }
    recommendations
}

fn most_significant(points: &[super::InflectionPoint]) -> Option<&super::InflectionPoint> {
    points.iter().fold(None, |best: Option<&super::InflectionPoint>, point| match best {
        Some(top) if top.downstream_tasks >= point.downstream_tasks => Some(top),
        _ => Some(point),
    })
}

fn lines_suffix(start: usize, end: usize) -> String {
    if start == 0 && end == 0 {
        String::new()
    } else {
        format!(", lines {}-{}", start, end)
    }
}

/// Line span covered by a concern's tasks
fn concern_lines(concern: &ConcernMatch, file: Option<&TaskFile>) -> Option<(usize, usize)> {
    let file = file?;
    let ranges: Vec<(usize, usize)> = concern
        .task_indices
        .iter()
        .filter_map(|index| file.line_range(*index))
        .collect();
    let start = ranges.iter().map(|r| r.0).min()?;
    let end = ranges.iter().map(|r| r.1).max()?;
    Some((start, end))
}

fn god_file_recommendation(detail: &FileComplexityDetail, file: Option<&TaskFile>) -> String {
    let name = base_name(&detail.file);

    if let Some(phases) = detail
        .phase_detection
        .as_ref()
        .filter(|p| p.is_coherent_pipeline)
    {
        let mut text = format!(
            "✅ {} ({} tasks) is large but forms a coherent {} workflow\n   WHY: {}\n   KEEP TOGETHER: splitting would scatter one ordered pipeline",
            name,
            detail.task_count,
            phases.phase_flow(),
            phases.reasoning
        );
        for phase in &phases.detected_phases {
            text.push_str(&format!(
                "\n   - {} ({} tasks{})",
                phase.phase.display_name(),
                phase.task_count,
                lines_suffix(phase.start_line, phase.end_line)
            ));
        }
        return text;
    }

    if detail.concerns.len() >= 2 {
        let mut text = format!(
            "⚠️ {} mixes {} concerns ({} tasks)\n   WHY: Unrelated responsibilities in one file are hard to reuse and review\n   HOW: Split by concern:",
            name,
            detail.concerns.len(),
            detail.task_count
        );
        for concern in &detail.concerns {
            let lines = concern_lines(concern, file)
                .map(|(start, end)| lines_suffix(start, end))
                .unwrap_or_default();
            text.push_str(&format!(
                "\n   - {}: {} ({} tasks{})",
                concern.suggested_filename, concern.display_name, concern.task_count, lines
            ));
        }
        return text;
    }

    if let Some(concern) = &detail.primary_concern {
        let stem = name
            .strip_suffix(".yml")
            .or_else(|| name.strip_suffix(".yaml"))
            .unwrap_or(&name);
        return format!(
            "📁 {} ({} tasks) is dominated by {} ({:.0}%)\n   WHY: One concern, but too many tasks to follow in one file\n   HOW: Split into setup, core, and verify stages:\n   - {}_setup.yml: prerequisites\n   - {}.yml: core {} tasks\n   - {}_verify.yml: checks and assertions",
            name,
            detail.task_count,
            concern.display_name,
            concern.confidence * 100.0,
            stem,
            stem,
            concern.display_name.to_lowercase(),
            stem
        );
    }

    format!(
        "📁 {} has {} tasks across {} different modules with no clear concern\n   HOW: Reorganize the tasks into files by responsibility and import them from main.yml",
        name, detail.task_count, detail.module_diversity
    )
}
