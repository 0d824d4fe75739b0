//! Role complexity analysis
//!
//! The [`ComplexityAnalyzer`] is the single entry point producing a
//! [`ComplexityReport`]. It runs these steps in order:
//!
//! 1. Count tasks, files, handlers, conditionals, and error handlers
//! 2. Count role dependencies and include tasks
//! 3. Detect external integrations across the whole role
//! 4. Describe each task file (concerns, phases, god files)
//! 5. Find conditional hotspots and their inflection points
//! 6. Synthesize recommendations
//! 7. Optionally attach the anti-pattern report
//!
//! Detection failures inside one file or one pattern detector are logged and
//! never abort the analysis.

use crate::concerns::{builtin_registry, ConcernRegistry};
use crate::config::AnalysisConfig;
use crate::includes::{is_role_include, is_task_include};
use crate::patterns::{PatternAnalysisReport, PatternAnalyzer};
use crate::phases::PhaseDetector;
use crate::role::RoleRecord;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod files;
pub mod hotspots;
pub mod integrations;
pub mod recommendations;

pub use files::{is_god_file, FileComplexityDetail, SECONDARY_CONCERN_MIN_CONFIDENCE};
pub use hotspots::{ConditionalHotspot, InflectionPoint};
pub use integrations::{detect_integrations, IntegrationPoint, IntegrationType};
pub use recommendations::generate_recommendations;

/// Upper task count of a simple role
pub const SIMPLE_MAX_TASKS: usize = 10;
/// Upper task count of a medium role
pub const MEDIUM_MAX_TASKS: usize = 25;

/// Aggregate counts over a whole role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// Tasks across all task files
    pub total_tasks: usize,
    /// Task files, including empty ones
    pub task_files: usize,
    /// Handlers
    pub handlers: usize,
    /// Tasks with a non-empty `when`
    pub conditional_tasks: usize,
    /// Tasks with `rescue` or `always`
    pub error_handlers: usize,
    /// Entries in `meta.dependencies`
    pub role_dependencies: usize,
    /// `include_role`/`import_role` tasks
    pub role_includes: usize,
    /// `include_tasks`/`import_tasks` tasks
    pub task_includes: usize,
    /// Distinct integration types
    pub external_integrations: usize,
    /// Tasks in the largest file
    pub max_tasks_per_file: usize,
    /// Mean tasks per file, 0 without files
    pub avg_tasks_per_file: f64,
}

impl ComplexityMetrics {
    /// Collect the metrics of a role
    pub fn from_role(role: &RoleRecord) -> Self {
        let mut metrics = Self {
            task_files: role.tasks.len(),
            handlers: role.handlers.len(),
            role_dependencies: role.meta.dependencies.len(),
            ..Self::default()
        };

        for (_, task) in role.all_tasks() {
            metrics.total_tasks += 1;
            if task.is_conditional() {
                metrics.conditional_tasks += 1;
            }
            if task.has_error_handling() {
                metrics.error_handlers += 1;
            }
            if is_role_include(task) {
                metrics.role_includes += 1;
            }
            if is_task_include(task) {
                metrics.task_includes += 1;
            }
        }

        metrics.max_tasks_per_file = role.tasks.iter().map(|f| f.tasks.len()).max().unwrap_or(0);
        metrics.avg_tasks_per_file = if role.tasks.is_empty() {
            0.0
        } else {
            metrics.total_tasks as f64 / role.tasks.len() as f64
        };
        metrics
    }

    /// `2 * role_dependencies + role_includes + task_includes`
    pub fn composition_score(&self) -> usize {
        2 * self.role_dependencies + self.role_includes + self.task_includes
    }

    /// Share of conditional tasks in percent, 0 for an empty role
    pub fn conditional_percentage(&self) -> f64 {
        files::percentage(self.conditional_tasks, self.total_tasks)
    }
}

/// Size class of a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityCategory {
    /// Up to 10 tasks
    Simple,
    /// 11 to 25 tasks
    Medium,
    /// More than 25 tasks
    Complex,
}

impl std::fmt::Display for ComplexityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ComplexityCategory::Simple => "simple",
            ComplexityCategory::Medium => "medium",
            ComplexityCategory::Complex => "complex",
        })
    }
}

/// Classify a role by its task count alone
pub fn classify_complexity(total_tasks: usize) -> ComplexityCategory {
    if total_tasks <= SIMPLE_MAX_TASKS {
        ComplexityCategory::Simple
    } else if total_tasks <= MEDIUM_MAX_TASKS {
        ComplexityCategory::Medium
    } else {
        ComplexityCategory::Complex
    }
}

/// Full complexity analysis of one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    /// Aggregate counts
    pub metrics: ComplexityMetrics,
    /// Size class
    pub category: ComplexityCategory,
    /// One entry per integration type found
    pub integration_points: Vec<IntegrationPoint>,
    /// Ordered, pre-formatted advice
    pub recommendations: Vec<String>,
    /// Per-file breakdown, largest file first
    pub task_files_detail: Vec<FileComplexityDetail>,
    /// Conditional-heavy files and their dominant variables
    pub conditional_hotspots: Vec<ConditionalHotspot>,
    /// Where hotspot branching begins
    pub inflection_points: Vec<InflectionPoint>,
    /// Anti-pattern report, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_analysis: Option<PatternAnalysisReport>,
}

/// Produces complexity reports
pub struct ComplexityAnalyzer {
    config: AnalysisConfig,
    concerns: Option<ConcernRegistry>,
    phases: PhaseDetector,
    patterns: Option<PatternAnalyzer>,
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
            concerns: None,
            phases: PhaseDetector::default(),
            patterns: None,
        }
    }
}

impl ComplexityAnalyzer {
    /// Create an analyzer from a validated configuration
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            phases: PhaseDetector::new(config.phase_min_confidence)?,
            patterns: None,
            concerns: None,
            config,
        })
    }

    /// Use a custom concern registry instead of the built-in one
    pub fn with_concern_registry(mut self, registry: ConcernRegistry) -> Self {
        self.concerns = Some(registry);
        self
    }

    /// Use a custom phase detector
    pub fn with_phase_detector(mut self, detector: PhaseDetector) -> Self {
        self.phases = detector;
        self
    }

    /// Use a custom pattern analyzer when patterns are included
    pub fn with_pattern_analyzer(mut self, analyzer: PatternAnalyzer) -> Self {
        self.patterns = Some(analyzer);
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one role
    pub fn analyze(&self, role: &RoleRecord) -> ComplexityReport {
        let mut metrics = ComplexityMetrics::from_role(role);
        let category = classify_complexity(metrics.total_tasks);

        let integration_points = detect_integrations(role);
        metrics.external_integrations = integration_points.len();

        let file_analysis = files::FileAnalysis {
            concerns: self.concerns.as_ref().unwrap_or_else(|| builtin_registry()),
            concern_min_confidence: self.config.concern_min_confidence,
            phases: &self.phases,
        };
        let task_files_detail = file_analysis.describe_role(role);

        let conditional_hotspots = hotspots::detect_hotspots(role, &task_files_detail);
        let inflection_points = hotspots::detect_inflection_points(role, &conditional_hotspots);
        debug!(
            files = task_files_detail.len(),
            hotspots = conditional_hotspots.len(),
            inflection_points = inflection_points.len(),
            "collected file details"
        );

        let mut report = ComplexityReport {
            metrics,
            category,
            integration_points,
            recommendations: Vec::new(),
            task_files_detail,
            conditional_hotspots,
            inflection_points,
            pattern_analysis: None,
        };
        report.recommendations = generate_recommendations(role, &report);

        if self.config.include_patterns {
            report.pattern_analysis = self.pattern_analysis(role);
        }

        info!(
            "Analyzed role {}: {} tasks, {} complexity",
            role.name.as_deref().unwrap_or("<unnamed>"),
            report.metrics.total_tasks,
            report.category
        );
        report
    }

    fn pattern_analysis(&self, role: &RoleRecord) -> Option<PatternAnalysisReport> {
        if let Some(analyzer) = &self.patterns {
            return Some(analyzer.analyze(role));
        }
        match PatternAnalyzer::new(self.config.pattern_min_confidence) {
            Ok(analyzer) => Some(analyzer.analyze(role)),
            Err(e) => {
                warn!("Pattern analysis skipped: {:#}", e);
                None
            }
        }
    }
}

/// Analyze a role with the default configuration
pub fn analyze_role_complexity(role: &RoleRecord) -> Result<ComplexityReport> {
    Ok(ComplexityAnalyzer::new(AnalysisConfig::default())?.analyze(role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{Task, TaskFile};

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(classify_complexity(0), ComplexityCategory::Simple);
        assert_eq!(classify_complexity(10), ComplexityCategory::Simple);
        assert_eq!(classify_complexity(11), ComplexityCategory::Medium);
        assert_eq!(classify_complexity(25), ComplexityCategory::Medium);
        assert_eq!(classify_complexity(26), ComplexityCategory::Complex);
    }

    #[test]
    fn test_composition_score_is_linear() {
        for deps in 0..4 {
            for roles in 0..4 {
                for tasks in 0..4 {
                    let metrics = ComplexityMetrics {
                        role_dependencies: deps,
                        role_includes: roles,
                        task_includes: tasks,
                        ..ComplexityMetrics::default()
                    };
                    assert_eq!(metrics.composition_score(), 2 * deps + roles + tasks);
                }
            }
        }
    }

    #[test]
    fn test_metrics_from_role() {
        let mut role = RoleRecord::from_task_files(vec![
            TaskFile::new(
                "main.yml",
                vec![
                    Task::new("ansible.builtin.include_tasks").with("file", "a.yml"),
                    Task::new("include_role").with("role", "common"),
                    Task::new("debug").when("debug_enabled"),
                ],
            ),
            TaskFile::new("a.yml", vec![Task::new("command")]),
            TaskFile::new("empty.yml", vec![]),
        ]);
        role.tasks[1].tasks[0].rescue = Some(vec![Task::new("debug")]);
        role.handlers.push(Task::new("service"));
        role.meta.dependencies.push("common".into());

        let metrics = ComplexityMetrics::from_role(&role);
        assert_eq!(metrics.total_tasks, 4);
        assert_eq!(metrics.task_files, 3);
        assert_eq!(metrics.handlers, 1);
        assert_eq!(metrics.conditional_tasks, 1);
        assert_eq!(metrics.error_handlers, 1);
        assert_eq!(metrics.role_includes, 1);
        assert_eq!(metrics.task_includes, 1);
        assert_eq!(metrics.role_dependencies, 1);
        assert_eq!(metrics.composition_score(), 4);
        assert_eq!(metrics.max_tasks_per_file, 3);
        assert!((metrics.avg_tasks_per_file - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics.conditional_percentage(), 25.0);
    }

    #[test]
    fn test_literal_false_condition_is_not_counted() {
        let role = RoleRecord::from_value(
            serde_yaml::from_str(
                "tasks:\n  - file: main.yml\n    tasks:\n      - module: debug\n        when: false\n      - module: debug\n        when: flag\n",
            )
            .unwrap(),
        )
        .unwrap();
        let metrics = ComplexityMetrics::from_role(&role);
        assert_eq!(metrics.conditional_tasks, 1);
        assert_eq!(metrics.conditional_percentage(), 50.0);
    }

    #[test]
    fn test_locally_owned_analyzer_uses_builtin_concerns() {
        let role = RoleRecord::from_task_files(vec![TaskFile::new(
            "main.yml",
            (0..4).map(|_| Task::new("apt")).collect(),
        )]);

        let report = {
            let analyzer = ComplexityAnalyzer::default();
            analyzer.analyze(&role)
        };
        let primary = report.task_files_detail[0].primary_concern.as_ref().unwrap();
        assert_eq!(primary.concern_name, "package_installation");

        let analyzer = ComplexityAnalyzer::default().with_concern_registry(ConcernRegistry::new());
        let report = analyzer.analyze(&role);
        assert!(report.task_files_detail[0].primary_concern.is_none());
    }

    #[test]
    fn test_empty_role() {
        let report = analyze_role_complexity(&RoleRecord::default()).unwrap();
        assert_eq!(report.metrics.avg_tasks_per_file, 0.0);
        assert_eq!(report.metrics.conditional_percentage(), 0.0);
        assert_eq!(report.category, ComplexityCategory::Simple);
        assert_eq!(report.recommendations, vec![recommendations::WELL_MANAGED.to_string()]);
    }

    #[test]
    fn test_patterns_can_be_disabled() {
        let config = AnalysisConfig {
            include_patterns: false,
            ..AnalysisConfig::default()
        };
        let report = ComplexityAnalyzer::new(config)
            .unwrap()
            .analyze(&RoleRecord::default());
        assert!(report.pattern_analysis.is_none());

        let report = analyze_role_complexity(&RoleRecord::default()).unwrap();
        assert_eq!(report.pattern_analysis.unwrap().overall_health_score, 100);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AnalysisConfig {
            phase_min_confidence: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(ComplexityAnalyzer::new(config).is_err());
    }

    #[test]
    fn test_complex_role_without_files_gets_fallback() {
        let report = ComplexityReport {
            metrics: ComplexityMetrics {
                total_tasks: 30,
                ..ComplexityMetrics::default()
            },
            category: ComplexityCategory::Complex,
            integration_points: Vec::new(),
            recommendations: Vec::new(),
            task_files_detail: Vec::new(),
            conditional_hotspots: Vec::new(),
            inflection_points: Vec::new(),
            pattern_analysis: None,
        };
        let recommendations = generate_recommendations(&RoleRecord::default(), &report);
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].starts_with("📊 Complex role with 30 tasks"));
    }
}
