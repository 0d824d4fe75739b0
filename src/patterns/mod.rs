//! Anti-pattern analysis
//!
//! Independent [`PatternDetector`]s scan the whole role and emit
//! confidence-scored [`SimplificationSuggestion`]s. The [`PatternAnalyzer`]
//! runs them, drops suggestions below its minimum confidence, and folds the
//! rest into a 0–100 health score.
//!
//! Detector failures are isolated: a detector returning an error is logged and
//! contributes nothing, while the others still run.

use crate::config::{ensure_confidence, DEFAULT_PATTERN_MIN_CONFIDENCE};
use crate::role::RoleRecord;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

mod complexity;
mod duplication;
mod maintainability;
mod security;

pub use complexity::ComplexityDetector;
pub use duplication::DuplicationDetector;
pub use maintainability::MaintainabilityDetector;
pub use security::SecurityDetector;

/// Health score penalty per info-level suggestion
pub const INFO_PENALTY: i64 = 2;
/// Health score penalty per warning-level suggestion
pub const WARNING_PENALTY: i64 = 5;
/// Health score penalty per critical suggestion
pub const CRITICAL_PENALTY: i64 = 15;

/// What kind of problem a suggestion addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Repeated tasks that could be one
    Duplication,
    /// Hard-to-follow logic
    Complexity,
    /// Tasks that report changes on every run
    Idempotency,
    /// File and task layout
    Organization,
    /// Secrets and permissions
    Security,
    /// Run-time cost
    Performance,
    /// Long-term upkeep
    Maintainability,
    /// Failure handling
    ErrorHandling,
}

/// How urgent a suggestion is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing
    Info,
    /// Should be fixed
    Warning,
    /// Must be fixed
    Critical,
}

/// One detected anti-pattern with fix guidance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplificationSuggestion {
    /// Stable identifier of the anti-pattern
    pub pattern: String,
    /// Problem category
    pub category: PatternCategory,
    /// Urgency
    pub severity: Severity,
    /// What was found
    pub description: String,
    /// Offending or improved snippet
    pub example: String,
    /// How to fix it
    pub suggestion: String,
    /// Task files involved
    pub affected_files: BTreeSet<String>,
    /// Expected effect of the fix
    pub impact: String,
    /// Detector confidence in `[0, 1]`
    pub confidence: f64,
}

impl SimplificationSuggestion {
    /// Start a suggestion; the remaining fields are filled by the builder methods
    pub fn new(pattern: &str, category: PatternCategory, severity: Severity, confidence: f64) -> Self {
        Self {
            pattern: pattern.to_string(),
            category,
            severity,
            description: String::new(),
            example: String::new(),
            suggestion: String::new(),
            affected_files: BTreeSet::new(),
            impact: String::new(),
            confidence,
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the example
    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }

    /// Set the fix guidance
    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    /// Set the impact statement
    pub fn impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }

    /// Set the affected files
    pub fn affected_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// A stateless anti-pattern detector over a whole role
pub trait PatternDetector: Send + Sync {
    /// Detector name used in logs
    fn name(&self) -> &str;

    /// Scan the role for this detector's anti-patterns
    fn detect(&self, role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>>;
}

/// Aggregated pattern analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysisReport {
    /// Suggestions at or above the analyzer's minimum confidence
    pub suggestions: Vec<SimplificationSuggestion>,
    /// Number of suggestions
    pub total_patterns: usize,
    /// Suggestion count per severity
    pub by_severity: BTreeMap<Severity, usize>,
    /// Suggestion count per category
    pub by_category: BTreeMap<PatternCategory, usize>,
    /// 100 minus severity penalties, floored at 0
    pub overall_health_score: u32,
}

impl PatternAnalysisReport {
    /// Build the report from already-filtered suggestions
    pub fn from_suggestions(suggestions: Vec<SimplificationSuggestion>) -> Self {
        let mut by_severity = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for suggestion in &suggestions {
            *by_severity.entry(suggestion.severity).or_insert(0) += 1;
            *by_category.entry(suggestion.category).or_insert(0) += 1;
        }

        let count = |severity| by_severity.get(&severity).copied().unwrap_or(0);
        let overall_health_score = health_score(
            count(Severity::Info),
            count(Severity::Warning),
            count(Severity::Critical),
        );

        Self {
            total_patterns: suggestions.len(),
            suggestions,
            by_severity,
            by_category,
            overall_health_score,
        }
    }

    /// Number of suggestions with the given severity
    pub fn severity_count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// `100 - 2*info - 5*warning - 15*critical`, floored at 0
pub fn health_score(info: usize, warning: usize, critical: usize) -> u32 {
    let penalty = INFO_PENALTY * info as i64
        + WARNING_PENALTY * warning as i64
        + CRITICAL_PENALTY * critical as i64;
    (100 - penalty).max(0) as u32
}

/// The four built-in detectors
pub fn builtin_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(DuplicationDetector),
        Box::new(ComplexityDetector),
        Box::new(SecurityDetector),
        Box::new(MaintainabilityDetector),
    ]
}

/// Runs pattern detectors and aggregates their suggestions
pub struct PatternAnalyzer {
    detectors: Vec<Box<dyn PatternDetector>>,
    min_confidence: f64,
}

impl Default for PatternAnalyzer {
    /// All built-in detectors, no confidence filtering
    fn default() -> Self {
        Self {
            detectors: builtin_detectors(),
            min_confidence: 0.0,
        }
    }
}

impl PatternAnalyzer {
    /// Analyzer with all built-in detectors
    pub fn new(min_confidence: f64) -> Result<Self> {
        Self::with_detectors(builtin_detectors(), min_confidence)
    }

    /// Analyzer with a caller-supplied detector set
    pub fn with_detectors(detectors: Vec<Box<dyn PatternDetector>>, min_confidence: f64) -> Result<Self> {
        ensure_confidence("min_confidence", min_confidence)?;
        Ok(Self {
            detectors,
            min_confidence,
        })
    }

    /// Minimum confidence a suggestion needs to be reported
    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Run every detector over the role
    pub fn analyze(&self, role: &RoleRecord) -> PatternAnalysisReport {
        let mut suggestions = Vec::new();

        for detector in &self.detectors {
            match detector.detect(role) {
                Ok(found) => {
                    debug!(
                        detector = detector.name(),
                        suggestions = found.len(),
                        "pattern detector finished"
                    );
                    suggestions.extend(
                        found
                            .into_iter()
                            .filter(|s| s.confidence >= self.min_confidence),
                    );
                }
                Err(e) => {
                    warn!("Pattern detector {} failed: {:#}", detector.name(), e);
                }
            }
        }

        PatternAnalysisReport::from_suggestions(suggestions)
    }
}

/// Analyze a role with the built-in detectors at the default 0.7 threshold
pub fn analyze_role_patterns(role: &RoleRecord) -> PatternAnalysisReport {
    PatternAnalyzer {
        detectors: builtin_detectors(),
        min_confidence: DEFAULT_PATTERN_MIN_CONFIDENCE,
    }
    .analyze(role)
}

/// Analyze a role with the built-in detectors at a custom threshold
pub fn analyze_role_patterns_with_confidence(
    role: &RoleRecord,
    min_confidence: f64,
) -> Result<PatternAnalysisReport> {
    Ok(PatternAnalyzer::new(min_confidence)?.analyze(role))
}

/// Deduplicated, sorted file names
pub(crate) fn files_of<'a>(hits: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    hits.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{Task, TaskFile};

    struct FailingDetector;

    impl PatternDetector for FailingDetector {
        fn name(&self) -> &str {
            "failing"
        }
        fn detect(&self, _role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>> {
            anyhow::bail!("detector exploded")
        }
    }

    struct FixedDetector(Vec<SimplificationSuggestion>);

    impl PatternDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>> {
            Ok(self.0.clone())
        }
    }

    fn suggestion(severity: Severity, confidence: f64) -> SimplificationSuggestion {
        SimplificationSuggestion::new("test", PatternCategory::Maintainability, severity, confidence)
    }

    fn repetitive_role() -> RoleRecord {
        let tasks = (0..8)
            .map(|i| Task::new("apt").named(&format!("Install package {}", i)))
            .collect();
        RoleRecord::from_task_files(vec![TaskFile::new("main.yml", tasks)])
    }

    #[test]
    fn test_health_score_formula_and_floor() {
        assert_eq!(health_score(0, 0, 0), 100);
        assert_eq!(health_score(1, 1, 1), 100 - 2 - 5 - 15);
        assert_eq!(health_score(3, 2, 0), 84);
        assert_eq!(health_score(0, 0, 7), 0);
        assert_eq!(health_score(50, 50, 50), 0);
    }

    #[test]
    fn test_failing_detector_is_isolated() {
        let detectors: Vec<Box<dyn PatternDetector>> = vec![
            Box::new(DuplicationDetector),
            Box::new(FailingDetector),
            Box::new(ComplexityDetector),
            Box::new(FixedDetector(vec![suggestion(Severity::Warning, 0.9)])),
        ];
        let analyzer = PatternAnalyzer::with_detectors(detectors, 0.0).unwrap();
        let report = analyzer.analyze(&repetitive_role());

        assert!(report
            .suggestions
            .iter()
            .any(|s| s.pattern == "repeated_package_install"));
        assert!(report.suggestions.iter().any(|s| s.pattern == "test"));
    }

    #[test]
    fn test_min_confidence_filters_suggestions() {
        let detectors: Vec<Box<dyn PatternDetector>> = vec![Box::new(FixedDetector(vec![
            suggestion(Severity::Info, 0.5),
            suggestion(Severity::Critical, 0.75),
        ]))];
        let report = PatternAnalyzer::with_detectors(detectors, 0.7)
            .unwrap()
            .analyze(&RoleRecord::default());

        assert_eq!(report.total_patterns, 1);
        assert_eq!(report.severity_count(Severity::Critical), 1);
        assert_eq!(report.severity_count(Severity::Info), 0);
        assert_eq!(report.overall_health_score, 85);
        assert_eq!(report.by_category.get(&PatternCategory::Maintainability), Some(&1));
    }

    #[test]
    fn test_default_analyzer_does_not_filter() {
        let analyzer = PatternAnalyzer::default();
        assert_eq!(analyzer.min_confidence(), 0.0);
        assert_eq!(PatternAnalyzer::new(0.7).unwrap().min_confidence(), 0.7);
    }

    #[test]
    fn test_invalid_min_confidence_is_rejected() {
        assert!(PatternAnalyzer::new(1.01).is_err());
        assert!(analyze_role_patterns_with_confidence(&RoleRecord::default(), -1.0).is_err());
    }

    #[test]
    fn test_facade_uses_stricter_default() {
        let report = analyze_role_patterns(&repetitive_role());
        assert!(report.suggestions.iter().all(|s| s.confidence >= 0.7));
    }

    #[test]
    fn test_report_serializes_severity_keys() {
        let report = PatternAnalysisReport::from_suggestions(vec![suggestion(Severity::Warning, 1.0)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["by_severity"]["warning"], 1);
        assert_eq!(json["overall_health_score"], 95);
    }
}
