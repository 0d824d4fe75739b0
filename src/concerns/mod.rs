//! Concern detection
//!
//! A concern is the responsibility a group of tasks collectively serves:
//! installing packages, managing configuration files, running services, and so
//! on. Each [`ConcernDetector`] recognizes one concern from task module names.
//! The [`ConcernRegistry`] runs a set of detectors over a task list and ranks
//! the results by confidence.
//!
//! Module patterns support three match modes, all case-insensitive:
//! - `apt` matches the module `apt` exactly
//! - `win_` matches any module starting with `win_`
//! - `_service` matches any module ending with `_service`
//!
//! Namespaced modules are matched on their last segment, so
//! `ansible.windows.win_service` is tested as `win_service`.

use crate::config::ensure_confidence;
use crate::role::{short_module_name, Task};
use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

mod builtin;

pub use builtin::{builtin_detectors, PatternConcern, BUILTIN_CONCERNS};

/// Default detector priority
pub const DEFAULT_PRIORITY: u32 = 50;

/// Result of running one concern detector over a task list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcernMatch {
    /// Stable identifier of the concern
    pub concern_name: String,
    /// Share of tasks matching the concern, `task_count / total`
    pub confidence: f64,
    /// Number of matching tasks
    pub task_count: usize,
    /// Distinct module names that matched
    pub matched_modules: BTreeSet<String>,
    /// Indices of the matching tasks in input order
    pub task_indices: Vec<usize>,
    /// Human-readable concern name
    pub display_name: String,
    /// What the concern covers
    pub description: String,
    /// File name suggested when splitting the concern out
    pub suggested_filename: String,
}

/// A rule-based recognizer for one concern
pub trait ConcernDetector: Send + Sync {
    /// Stable identifier, e.g. `package_installation`
    fn concern_name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Short description of the concern
    fn description(&self) -> &str;

    /// Module patterns recognized by this detector
    fn module_patterns(&self) -> &[&str];

    /// File name suggested for tasks of this concern
    fn suggested_filename(&self) -> String {
        format!("{}.yml", self.concern_name())
    }

    /// Lower values are more specific
    ///
    /// Reserved for resolving overlapping concerns; the registry does not
    /// consult it yet.
    fn priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }

    /// Whether a module name belongs to this concern
    fn matches_module(&self, module_name: &str) -> bool {
        let module = short_module_name(module_name);
        self.module_patterns()
            .iter()
            .any(|pattern| module_matches_pattern(&module, pattern))
    }

    /// Count the tasks belonging to this concern
    fn detect(&self, tasks: &[Task]) -> ConcernMatch {
        let mut matched_modules = BTreeSet::new();
        let mut task_indices = Vec::new();

        for (index, task) in tasks.iter().enumerate() {
            if !task.module.is_empty() && self.matches_module(&task.module) {
                matched_modules.insert(task.module.clone());
                task_indices.push(index);
            }
        }

        let confidence = if tasks.is_empty() {
            0.0
        } else {
            task_indices.len() as f64 / tasks.len() as f64
        };

        ConcernMatch {
            concern_name: self.concern_name().to_string(),
            confidence,
            task_count: task_indices.len(),
            matched_modules,
            task_indices,
            display_name: self.display_name().to_string(),
            description: self.description().to_string(),
            suggested_filename: self.suggested_filename(),
        }
    }
}

/// Test an already-shortened module name against one pattern
pub fn module_matches_pattern(module: &str, pattern: &str) -> bool {
    let module = module.to_lowercase();
    let pattern = pattern.to_lowercase();
    if pattern.ends_with('_') {
        module.starts_with(&pattern)
    } else if pattern.starts_with('_') {
        module.ends_with(&pattern)
    } else {
        module == pattern
    }
}

/// Ordered collection of concern detectors
pub struct ConcernRegistry {
    detectors: Vec<Box<dyn ConcernDetector>>,
}

impl Default for ConcernRegistry {
    fn default() -> Self {
        Self::with_builtin_detectors()
    }
}

impl ConcernRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Create a registry holding the ten built-in detectors
    pub fn with_builtin_detectors() -> Self {
        Self {
            detectors: builtin_detectors(),
        }
    }

    /// Register an additional detector after the existing ones
    pub fn register(&mut self, detector: Box<dyn ConcernDetector>) {
        self.detectors.push(detector);
    }

    /// Registered detectors in registration order
    pub fn detectors(&self) -> &[Box<dyn ConcernDetector>] {
        &self.detectors
    }

    /// Look up a detector by concern name
    pub fn get_detector(&self, concern_name: &str) -> Option<&dyn ConcernDetector> {
        self.detectors
            .iter()
            .find(|d| d.concern_name() == concern_name)
            .map(|d| d.as_ref())
    }

    /// Run every detector and rank the concerns that matched at least one task
    ///
    /// Sorting is stable, so equally confident concerns keep registration order.
    pub fn detect_all(&self, tasks: &[Task]) -> Vec<ConcernMatch> {
        let mut matches: Vec<ConcernMatch> = self
            .detectors
            .iter()
            .map(|detector| detector.detect(tasks))
            .filter(|m| m.task_count > 0)
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches
    }

    /// The highest-ranked concern, if it reaches `min_confidence`
    pub fn detect_primary_concern(
        &self,
        tasks: &[Task],
        min_confidence: f64,
    ) -> Result<Option<ConcernMatch>> {
        ensure_confidence("min_confidence", min_confidence)?;
        Ok(self
            .detect_all(tasks)
            .into_iter()
            .next()
            .filter(|m| m.confidence >= min_confidence))
    }
}

static BUILTIN_REGISTRY: Lazy<ConcernRegistry> = Lazy::new(ConcernRegistry::with_builtin_detectors);

/// The process-wide registry of built-in detectors, built on first use
pub fn builtin_registry() -> &'static ConcernRegistry {
    &BUILTIN_REGISTRY
}

/// Rank concerns using the built-in detectors
pub fn detect_all_concerns(tasks: &[Task]) -> Vec<ConcernMatch> {
    BUILTIN_REGISTRY.detect_all(tasks)
}

/// Primary concern using the built-in detectors
pub fn detect_primary_concern(tasks: &[Task], min_confidence: f64) -> Result<Option<ConcernMatch>> {
    BUILTIN_REGISTRY.detect_primary_concern(tasks, min_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(modules: &[&str]) -> Vec<Task> {
        modules.iter().map(|m| Task::new(m)).collect()
    }

    struct ThirdPartyConcern;

    impl ConcernDetector for ThirdPartyConcern {
        fn concern_name(&self) -> &str {
            "certificates"
        }
        fn display_name(&self) -> &str {
            "Certificates"
        }
        fn description(&self) -> &str {
            "TLS certificate management"
        }
        fn module_patterns(&self) -> &[&str] {
            &["openssl_", "acme_certificate"]
        }
    }

    #[test]
    fn test_pattern_match_modes() {
        assert!(module_matches_pattern("apt", "apt"));
        assert!(module_matches_pattern("APT", "apt"));
        assert!(!module_matches_pattern("apt_key", "apt"));
        assert!(module_matches_pattern("win_service", "win_"));
        assert!(module_matches_pattern("systemd_service", "_service"));
        assert!(!module_matches_pattern("service_facts", "_service"));
    }

    #[test]
    fn test_matches_module_strips_namespace() {
        let registry = ConcernRegistry::with_builtin_detectors();
        let windows = registry.get_detector("windows").unwrap();
        assert!(windows.matches_module("ansible.windows.win_feature"));
        assert!(!windows.matches_module("ansible.builtin.apt"));
    }

    #[test]
    fn test_detect_confidence_is_exact_ratio() {
        let registry = ConcernRegistry::with_builtin_detectors();
        let input = tasks(&["apt", "apt", "template", "service", "ansible.builtin.yum", "debug", "pip"]);
        let detector = registry.get_detector("package_installation").unwrap();
        let result = detector.detect(&input);

        assert_eq!(result.task_count, 4);
        assert_eq!(result.task_indices, vec![0, 1, 4, 6]);
        assert_eq!(result.confidence, 4.0 / 7.0);
        assert!((result.confidence * input.len() as f64 - result.task_count as f64).abs() < 1e-9);
        assert!(result.matched_modules.contains("ansible.builtin.yum"));
    }

    #[test]
    fn test_detect_empty_input() {
        let registry = ConcernRegistry::with_builtin_detectors();
        for detector in registry.detectors() {
            let result = detector.detect(&[]);
            assert_eq!(result.confidence, 0.0);
            assert_eq!(result.task_count, 0);
            assert!(result.task_indices.is_empty());
        }
        assert!(registry.detect_all(&[]).is_empty());
    }

    #[test]
    fn test_detect_all_sorted_and_filtered() {
        let input = tasks(&["template", "template", "template", "apt", "ping"]);
        let results = detect_all_concerns(&input);

        assert_eq!(results[0].concern_name, "configuration");
        assert_eq!(results[0].confidence, 0.6);
        assert!(results.iter().all(|m| m.task_count > 0));
        for pair in results.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_primary_concern_threshold() {
        let mostly_packages = tasks(&["apt", "apt", "apt", "template"]);
        let primary = detect_primary_concern(&mostly_packages, 0.6).unwrap().unwrap();
        assert_eq!(primary.concern_name, "package_installation");

        let mixed = tasks(&["apt", "template", "user", "service"]);
        assert!(detect_primary_concern(&mixed, 0.6).unwrap().is_none());
        assert!(detect_primary_concern(&mixed, 1.2).is_err());
    }

    #[test]
    fn test_custom_detector_registration() {
        let mut registry = ConcernRegistry::new();
        assert!(registry.get_detector("certificates").is_none());
        registry.register(Box::new(ThirdPartyConcern));

        let detector = registry.get_detector("certificates").unwrap();
        assert_eq!(detector.priority(), DEFAULT_PRIORITY);
        assert_eq!(detector.suggested_filename(), "certificates.yml");

        let input = tasks(&["community.crypto.openssl_privatekey", "acme_certificate", "copy"]);
        let results = registry.detect_all(&input);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task_count, 2);
    }

    #[test]
    fn test_builtin_registry_is_shared() {
        let first = builtin_registry() as *const ConcernRegistry;
        let second = builtin_registry() as *const ConcernRegistry;
        assert_eq!(first, second);
        assert_eq!(builtin_registry().detectors().len(), 10);
    }
}
