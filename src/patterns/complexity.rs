//! Conditions, include chains and fact juggling that make a role hard to follow

use super::{files_of, PatternCategory, PatternDetector, Severity, SimplificationSuggestion};
use crate::includes::IncludeGraph;
use crate::role::{RoleRecord, Task};
use anyhow::Result;

const MAX_OR_OPERATORS: usize = 2;
const MAX_AND_OPERATORS: usize = 3;
const MAX_TOTAL_OPERATORS: usize = 5;

/// Include chains deeper than this are flagged
pub const MAX_INCLUDE_DEPTH: usize = 3;

const SET_FACT_MIN_COUNT: usize = 5;
const SET_FACT_MAX_SHARE: f64 = 0.15;

/// Finds complex conditions, deep include chains and heavy `set_fact` use
pub struct ComplexityDetector;

impl PatternDetector for ComplexityDetector {
    fn name(&self) -> &str {
        "complexity"
    }

    fn detect(&self, role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>> {
        let mut suggestions = complex_conditionals(role);
        suggestions.extend(deep_include_chain(role));
        suggestions.extend(excessive_set_fact(role));
        Ok(suggestions)
    }
}

/// `(or, and)` operator counts of a condition, case-insensitive
pub fn operator_counts(condition: &str) -> (usize, usize) {
    let lower = condition.to_lowercase();
    (lower.matches(" or ").count(), lower.matches(" and ").count())
}

/// Whether a condition has too many boolean operators to read at a glance
pub fn is_complex_condition(condition: &str) -> bool {
    let (ors, ands) = operator_counts(condition);
    ors > MAX_OR_OPERATORS || ands > MAX_AND_OPERATORS || ors + ands > MAX_TOTAL_OPERATORS
}

fn complex_conditionals(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    role.all_tasks()
        .filter_map(|(file, task)| {
            let condition = task.condition_text()?;
            if !is_complex_condition(&condition) {
                return None;
            }
            let (ors, ands) = operator_counts(&condition);
            let label = task.name.as_deref().unwrap_or(task.module.as_str());
            Some(
                SimplificationSuggestion::new(
                    "complex_conditional",
                    PatternCategory::Complexity,
                    Severity::Info,
                    0.85,
                )
                .description(format!(
                    "Task '{}' in {} has a condition with {} `or` and {} `and` operators",
                    label, file.file, ors, ands
                ))
                .example(format!("when: {}", condition))
                .suggestion(
                    "Move the condition into a descriptively named variable or split the task by case",
                )
                .affected_files([file.file.clone()])
                .impact("Conditions become readable and testable on their own"),
            )
        })
        .collect()
}

fn deep_include_chain(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let main = role.main_task_file()?;
    let graph = IncludeGraph::from_role(role);
    let depth = graph.depth_from(&main.base_name());
    if depth <= MAX_INCLUDE_DEPTH {
        return None;
    }

    Some(
        SimplificationSuggestion::new(
            "deep_include_chain",
            PatternCategory::Organization,
            Severity::Warning,
            0.9,
        )
        .description(format!(
            "Include chain from {} is {} levels deep",
            main.file, depth
        ))
        .example("main.yml -> a.yml -> b.yml -> c.yml -> d.yml")
        .suggestion(format!(
            "Flatten includes to at most {} levels; include leaf files directly from main.yml",
            MAX_INCLUDE_DEPTH
        ))
        .affected_files(graph.sources().map(str::to_string))
        .impact(format!(
            "Execution flow becomes traceable ({} -> {} levels)",
            depth, MAX_INCLUDE_DEPTH
        )),
    )
}

fn is_set_fact(task: &Task) -> bool {
    task.short_module() == "set_fact"
}

fn excessive_set_fact(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let total = role.total_tasks();
    let count = role.all_tasks().filter(|(_, t)| is_set_fact(t)).count();
    if total == 0 || count <= SET_FACT_MIN_COUNT {
        return None;
    }
    let share = count as f64 / total as f64;
    if share <= SET_FACT_MAX_SHARE {
        return None;
    }

    Some(
        SimplificationSuggestion::new(
            "excessive_set_fact",
            PatternCategory::Complexity,
            Severity::Info,
            0.75,
        )
        .description(format!(
            "{} of {} tasks ({:.0}%) are set_fact",
            count,
            total,
            share * 100.0
        ))
        .example("vars:\n  app_url: \"http://{{ app_host }}:{{ app_port }}\"")
        .suggestion("Compute derived values in defaults/ or vars/ instead of at run time")
        .affected_files(files_of(
            role.all_tasks()
                .filter(|(_, t)| is_set_fact(t))
                .map(|(f, _)| f.file.as_str()),
        ))
        .impact(format!("Removes up to {} run-time tasks", count)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::TaskFile;

    #[test]
    fn test_condition_thresholds() {
        assert!(!is_complex_condition("a or b or c"));
        assert!(is_complex_condition("a or b or c or d"));
        assert!(!is_complex_condition("a and b and c and d"));
        assert!(is_complex_condition("a AND b and c and d and e"));
        assert!(!is_complex_condition("a or b or c and d and e"));
        assert!(is_complex_condition("a or b and c and d and e and f"));
        assert_eq!(operator_counts("x OR y Or z"), (2, 0));
        assert_eq!(operator_counts("sort_order == 1"), (0, 0));
    }

    #[test]
    fn test_complex_conditional_suggestion() {
        let role = RoleRecord::from_task_files(vec![TaskFile::new(
            "main.yml",
            vec![
                Task::new("debug").named("noisy").when("a or b or c or d"),
                Task::new("debug").when("a and b"),
            ],
        )]);
        let found = ComplexityDetector.detect(&role).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern, "complex_conditional");
        assert_eq!(found[0].confidence, 0.85);
        assert!(found[0].description.contains("noisy"));
    }

    fn include(file: &str) -> Task {
        Task::new("include_tasks").with("file", file)
    }

    #[test]
    fn test_deep_include_chain() {
        let chain = |depth: usize| {
            let mut files = vec![TaskFile::new("main.yml", vec![include("f1.yml")])];
            for i in 1..depth {
                files.push(TaskFile::new(&format!("f{}.yml", i), vec![include(&format!("f{}.yml", i + 1))]));
            }
            RoleRecord::from_task_files(files)
        };

        let found = ComplexityDetector.detect(&chain(4)).unwrap();
        let deep: Vec<_> = found.iter().filter(|s| s.pattern == "deep_include_chain").collect();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].severity, Severity::Warning);
        assert_eq!(deep[0].confidence, 0.9);

        let found = ComplexityDetector.detect(&chain(3)).unwrap();
        assert!(found.iter().all(|s| s.pattern != "deep_include_chain"));
    }

    #[test]
    fn test_include_cycle_terminates() {
        let role = RoleRecord::from_task_files(vec![
            TaskFile::new("main.yml", vec![include("a.yml")]),
            TaskFile::new("a.yml", vec![include("main.yml")]),
        ]);
        let found = ComplexityDetector.detect(&role).unwrap();
        assert!(found.iter().all(|s| s.pattern != "deep_include_chain"));
    }

    #[test]
    fn test_set_fact_share() {
        let mut tasks: Vec<Task> = (0..6).map(|_| Task::new("set_fact")).collect();
        tasks.extend((0..30).map(|_| Task::new("debug")));
        let role = RoleRecord::from_task_files(vec![TaskFile::new("main.yml", tasks)]);
        let found = ComplexityDetector.detect(&role).unwrap();
        assert_eq!(found.iter().filter(|s| s.pattern == "excessive_set_fact").count(), 1);

        // 6 of 40 is exactly 15%
        let mut tasks: Vec<Task> = (0..6).map(|_| Task::new("ansible.builtin.set_fact")).collect();
        tasks.extend((0..34).map(|_| Task::new("debug")));
        let role = RoleRecord::from_task_files(vec![TaskFile::new("main.yml", tasks)]);
        let found = ComplexityDetector.detect(&role).unwrap();
        assert!(found.iter().all(|s| s.pattern != "excessive_set_fact"));
    }
}
