//! Conditional hotspots and the inflection points where they start

use super::files::FileComplexityDetail;
use crate::role::{base_name, RoleRecord, Task};
use crate::tally::Tally;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tokens of a condition that are operators or literals, never variables
const CONDITION_STOPWORDS: &[&str] = &["and", "or", "not", "is", "in", "true", "false", "defined"];

/// Downstream references needed before a branch start is an inflection point
pub const MIN_DOWNSTREAM_TASKS: usize = 3;

/// Branches assumed per inflection point
///
/// Not a real branch factor: the number of distinct values tested against the
/// variable is not computed.
pub const ASSUMED_BRANCH_COUNT: usize = 2;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z_][a-z0-9_]*\b").expect("valid identifier regex"));

/// A conditional-heavy file branching mostly on one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalHotspot {
    /// Task file
    pub file: String,
    /// Most frequent variable in the file's conditions
    pub conditional_variable: String,
    /// Tasks whose condition mentions the variable
    pub affected_tasks: usize,
    /// Canned restructuring advice
    pub suggestion: String,
}

/// First task where a hotspot variable starts steering many later tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflectionPoint {
    /// Task file
    pub file: String,
    /// Index of the first task conditioned on the variable
    pub task_index: usize,
    /// Name of that task, or its module when unnamed
    pub task_name: String,
    /// Hotspot variable
    pub variable: String,
    /// Later tasks also conditioned on the variable
    pub downstream_tasks: usize,
    /// Always [`ASSUMED_BRANCH_COUNT`]
    pub branch_count: usize,
}

/// Variable-like tokens of a condition, in order, stopwords removed
pub fn condition_variables(condition: &str) -> Vec<String> {
    IDENTIFIER
        .find_iter(condition)
        .map(|m| m.as_str())
        .filter(|token| !CONDITION_STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Split advice keyed on what the variable name suggests
pub fn split_suggestion(variable: &str, file: &str) -> String {
    let base = base_name(file);
    let stem = base
        .strip_suffix(".yml")
        .or_else(|| base.strip_suffix(".yaml"))
        .unwrap_or(&base);

    if variable.contains("os_family") || variable.contains("distribution") {
        format!(
            "Split {} by operating system into {}_debian.yml, {}_redhat.yml, ... and include the right one with include_tasks: \"{}_{{{{ {} | lower }}}}.yml\"",
            base, stem, stem, stem, variable
        )
    } else if variable.contains("environment") || variable.contains("env") {
        format!(
            "Split {} by environment into {}_production.yml, {}_staging.yml, ... selected with include_tasks on {}",
            base, stem, stem, variable
        )
    } else if variable.contains("mode") || variable.contains("strategy") {
        format!(
            "Split {} by {} into one task file per value, selected with include_tasks: \"{}_{{{{ {} }}}}.yml\"",
            base, variable, stem, variable
        )
    } else {
        format!(
            "Extract the tasks conditional on {} from {} into a separate file included once with when: {}",
            variable, base, variable
        )
    }
}

fn hotspot_for(file: &str, tasks: &[Task]) -> Option<ConditionalHotspot> {
    let conditions: Vec<String> = tasks.iter().filter_map(Task::condition_text).collect();
    let tally = Tally::from_items(conditions.iter().flat_map(|c| condition_variables(c)));
    let (variable, _) = tally.most_common()?;
    let affected_tasks = conditions.iter().filter(|c| references(c, variable)).count();

    Some(ConditionalHotspot {
        file: file.to_string(),
        conditional_variable: variable.to_string(),
        affected_tasks,
        suggestion: split_suggestion(variable, file),
    })
}

/// One hotspot per conditional-heavy file, most affected tasks first
pub fn detect_hotspots(role: &RoleRecord, details: &[FileComplexityDetail]) -> Vec<ConditionalHotspot> {
    let mut hotspots: Vec<ConditionalHotspot> = details
        .iter()
        .filter(|detail| detail.is_conditional_heavy)
        .filter_map(|detail| {
            let file = role.tasks.iter().find(|f| f.file == detail.file)?;
            hotspot_for(&file.file, &file.tasks)
        })
        .collect();
    hotspots.sort_by(|a, b| b.affected_tasks.cmp(&a.affected_tasks));
    hotspots
}

/// Whether `condition` uses `variable` as a whole identifier
pub fn references(condition: &str, variable: &str) -> bool {
    condition_variables(condition).iter().any(|v| v == variable)
}

fn mentions(task: &Task, variable: &str) -> bool {
    task.condition_text()
        .map(|c| references(&c, variable))
        .unwrap_or(false)
}

/// First qualifying inflection point of each hotspot
pub fn detect_inflection_points(role: &RoleRecord, hotspots: &[ConditionalHotspot]) -> Vec<InflectionPoint> {
    let mut points = Vec::new();
    for hotspot in hotspots {
        let Some(file) = role.tasks.iter().find(|f| f.file == hotspot.file) else {
            continue;
        };
        let variable = hotspot.conditional_variable.as_str();

        for (index, task) in file.tasks.iter().enumerate() {
            if !mentions(task, variable) {
                continue;
            }
            let downstream_tasks = file.tasks[index + 1..]
                .iter()
                .filter(|later| mentions(later, variable))
                .count();
            if downstream_tasks >= MIN_DOWNSTREAM_TASKS {
                points.push(InflectionPoint {
                    file: file.file.clone(),
                    task_index: index,
                    task_name: task.name.clone().unwrap_or_else(|| task.module.clone()),
                    variable: variable.to_string(),
                    downstream_tasks,
                    branch_count: ASSUMED_BRANCH_COUNT,
                });
                break;
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::files::FileAnalysis;
    use crate::concerns::builtin_registry;
    use crate::phases::PhaseDetector;
    use crate::role::TaskFile;

    fn details(role: &RoleRecord) -> Vec<FileComplexityDetail> {
        let phases = PhaseDetector::default();
        FileAnalysis {
            concerns: builtin_registry(),
            concern_min_confidence: 0.6,
            phases: &phases,
        }
        .describe_role(role)
    }

    fn os_role() -> RoleRecord {
        let mut tasks = vec![Task::new("debug").named("Banner")];
        for i in 0..4 {
            tasks.push(Task::new("apt").named(&format!("Debian {}", i)).when("ansible_os_family == 'Debian'"));
            tasks.push(Task::new("yum").named(&format!("RedHat {}", i)).when("ansible_os_family == 'RedHat' and use_epel"));
        }
        RoleRecord::from_task_files(vec![
            TaskFile::new("packages.yml", tasks),
            TaskFile::new("main.yml", vec![Task::new("debug").when("x is defined")]),
        ])
    }

    #[test]
    fn test_condition_variables() {
        assert_eq!(
            condition_variables("ansible_os_family == 'Debian' and not app_enabled"),
            vec!["ansible_os_family".to_string(), "app_enabled".to_string()]
        );
        assert_eq!(condition_variables("x is defined"), vec!["x".to_string()]);
        assert!(condition_variables("true").is_empty());
    }

    #[test]
    fn test_hotspot_detection() {
        let role = os_role();
        let hotspots = detect_hotspots(&role, &details(&role));
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].file, "packages.yml");
        assert_eq!(hotspots[0].conditional_variable, "ansible_os_family");
        assert_eq!(hotspots[0].affected_tasks, 8);
        assert!(hotspots[0].suggestion.contains("operating system"));
    }

    #[test]
    fn test_inflection_point_stops_at_first() {
        let role = os_role();
        let hotspots = detect_hotspots(&role, &details(&role));
        let points = detect_inflection_points(&role, &hotspots);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].task_index, 1);
        assert_eq!(points[0].task_name, "Debian 0");
        assert_eq!(points[0].downstream_tasks, 7);
        assert_eq!(points[0].branch_count, 2);
    }

    #[test]
    fn test_inflection_needs_three_downstream_tasks() {
        let hotspot = ConditionalHotspot {
            file: "main.yml".to_string(),
            conditional_variable: "flag".to_string(),
            affected_tasks: 3,
            suggestion: String::new(),
        };
        let role = RoleRecord::from_task_files(vec![TaskFile::new(
            "main.yml",
            (0..3).map(|_| Task::new("debug").when("flag")).collect(),
        )]);
        assert!(detect_inflection_points(&role, &[hotspot]).is_empty());
    }

    #[test]
    fn test_variable_matches_whole_identifiers_only() {
        assert!(references("env == 'prod'", "env"));
        assert!(!references("environment == 'prod'", "env"));
        assert!(!references("deploy_env is defined", "env"));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            tasks.push(Task::new("debug").when("env == 'Prod'"));
        }
        for _ in 0..3 {
            tasks.push(Task::new("debug").when("environment == 'Prod'"));
        }
        let role = RoleRecord::from_task_files(vec![TaskFile::new("main.yml", tasks)]);
        let hotspots = detect_hotspots(&role, &details(&role));
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].conditional_variable, "env");
        assert_eq!(hotspots[0].affected_tasks, 4);

        let points = detect_inflection_points(&role, &hotspots);
        assert_eq!(points[0].task_index, 0);
        assert_eq!(points[0].downstream_tasks, 3);
    }

    #[test]
    fn test_split_suggestions() {
        assert!(split_suggestion("ansible_distribution", "tasks/setup.yml").contains("setup_debian.yml"));
        assert!(split_suggestion("deploy_env", "main.yml").contains("by environment"));
        assert!(split_suggestion("install_mode", "main.yml").contains("by install_mode"));
        assert!(split_suggestion("use_tls", "web.yml").starts_with("Extract the tasks conditional on use_tls from web.yml"));
    }
}
