//! Idempotency gaps, oversized entry points, magic values and variable drift

use super::{files_of, PatternCategory, PatternDetector, Severity, SimplificationSuggestion};
use crate::role::{RoleRecord, Task, TaskFile};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

const COMMAND_MODULES: &[&str] = &["shell", "command", "raw"];
const PIPE_MODULES: &[&str] = &["shell", "command"];
const CHECKING_MODULES: &[&str] = &["shell", "command", "stat"];

/// `main.yml` with more tasks than this is flagged
pub const MAX_MAIN_TASKS: usize = 30;

/// Shortest literal considered a magic value
const MAGIC_MIN_LEN: usize = 10;
/// Distinct files a literal must appear in to be flagged
const MAGIC_MIN_FILES: usize = 3;
/// Generic words that make a literal descriptive text rather than a value
const MAGIC_STOPWORDS: &[&str] = &[
    "install", "configure", "ensure", "create", "remove", "update", "enable", "start", "restart",
    "check",
];

static JINJA_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{.*?\}\}").expect("valid jinja expression regex"));

/// Finds tasks and variables that are costly to maintain
pub struct MaintainabilityDetector;

impl PatternDetector for MaintainabilityDetector {
    fn name(&self) -> &str {
        "maintainability"
    }

    fn detect(&self, role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>> {
        let mut suggestions = Vec::new();
        suggestions.extend(non_idempotent_commands(role));
        suggestions.extend(oversized_main(role));
        suggestions.extend(magic_values(role));
        suggestions.extend(unchecked_registered_results(role));
        suggestions.extend(unguarded_pipes(role));
        suggestions.extend(duplicated_variables(role));
        Ok(suggestions)
    }
}

fn has_module(task: &Task, modules: &[&str]) -> bool {
    modules.contains(&task.short_module().as_str())
}

fn label(task: &Task) -> String {
    task.name.clone().unwrap_or_else(|| task.module.clone())
}

fn non_idempotent_commands(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let offenders: Vec<(&TaskFile, &Task)> = role
        .all_tasks()
        .filter(|(_, task)| has_module(task, COMMAND_MODULES))
        .filter(|(_, task)| {
            let guarded = task.has_param("creates") || task.has_param("removes");
            !guarded && !task.has_param("changed_when")
        })
        .collect();
    if offenders.is_empty() {
        return None;
    }

    Some(
        SimplificationSuggestion::new(
            "non_idempotent_command",
            PatternCategory::Idempotency,
            Severity::Warning,
            0.9,
        )
        .description(format!(
            "{} command tasks report a change on every run: {}",
            offenders.len(),
            offenders.iter().map(|(_, t)| label(t)).collect::<Vec<_>>().join(", ")
        ))
        .example("- command: ./configure\n  args:\n    creates: /opt/app/Makefile")
        .suggestion("Add `creates`/`removes`, or a `changed_when` that reflects what the command did")
        .affected_files(offenders.iter().map(|(f, _)| f.file.clone()))
        .impact("Repeated runs report accurate change status"),
    )
}

fn oversized_main(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let main = role.main_task_file()?;
    let count = main.tasks.len();
    if count <= MAX_MAIN_TASKS {
        return None;
    }

    Some(
        SimplificationSuggestion::new(
            "large_main_file",
            PatternCategory::Organization,
            Severity::Warning,
            0.95,
        )
        .description(format!("{} has {} tasks", main.file, count))
        .example("- import_tasks: install.yml\n- import_tasks: configure.yml\n- import_tasks: service.yml")
        .suggestion("Split main.yml into focused task files and import them")
        .affected_files([main.file.clone()])
        .impact(format!("main.yml shrinks from {} tasks to a short list of imports", count)),
    )
}

fn is_magic_candidate(text: &str) -> bool {
    if text.chars().count() < MAGIC_MIN_LEN || text.contains("{{") || text.contains("}}") {
        return false;
    }
    let lower = text.to_lowercase();
    !MAGIC_STOPWORDS.iter().any(|word| lower.contains(word))
}

fn magic_values(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let mut seen: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (file, task) in role.all_tasks() {
        for value in task.params.values() {
            let mut strings = Vec::new();
            collect_literals(value, &mut strings);
            for text in strings.into_iter().filter(|s| is_magic_candidate(s)) {
                seen.entry(text).or_default().insert(file.file.clone());
            }
        }
    }

    let repeated: Vec<(&String, &BTreeSet<String>)> = seen
        .iter()
        .filter(|(_, files)| files.len() >= MAGIC_MIN_FILES)
        .collect();
    if repeated.is_empty() {
        return None;
    }

    let values: Vec<String> = repeated.iter().map(|(text, _)| format!("\"{}\"", text)).collect();
    Some(
        SimplificationSuggestion::new(
            "magic_values",
            PatternCategory::Maintainability,
            Severity::Info,
            0.7,
        )
        .description(format!(
            "{} literal values repeat across {} or more files: {}",
            repeated.len(),
            MAGIC_MIN_FILES,
            values.join(", ")
        ))
        .example(format!("# defaults/main.yml\napp_value: {}", values[0]))
        .suggestion("Define each value once in defaults/main.yml and reference the variable")
        .affected_files(repeated.iter().flat_map(|(_, files)| files.iter().cloned()))
        .impact("A value changes in one place instead of several files"),
    )
}

fn collect_literals(value: &serde_yaml::Value, out: &mut Vec<String>) {
    use serde_yaml::Value;
    match value {
        Value::String(text) => out.push(text.clone()),
        Value::Sequence(items) => items.iter().for_each(|v| collect_literals(v, out)),
        Value::Mapping(map) => map.values().for_each(|v| collect_literals(v, out)),
        _ => {}
    }
}

/// Whether `text` mentions `variable` as a whole identifier
fn references_variable(text: &str, variable: &str) -> bool {
    text.match_indices(variable).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + variable.len()..].chars().next();
        let is_ident = |c: char| c.is_alphanumeric() || c == '_';
        !before.map(is_ident).unwrap_or(false) && !after.map(is_ident).unwrap_or(false)
    })
}

fn references_in(task: &Task, variable: &str) -> bool {
    task.condition_text()
        .into_iter()
        .chain(task.string_values())
        .any(|text| references_variable(&text, variable))
}

fn unchecked_registered_results(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let mut findings: Vec<(String, String)> = Vec::new();
    for file in &role.tasks {
        for (index, task) in file.tasks.iter().enumerate() {
            if task.has_param("check_mode") {
                continue;
            }
            let Some(variable) = task.registered_variable() else {
                continue;
            };
            let checked_later = file.tasks[index + 1..]
                .iter()
                .any(|later| has_module(later, CHECKING_MODULES) && references_in(later, &variable));
            if checked_later {
                findings.push((file.file.clone(), variable));
            }
        }
    }
    if findings.is_empty() {
        return None;
    }

    let variables: Vec<&str> = findings.iter().map(|(_, v)| v.as_str()).collect();
    Some(
        SimplificationSuggestion::new(
            "registered_without_check_mode",
            PatternCategory::Maintainability,
            Severity::Info,
            0.75,
        )
        .description(format!(
            "Registered results feed later command checks without check_mode: {}",
            variables.join(", ")
        ))
        .example("- stat:\n    path: /etc/app.conf\n  register: app_conf\n  check_mode: false")
        .suggestion("Mark probing tasks with `check_mode: false` so dry runs see real results")
        .affected_files(files_of(findings.iter().map(|(f, _)| f.as_str())))
        .impact("Dry runs follow the same branches as real runs"),
    )
}

/// Whether a command pipes outside of Jinja expressions
pub fn has_shell_pipe(command: &str) -> bool {
    JINJA_EXPRESSION.replace_all(command, "").contains('|')
}

fn unguarded_pipes(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let offenders: Vec<(&TaskFile, &Task)> = role
        .all_tasks()
        .filter(|(_, task)| has_module(task, PIPE_MODULES) && !task.has_param("failed_when"))
        .filter(|(_, task)| task.command_text().map(|c| has_shell_pipe(&c)).unwrap_or(false))
        .collect();
    if offenders.is_empty() {
        return None;
    }

    Some(
        SimplificationSuggestion::new(
            "pipe_without_failed_when",
            PatternCategory::ErrorHandling,
            Severity::Info,
            0.8,
        )
        .description(format!(
            "{} piped commands only report the exit status of the last command: {}",
            offenders.len(),
            offenders.iter().map(|(_, t)| label(t)).collect::<Vec<_>>().join(", ")
        ))
        .example("- shell: set -o pipefail && dmesg | grep error\n  failed_when: false")
        .suggestion("Use `set -o pipefail` and a `failed_when` that checks the real outcome")
        .affected_files(offenders.iter().map(|(f, _)| f.file.clone()))
        .impact("Failures early in a pipeline are no longer hidden"),
    )
}

fn duplicated_variables(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let defaults = role.default_variable_names();
    let vars = role.vars_variable_names();
    let shared: Vec<&String> = defaults.intersection(&vars).collect();
    if shared.is_empty() {
        return None;
    }

    let files = role
        .defaults
        .iter()
        .map(|s| format!("defaults/{}", s.file))
        .chain(role.vars.iter().map(|s| format!("vars/{}", s.file)));
    Some(
        SimplificationSuggestion::new(
            "duplicate_variables",
            PatternCategory::Maintainability,
            Severity::Warning,
            0.95,
        )
        .description(format!(
            "{} variables are defined in both defaults and vars: {}",
            shared.len(),
            shared.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ))
        .example("# keep overridable values in defaults/main.yml only")
        .suggestion("Keep each variable in one place; vars silently override defaults")
        .affected_files(files)
        .impact(format!("{} ambiguous definitions removed", shared.len())),
    )
}
