//! Repeated tasks that a loop or an abstraction would collapse

use super::{files_of, PatternCategory, PatternDetector, Severity, SimplificationSuggestion};
use crate::role::{RoleRecord, Task, TaskFile};
use crate::tally::Tally;
use anyhow::Result;

/// Package manager modules whose tasks accept a list of packages
const PACKAGE_MODULES: &[&str] = &[
    "apt",
    "yum",
    "dnf",
    "package",
    "pip",
    "apk",
    "zypper",
    "pacman",
    "homebrew",
    "npm",
    "gem",
    "win_chocolatey",
];

const SERVICE_MODULES: &[&str] = &["service", "systemd", "systemd_service"];

/// Keys that turn a task into a loop
const LOOP_KEYS: &[&str] = &["loop", "with_items", "with_list", "with_dict", "with_fileglob"];

/// More repeated tasks than this triggers a suggestion
const REPETITION_THRESHOLD: usize = 5;
/// More service tasks sharing one state than this triggers a suggestion
const SHARED_STATE_THRESHOLD: usize = 3;
/// More directory-creating file tasks than this triggers a suggestion
const DIRECTORY_THRESHOLD: usize = 4;

/// Finds repeated package, service, directory and similarly named tasks
pub struct DuplicationDetector;

impl PatternDetector for DuplicationDetector {
    fn name(&self) -> &str {
        "duplication"
    }

    fn detect(&self, role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>> {
        let mut suggestions = Vec::new();
        suggestions.extend(repeated_package_installs(role));
        suggestions.extend(repeated_service_tasks(role));
        suggestions.extend(repeated_directory_tasks(role));
        suggestions.extend(similar_task_names(role));
        Ok(suggestions)
    }
}

fn is_looped(task: &Task) -> bool {
    LOOP_KEYS.iter().any(|key| task.has_param(key))
}

fn tasks_with_module<'a>(
    role: &'a RoleRecord,
    modules: &'static [&'static str],
) -> impl Iterator<Item = (&'a TaskFile, &'a Task)> {
    role.all_tasks()
        .filter(move |(_, task)| modules.contains(&task.short_module().as_str()))
}

fn repeated_package_installs(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    let mut counts = Tally::default();
    for (_, task) in tasks_with_module(role, PACKAGE_MODULES) {
        if !is_looped(task) {
            counts.add(task.short_module());
        }
    }

    counts
        .iter()
        .filter(|(_, count)| *count > REPETITION_THRESHOLD)
        .map(|(module, count)| {
            let files = files_of(
                role.all_tasks()
                    .filter(|(_, t)| t.short_module() == module && !is_looped(t))
                    .map(|(f, _)| f.file.as_str()),
            );
            SimplificationSuggestion::new(
                "repeated_package_install",
                PatternCategory::Duplication,
                Severity::Warning,
                0.9,
            )
            .description(format!(
                "{} separate `{}` tasks install packages one at a time",
                count, module
            ))
            .example(format!(
                "- name: Install packages\n  {}:\n    name: \"{{{{ item }}}}\"\n  loop: \"{{{{ packages }}}}\"",
                module
            ))
            .suggestion(format!(
                "Install all packages in one `{}` task with a list or a loop over a variable",
                module
            ))
            .affected_files(files)
            .impact(format!(
                "Reduce from {} tasks to 1 (-{} tasks)",
                count,
                count - 1
            ))
        })
        .collect()
}

fn repeated_service_tasks(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    let services: Vec<(&TaskFile, &Task)> = tasks_with_module(role, SERVICE_MODULES).collect();
    if services.len() <= REPETITION_THRESHOLD {
        return Vec::new();
    }

    let states = Tally::from_items(
        services
            .iter()
            .filter_map(|(_, task)| task.param_str("state")),
    );
    let Some((state, count)) = states.most_common() else {
        return Vec::new();
    };
    if count <= SHARED_STATE_THRESHOLD {
        return Vec::new();
    }

    vec![SimplificationSuggestion::new(
        "repeated_service_management",
        PatternCategory::Duplication,
        Severity::Info,
        0.85,
    )
    .description(format!(
        "{} service tasks, {} of them set state `{}`",
        services.len(),
        count,
        state
    ))
    .example(format!(
        "- name: Manage services\n  service:\n    name: \"{{{{ item }}}}\"\n    state: {}\n  loop: \"{{{{ services }}}}\"",
        state
    ))
    .suggestion("Loop over a list of service names instead of repeating the task")
    .affected_files(files_of(services.iter().map(|(f, _)| f.file.as_str())))
    .impact(format!("Reduce from {} tasks to 1 (-{} tasks)", count, count - 1))]
}

fn repeated_directory_tasks(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    let file_tasks: Vec<(&TaskFile, &Task)> = tasks_with_module(role, &["file"]).collect();
    if file_tasks.len() <= REPETITION_THRESHOLD {
        return Vec::new();
    }

    let directories: Vec<&(&TaskFile, &Task)> = file_tasks
        .iter()
        .filter(|(_, task)| task.param_str("state").as_deref() == Some("directory"))
        .collect();
    if directories.len() <= DIRECTORY_THRESHOLD {
        return Vec::new();
    }

    vec![SimplificationSuggestion::new(
        "repeated_directory_creation",
        PatternCategory::Duplication,
        Severity::Info,
        0.9,
    )
    .description(format!(
        "{} file tasks each create one directory",
        directories.len()
    ))
    .example(
        "- name: Create directories\n  file:\n    path: \"{{ item }}\"\n    state: directory\n  loop: \"{{ directories }}\"",
    )
    .suggestion("Create all directories in one looped `file` task")
    .affected_files(files_of(directories.iter().map(|(f, _)| f.file.as_str())))
    .impact(format!(
        "Reduce from {} tasks to 1 (-{} tasks)",
        directories.len(),
        directories.len() - 1
    ))]
}

/// First two words of a task name, lower-cased
fn name_prefix(task: &Task) -> Option<String> {
    let name = task.name_lower();
    let words: Vec<&str> = name.split_whitespace().take(2).collect();
    (words.len() == 2).then(|| words.join(" "))
}

fn similar_task_names(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    let prefixes = Tally::from_items(role.all_tasks().filter_map(|(_, task)| name_prefix(task)));

    prefixes
        .iter()
        .filter(|(_, count)| *count > REPETITION_THRESHOLD)
        .map(|(prefix, count)| {
            let files = files_of(
                role.all_tasks()
                    .filter(|(_, t)| name_prefix(t).as_deref() == Some(prefix))
                    .map(|(f, _)| f.file.as_str()),
            );
            SimplificationSuggestion::new(
                "similar_task_names",
                PatternCategory::Duplication,
                Severity::Info,
                0.7,
            )
            .description(format!("{} tasks are named \"{} ...\"", count, prefix))
            .example(format!("- name: {} {{{{ item.name }}}}", prefix))
            .suggestion(
                "Extract the repeated tasks into an included task file or a loop over a data structure",
            )
            .affected_files(files)
            .impact(format!("{} near-identical tasks share one definition", count))
        })
        .collect()
}
