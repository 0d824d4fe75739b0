//! Mermaid diagrams of a role's workflow
//!
//! Two views are generated:
//! - a `stateDiagram-v2` of the phase transitions of one task file
//! - a `sequenceDiagram` of include edges and handler notifications

use crate::includes::include_target;
use crate::phases::PhaseDetector;
use crate::role::{scalar_to_string, RoleRecord, Task, TaskFile};
use anyhow::Result;
use serde_yaml::Value;
use std::fmt::Write;

/// Participant name used for handler notifications
pub const HANDLERS_PARTICIPANT: &str = "handlers";

/// State diagram of the phase flow of one task file
///
/// Returns `None` when the file has fewer than two phase groups.
pub fn generate_state_diagram(task_file: &TaskFile, detector: &PhaseDetector) -> Result<Option<String>> {
    let result = detector.detect_file(task_file)?;
    if result.detected_phases.len() < 2 {
        return Ok(None);
    }

    let mut out = String::from("stateDiagram-v2\n");
    let phases = &result.detected_phases;

    let _ = writeln!(out, "    [*] --> {}", phases[0].phase);
    for pair in phases.windows(2) {
        let _ = writeln!(out, "    {} --> {}", pair[0].phase, pair[1].phase);
    }
    if let Some(last) = phases.last() {
        let _ = writeln!(out, "    {} --> [*]", last.phase);
    }

    let mut described = Vec::new();
    for phase in phases {
        if described.contains(&phase.phase) {
            continue;
        }
        described.push(phase.phase);
        let count: usize = phases
            .iter()
            .filter(|p| p.phase == phase.phase)
            .map(|p| p.task_count)
            .sum();
        let _ = writeln!(
            out,
            "    {} : {} ({} tasks)",
            phase.phase,
            phase.phase.display_name(),
            count
        );
    }

    let _ = writeln!(
        out,
        "    note right of {}\n        {}\n    end note",
        phases[0].phase,
        if result.is_coherent_pipeline {
            "coherent pipeline"
        } else {
            "mixed workflow"
        }
    );
    Ok(Some(out))
}

/// Handler names a task notifies
fn notified_handlers(task: &Task) -> Vec<String> {
    match task.param("notify") {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(value) => scalar_to_string(value).into_iter().collect(),
        None => Vec::new(),
    }
}

struct Participants {
    names: Vec<String>,
}

impl Participants {
    fn id(&mut self, name: &str) -> String {
        let index = match self.names.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        };
        format!("P{}", index)
    }
}

/// Sequence diagram of includes between task files and handler notifications
pub fn generate_sequence_diagram(role: &RoleRecord) -> String {
    let mut participants = Participants { names: Vec::new() };
    let mut messages = Vec::new();

    let mut files: Vec<&TaskFile> = role.tasks.iter().collect();
    if let Some(position) = files
        .iter()
        .position(|f| Some(f.file.as_str()) == role.main_task_file().map(|m| m.file.as_str()))
    {
        let main = files.remove(position);
        files.insert(0, main);
    }

    for file in files {
        let source = participants.id(&file.base_name());
        for task in &file.tasks {
            if let Some(target) = include_target(task) {
                let target_id = participants.id(&target.node());
                messages.push(format!("    {}->>{}: {}", source, target_id, task.short_module()));
            }
            for handler in notified_handlers(task) {
                let handlers_id = participants.id(HANDLERS_PARTICIPANT);
                messages.push(format!("    {}-->>{}: notify {}", source, handlers_id, handler));
            }
        }
    }

    let mut out = String::from("sequenceDiagram\n");
    for (index, name) in participants.names.iter().enumerate() {
        let _ = writeln!(out, "    participant P{} as {}", index, name);
    }
    for message in messages {
        out.push_str(&message);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_diagram_follows_phases() {
        let file = TaskFile::new(
            "main.yml",
            vec![
                Task::new("apt").named("Install nginx"),
                Task::new("apt").named("Install certbot"),
                Task::new("template").named("Configure nginx"),
                Task::new("template").named("Configure site"),
                Task::new("uri").named("Verify health"),
            ],
        );
        let diagram = generate_state_diagram(&file, &PhaseDetector::default())
            .unwrap()
            .unwrap();
        assert!(diagram.starts_with("stateDiagram-v2\n"));
        assert!(diagram.contains("[*] --> install"));
        assert!(diagram.contains("install --> configure"));
        assert!(diagram.contains("configure --> verify"));
        assert!(diagram.contains("verify --> [*]"));
        assert!(diagram.contains("install : Install (2 tasks)"));
        assert!(diagram.contains("coherent pipeline"));
    }

    #[test]
    fn test_state_diagram_needs_two_phases() {
        let file = TaskFile::new("main.yml", (0..4).map(|_| Task::new("apt")).collect());
        assert!(generate_state_diagram(&file, &PhaseDetector::default())
            .unwrap()
            .is_none());

        let mut bad = TaskFile::new("main.yml", vec![Task::new("apt")]);
        bad.line_ranges = Some(vec![]);
        assert!(generate_state_diagram(&bad, &PhaseDetector::default()).is_err());
    }

    #[test]
    fn test_sequence_diagram_starts_at_main() {
        let role = RoleRecord::from_task_files(vec![
            TaskFile::new(
                "install.yml",
                vec![Task::new("apt").with("notify", vec!["restart nginx", "reload firewall"])],
            ),
            TaskFile::new(
                "main.yml",
                vec![
                    Task::new("import_tasks").with("file", "install.yml"),
                    Task::new("include_role").with("role", "common"),
                    Task::new("template").with("notify", "restart nginx"),
                ],
            ),
        ]);
        let diagram = generate_sequence_diagram(&role);
        let lines: Vec<&str> = diagram.lines().collect();
        assert_eq!(lines[0], "sequenceDiagram");
        assert_eq!(lines[1], "    participant P0 as main.yml");
        assert_eq!(lines[2], "    participant P1 as install.yml");
        assert_eq!(lines[3], "    participant P2 as role:common");
        assert_eq!(lines[4], "    participant P3 as handlers");
        assert!(diagram.contains("P0->>P1: import_tasks"));
        assert!(diagram.contains("P0->>P2: include_role"));
        assert!(diagram.contains("P0-->>P3: notify restart nginx"));
        assert!(diagram.contains("P1-->>P3: notify reload firewall"));
    }
}
