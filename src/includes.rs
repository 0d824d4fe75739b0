//! Include graph of a role
//!
//! Edges run from a task file to the task files it pulls in with
//! `include_tasks`/`import_tasks` and to the roles it pulls in with
//! `include_role`/`import_role`. Task files are identified by base name and
//! roles by `role:<name>`.

use crate::role::{base_name, RoleRecord, Task};
use std::collections::{BTreeMap, HashSet};

/// Module names that include another task file
pub const TASK_INCLUDE_MODULES: &[&str] = &[
    "include_tasks",
    "import_tasks",
    "ansible.builtin.include_tasks",
    "ansible.builtin.import_tasks",
];

/// Module names that include another role
pub const ROLE_INCLUDE_MODULES: &[&str] = &[
    "include_role",
    "import_role",
    "ansible.builtin.include_role",
    "ansible.builtin.import_role",
];

/// What an include task points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeTarget {
    /// Another task file, by path as written
    TaskFile(String),
    /// Another role, by name
    Role(String),
}

impl IncludeTarget {
    /// Graph node identifier of the target
    pub fn node(&self) -> String {
        match self {
            IncludeTarget::TaskFile(path) => base_name(path),
            IncludeTarget::Role(name) => format!("role:{}", name),
        }
    }
}

/// Whether a task includes another task file
pub fn is_task_include(task: &Task) -> bool {
    TASK_INCLUDE_MODULES.contains(&task.module.as_str())
}

/// Whether a task includes another role
pub fn is_role_include(task: &Task) -> bool {
    ROLE_INCLUDE_MODULES.contains(&task.module.as_str())
}

/// The include target of a task, if it is an include
///
/// Role includes read the role from `role` or `_raw_params`, then fall back to
/// the task name since flattened `include_role` arguments share the `name` key.
pub fn include_target(task: &Task) -> Option<IncludeTarget> {
    if is_task_include(task) {
        ["file", "_raw_params", "free_form"]
            .iter()
            .find_map(|key| task.param_str(key))
            .map(IncludeTarget::TaskFile)
    } else if is_role_include(task) {
        ["role", "_raw_params"]
            .iter()
            .find_map(|key| task.param_str(key))
            .or_else(|| task.name.clone())
            .map(IncludeTarget::Role)
    } else {
        None
    }
}

/// Directed include graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl IncludeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from every include task of the role
    pub fn from_role(role: &RoleRecord) -> Self {
        let mut graph = Self::new();
        for file in &role.tasks {
            let source = file.base_name();
            for task in &file.tasks {
                if let Some(target) = include_target(task) {
                    graph.add_edge(&source, &target.node());
                }
            }
        }
        graph
    }

    /// Add an edge, keeping children in insertion order
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let children = self.edges.entry(from.to_string()).or_default();
        if !children.iter().any(|c| c == to) {
            children.push(to.to_string());
        }
    }

    /// Direct includes of a node
    pub fn children(&self, node: &str) -> &[String] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with at least one outgoing edge
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Longest include chain starting at `start`
    ///
    /// A node already on the current path contributes no further depth, so
    /// cycles terminate. Visited sets are per path, not global: both arms of a
    /// diamond are explored in full.
    pub fn depth_from(&self, start: &str) -> usize {
        self.depth(start, &HashSet::new())
    }

    fn depth(&self, node: &str, path: &HashSet<String>) -> usize {
        if path.contains(node) {
            return 0;
        }
        let mut path = path.clone();
        path.insert(node.to_string());

        self.children(node)
            .iter()
            .map(|child| 1 + self.depth(child, &path))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::TaskFile;

    fn include(file: &str) -> Task {
        Task::new("include_tasks").with("file", file)
    }

    #[test]
    fn test_include_targets() {
        assert_eq!(
            include_target(&include("setup/debian.yml")).unwrap().node(),
            "debian.yml"
        );
        let role = Task::new("ansible.builtin.include_role").with("role", "common");
        assert_eq!(include_target(&role), Some(IncludeTarget::Role("common".to_string())));
        assert_eq!(include_target(&role).unwrap().node(), "role:common");
        assert_eq!(include_target(&Task::new("import_tasks").with("_raw_params", "a.yml")).unwrap().node(), "a.yml");
        assert!(include_target(&Task::new("apt")).is_none());
    }

    #[test]
    fn test_graph_from_role_and_depth() {
        let role = RoleRecord::from_task_files(vec![
            TaskFile::new("main.yml", vec![include("a.yml"), Task::new("apt")]),
            TaskFile::new("a.yml", vec![include("b.yml")]),
            TaskFile::new("b.yml", vec![include("c.yml")]),
            TaskFile::new("c.yml", vec![include("d.yml")]),
            TaskFile::new("d.yml", vec![Task::new("debug")]),
        ]);
        let graph = IncludeGraph::from_role(&role);
        assert_eq!(graph.sources().count(), 4);
        assert_eq!(graph.children("main.yml"), &["a.yml".to_string()]);
        assert!(graph.children("d.yml").is_empty());
        assert_eq!(graph.depth_from("main.yml"), 4);
        assert_eq!(graph.depth_from("c.yml"), 1);
        assert_eq!(graph.depth_from("d.yml"), 0);
        assert_eq!(graph.depth_from("missing.yml"), 0);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut graph = IncludeGraph::new();
        graph.add_edge("main.yml", "main.yml");
        assert_eq!(graph.depth_from("main.yml"), 1);

        let mut graph = IncludeGraph::new();
        graph.add_edge("main.yml", "a.yml");
        graph.add_edge("a.yml", "b.yml");
        graph.add_edge("b.yml", "main.yml");
        let depth = graph.depth_from("main.yml");
        assert_eq!(depth, 3);
        assert!(depth <= 3 + 1);
    }

    #[test]
    fn test_diamond_explores_both_arms() {
        let mut graph = IncludeGraph::new();
        graph.add_edge("main.yml", "left.yml");
        graph.add_edge("main.yml", "right.yml");
        graph.add_edge("left.yml", "shared.yml");
        graph.add_edge("right.yml", "shared.yml");
        graph.add_edge("shared.yml", "leaf.yml");
        assert_eq!(graph.depth_from("main.yml"), 3);
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let mut graph = IncludeGraph::new();
        graph.add_edge("main.yml", "a.yml");
        graph.add_edge("main.yml", "a.yml");
        assert_eq!(graph.children("main.yml"), &["a.yml".to_string()]);
        assert_eq!(graph.sources().collect::<Vec<_>>(), vec!["main.yml"]);
    }
}
