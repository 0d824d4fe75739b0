//! Role record data model
//!
//! This module defines the normalized shape of an Ansible role consumed by the
//! analyzers: task files holding flat task mappings, handlers, metadata, and the
//! `defaults`/`vars` variable sources.
//!
//! The record is produced by an external loader. Every task is flattened so that
//! its module name lives under `module` and the module's arguments sit next to the
//! task keywords as top-level keys.
//!
//! # Examples
//!
//! **YAML Format:**
//! ```yaml
//! tasks:
//!   - file: main.yml
//!     tasks:
//!       - module: apt
//!         name: Install nginx
//!         pkg: nginx
//!         state: present
//!       - module: template
//!         name: Configure nginx
//!         src: nginx.conf.j2
//!         dest: /etc/nginx/nginx.conf
//!         when: nginx_manage_config
//!     line_ranges: [[1, 5], [6, 11]]
//! handlers:
//!   - module: service
//!     name: restart nginx
//! meta:
//!   dependencies: [common]
//! defaults:
//!   - file: main.yml
//!     data:
//!       nginx_port: 80
//! ```
//!
//! **JSON Format:**
//! ```json
//! {
//!   "tasks": [
//!     {
//!       "file": "main.yml",
//!       "tasks": [
//!         { "module": "apt", "name": "Install nginx", "pkg": "nginx" }
//!       ]
//!     }
//!   ],
//!   "defaults": { "main.yml": { "nginx_port": 80 } }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// Task keywords that never name the task's module
pub const TASK_KEYWORDS: &[&str] = &[
    "name",
    "when",
    "tags",
    "register",
    "notify",
    "listen",
    "become",
    "become_user",
    "become_method",
    "loop",
    "loop_control",
    "with_items",
    "with_dict",
    "with_fileglob",
    "vars",
    "environment",
    "ignore_errors",
    "changed_when",
    "failed_when",
    "no_log",
    "check_mode",
    "delegate_to",
    "run_once",
    "until",
    "retries",
    "delay",
    "block",
    "rescue",
    "always",
    "args",
    "module",
];

/// Parameter keys that may hold the command line of a shell-like task
const COMMAND_KEYS: &[&str] = &["cmd", "_raw_params", "free_form", "command", "shell", "raw"];

/// A task's `when` condition
///
/// Ansible accepts a single expression, a list of expressions that are
/// implicitly joined with `and`, or a bare boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenClause {
    /// Literal `true`/`false`
    Literal(bool),
    /// A single Jinja2 expression
    Expression(String),
    /// Several expressions that must all hold
    All(Vec<String>),
}

impl WhenClause {
    /// The individual expressions of this condition
    pub fn expressions(&self) -> Vec<String> {
        match self {
            WhenClause::Literal(value) => vec![value.to_string()],
            WhenClause::Expression(expr) => vec![expr.clone()],
            WhenClause::All(exprs) => exprs.clone(),
        }
    }

    /// The condition as one expression, list items joined with ` and `
    pub fn text(&self) -> String {
        self.expressions().join(" and ")
    }

    /// Whether the condition carries no expression at all
    ///
    /// A literal `false` counts as absent.
    pub fn is_empty(&self) -> bool {
        match self {
            WhenClause::Literal(value) => !value,
            WhenClause::Expression(expr) => expr.trim().is_empty(),
            WhenClause::All(exprs) => exprs.iter().all(|e| e.trim().is_empty()),
        }
    }
}

/// One normalized task
///
/// Deserialized from the flat task mapping by hand so that tagged parameter
/// values such as `!vault` survive; see [`Task::from_mapping`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Task {
    /// Module (operation type) name, possibly namespaced (`ansible.builtin.apt`)
    pub module: String,

    /// Free-text description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Conditional expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenClause>,

    /// Error handling tasks run when the task fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescue: Option<Vec<Task>>,

    /// Tasks that always run after the task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always: Option<Vec<Task>>,

    /// Everything else: module arguments and the remaining task keywords
    #[serde(flatten)]
    pub params: Mapping,
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let params = Mapping::deserialize(deserializer)?;
        Task::from_mapping(params).map_err(|e| serde::de::Error::custom(format!("{:#}", e)))
    }
}

impl Task {
    /// Build a task from its flat mapping
    ///
    /// `module`, `name`, `when`, `rescue` and `always` are lifted into their
    /// fields; every other key stays in `params` untouched.
    pub fn from_mapping(mut params: Mapping) -> Result<Self> {
        let module = match params.remove("module") {
            None | Some(Value::Null) => String::new(),
            Some(value) => scalar_to_string(&value)
                .with_context(|| format!("task module must be a string, found {}", value_kind(&value)))?,
        };
        let name = params.remove("name").and_then(|value| scalar_to_string(&value));
        let when = match params.remove("when") {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_yaml::from_value(value).context("invalid `when` condition")?),
        };
        let rescue = nested_tasks(params.remove("rescue")).context("invalid `rescue` tasks")?;
        let always = nested_tasks(params.remove("always")).context("invalid `always` tasks")?;

        Ok(Self {
            module,
            name,
            when,
            rescue,
            always,
            params,
        })
    }

    /// Create a task for the given module with no parameters
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Self::default()
        }
    }

    /// Builder: set the task name
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Builder: set a single-expression condition
    pub fn when(mut self, condition: &str) -> Self {
        self.when = Some(WhenClause::Expression(condition.to_string()));
        self
    }

    /// Builder: set a parameter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(Value::String(key.to_string()), value.into());
        self
    }

    /// Module name with any collection namespace stripped
    pub fn short_module(&self) -> String {
        short_module_name(&self.module)
    }

    /// The module that identifies this task
    ///
    /// Falls back to the first parameter key that is not a task keyword when
    /// the loader left `module` empty.
    pub fn primary_module(&self) -> Option<String> {
        if !self.module.trim().is_empty() {
            return Some(self.module.clone());
        }
        self.params
            .keys()
            .filter_map(Value::as_str)
            .find(|key| !TASK_KEYWORDS.contains(key))
            .map(str::to_string)
    }

    /// Look up a parameter
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Look up a parameter rendered as a string scalar
    pub fn param_str(&self, key: &str) -> Option<String> {
        self.param(key).and_then(scalar_to_string)
    }

    /// Whether the parameter key is present, whatever its value
    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Whether a boolean-ish parameter is set to a true value
    pub fn param_is_true(&self, key: &str) -> bool {
        match self.param(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => {
                matches!(text.trim().to_lowercase().as_str(), "true" | "yes" | "on")
            }
            Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
            _ => false,
        }
    }

    /// Lower-cased task name, empty when unnamed
    pub fn name_lower(&self) -> String {
        self.name.as_deref().unwrap_or_default().to_lowercase()
    }

    /// Condition text, `None` when absent or empty
    pub fn condition_text(&self) -> Option<String> {
        self.when
            .as_ref()
            .filter(|clause| !clause.is_empty())
            .map(WhenClause::text)
    }

    /// Whether the task has a non-empty `when`
    pub fn is_conditional(&self) -> bool {
        self.condition_text().is_some()
    }

    /// Whether the task declares `rescue` or `always` handling
    pub fn has_error_handling(&self) -> bool {
        self.rescue.is_some() || self.always.is_some()
    }

    /// Name of the variable this task registers its result into
    pub fn registered_variable(&self) -> Option<String> {
        self.param_str("register").filter(|v| !v.trim().is_empty())
    }

    /// Command line of a shell-like task
    pub fn command_text(&self) -> Option<String> {
        for key in COMMAND_KEYS {
            if let Some(text) = self.param_str(key) {
                return Some(text);
            }
        }
        match self.param("argv") {
            Some(Value::Sequence(items)) => Some(
                items
                    .iter()
                    .filter_map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }

    /// Every string scalar in the task's name and parameters, depth first
    pub fn string_values(&self) -> Vec<String> {
        let mut values = Vec::new();
        if let Some(name) = &self.name {
            values.push(name.clone());
        }
        for value in self.params.values() {
            collect_strings(value, &mut values);
        }
        values
    }
}

/// Strip the collection namespace from a module name, lower-cased
///
/// `community.postgresql.postgresql_db` becomes `postgresql_db`.
pub fn short_module_name(module: &str) -> String {
    module
        .rsplit('.')
        .next()
        .unwrap_or(module)
        .trim()
        .to_lowercase()
}

/// Render a scalar YAML value as a string
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value)
            .map(|inner| format!("{} {}", tagged.tag, inner)),
        _ => None,
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.push(text.clone()),
        Value::Sequence(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Mapping(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Tagged(tagged) => collect_strings(&tagged.value, out),
        _ => {}
    }
}

fn nested_tasks(value: Option<Value>) -> Result<Option<Vec<Task>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Sequence(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Mapping(map) => Task::from_mapping(map),
                other => bail!("expected a task mapping, found {}", value_kind(&other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(other) => bail!("expected a list of tasks, found {}", value_kind(&other)),
    }
}

/// One physical task file of the role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    /// Path relative to the role's `tasks/` directory
    pub file: String,
    /// Tasks in source order
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// `(start_line, end_line)` for each task, aligned by index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_ranges: Option<Vec<(usize, usize)>>,
}

impl TaskFile {
    /// Create a task file without line information
    pub fn new(file: &str, tasks: Vec<Task>) -> Self {
        Self {
            file: file.to_string(),
            tasks,
            line_ranges: None,
        }
    }

    /// Base name of the file (`setup/main.yml` becomes `main.yml`)
    pub fn base_name(&self) -> String {
        base_name(&self.file)
    }

    /// Line range of the task at `index`, if known
    pub fn line_range(&self, index: usize) -> Option<(usize, usize)> {
        self.line_ranges
            .as_ref()
            .and_then(|ranges| ranges.get(index).copied())
    }
}

/// Base name of a path-like string
pub fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Role metadata (`meta/main.yml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleMeta {
    /// Role dependencies, as role names or dependency mappings
    pub dependencies: Vec<Value>,
    /// Remaining metadata such as `galaxy_info`
    #[serde(flatten)]
    pub extra: Mapping,
}

impl<'de> Deserialize<'de> for RoleMeta {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut extra = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
        let dependencies = match extra.remove("dependencies") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items,
            Some(other) => {
                return Err(serde::de::Error::custom(format!(
                    "expected a list of role dependencies, found {}",
                    value_kind(&other)
                )))
            }
        };
        Ok(Self { dependencies, extra })
    }
}

/// Variables loaded from one file under `defaults/` or `vars/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarSource {
    /// Source file name
    pub file: String,
    /// Variable name to value
    #[serde(default)]
    pub data: Mapping,
}

/// The normalized input to every analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Role name, when the loader knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Task files; the only required key
    pub tasks: Vec<TaskFile>,
    /// Handler tasks
    #[serde(default)]
    pub handlers: Vec<Task>,
    /// Role metadata
    #[serde(default)]
    pub meta: RoleMeta,
    /// Variables from `defaults/`
    #[serde(default, deserialize_with = "deserialize_var_sources")]
    pub defaults: Vec<VarSource>,
    /// Variables from `vars/`
    #[serde(default, deserialize_with = "deserialize_var_sources")]
    pub vars: Vec<VarSource>,
    /// Repository URL used for source links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Repository host type (github, gitlab, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_type: Option<String>,
    /// Repository branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_branch: Option<String>,
}

impl RoleRecord {
    /// Build a role from task files only
    pub fn from_task_files(tasks: Vec<TaskFile>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    /// Parse a role record from a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("invalid role record")
    }

    /// Parse a role record from a JSON document
    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("invalid role record")
    }

    /// Convert an already-parsed YAML value into a role record
    pub fn from_value(value: Value) -> Result<Self> {
        if !matches!(&value, Value::Mapping(map) if map.contains_key("tasks")) {
            bail!("invalid role record: missing required `tasks` key");
        }
        serde_yaml::from_value(value).context("invalid role record")
    }

    /// Iterate over every task of every task file with its file
    pub fn all_tasks(&self) -> impl Iterator<Item = (&TaskFile, &Task)> {
        self.tasks
            .iter()
            .flat_map(|file| file.tasks.iter().map(move |task| (file, task)))
    }

    /// Total number of tasks across task files
    pub fn total_tasks(&self) -> usize {
        self.tasks.iter().map(|f| f.tasks.len()).sum()
    }

    /// The role's entry point (`main.yml`/`main.yaml`)
    pub fn main_task_file(&self) -> Option<&TaskFile> {
        self.tasks
            .iter()
            .find(|f| matches!(f.base_name().as_str(), "main.yml" | "main.yaml"))
    }

    /// Names of all variables defined under `defaults/`
    pub fn default_variable_names(&self) -> BTreeSet<String> {
        variable_names(&self.defaults)
    }

    /// Names of all variables defined under `vars/`
    pub fn vars_variable_names(&self) -> BTreeSet<String> {
        variable_names(&self.vars)
    }
}

/// Collect the variable names of a set of sources into one key set
pub fn variable_names(sources: &[VarSource]) -> BTreeSet<String> {
    sources
        .iter()
        .flat_map(|source| source.data.keys())
        .filter_map(scalar_to_string)
        .collect()
}

fn deserialize_var_sources<'de, D>(deserializer: D) -> std::result::Result<Vec<VarSource>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    normalize_var_sources(value).map_err(serde::de::Error::custom)
}

/// Normalize the accepted `defaults`/`vars` shapes into variable sources
///
/// Accepts a list of `{file, data}` entries or a mapping of file name to data.
/// Each `data` may itself be a mapping or a list of single-key mappings.
pub fn normalize_var_sources(value: Value) -> Result<Vec<VarSource>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| match entry {
                Value::Mapping(mut entry) => {
                    let file = entry
                        .remove("file")
                        .and_then(|v| scalar_to_string(&v))
                        .unwrap_or_else(|| format!("source_{}", index + 1));
                    let data = normalize_variables(entry.remove("data").unwrap_or(Value::Null))
                        .with_context(|| format!("variables in {}", file))?;
                    Ok(VarSource { file, data })
                }
                other => bail!(
                    "expected a {{file, data}} entry for variable source {}, found {}",
                    index + 1,
                    value_kind(&other)
                ),
            })
            .collect(),
        Value::Mapping(files) => files
            .into_iter()
            .map(|(file, data)| {
                let file = scalar_to_string(&file).unwrap_or_default();
                let data = normalize_variables(data)
                    .with_context(|| format!("variables in {}", file))?;
                Ok(VarSource { file, data })
            })
            .collect(),
        other => bail!(
            "expected a list or mapping of variable files, found {}",
            value_kind(&other)
        ),
    }
}

/// Flatten a variable file's data into one mapping
pub fn normalize_variables(value: Value) -> Result<Mapping> {
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => Ok(map),
        Value::Sequence(items) => {
            let mut merged = Mapping::new();
            for item in items {
                match item {
                    Value::Mapping(map) => merged.extend(map),
                    Value::Null => {}
                    other => bail!(
                        "expected single-key variable mappings, found {}",
                        value_kind(&other)
                    ),
                }
            }
            Ok(merged)
        }
        other => bail!("expected variable mapping, found {}", value_kind(&other)),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Load a normalized role record from a YAML, JSON, or TOML file
pub fn load_role_record(path: &Path) -> Result<RoleRecord> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read role record {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let record = match extension.as_str() {
        "json" => RoleRecord::from_json_str(&contents)?,
        "toml" => toml::from_str(&contents).context("invalid role record")?,
        _ => RoleRecord::from_yaml_str(&contents)?,
    };

    Ok(record)
}
