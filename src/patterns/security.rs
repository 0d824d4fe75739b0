//! Plain-text secrets, unlogged secrets, loose file modes and shell injection

use super::{PatternCategory, PatternDetector, Severity, SimplificationSuggestion};
use crate::role::{scalar_to_string, RoleRecord, Task, TaskFile, VarSource, TASK_KEYWORDS};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

/// Substrings of a variable or task name that suggest it holds a secret
pub const SECRET_INDICATORS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
    "access_key",
];

/// Substrings of a path or task name that suggest a sensitive file
const SENSITIVE_PATH_HINTS: &[&str] = &["key", "cert", "password", "secret", "config", "credential"];

const FILE_MODULES: &[&str] = &["file", "copy", "template"];
const SHELL_MODULES: &[&str] = &["shell", "command"];

/// World-writable modes as written in YAML, quoted or not
const INSECURE_MODES: &[&str] = &["0777", "777", "0666", "666"];
/// The same modes after YAML read them as octal integers
const INSECURE_NUMERIC_MODES: &[i64] = &[0o777, 0o666, 777, 666];

static PIPE_TO_SHELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|\s*(sudo\s+)?(/bin/|/usr/bin/)?(ba)?sh\b").expect("valid pipe-to-shell regex")
});

/// Whether a name looks like it refers to a secret
pub fn is_secret_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    SECRET_INDICATORS.iter().any(|hint| lower.contains(hint))
}

/// Finds secrets and risky file or shell handling
pub struct SecurityDetector;

impl PatternDetector for SecurityDetector {
    fn name(&self) -> &str {
        "security"
    }

    fn detect(&self, role: &RoleRecord) -> Result<Vec<SimplificationSuggestion>> {
        let mut suggestions = Vec::new();
        for source in &role.defaults {
            suggestions.extend(plaintext_secrets("defaults", source));
        }
        for source in &role.vars {
            suggestions.extend(plaintext_secrets("vars", source));
        }
        suggestions.extend(missing_no_log(role));
        suggestions.extend(file_permissions(role));
        suggestions.extend(shell_injection(role));
        Ok(suggestions)
    }
}

/// Whether a variable value is a hardcoded secret
///
/// Templated values and vault-encrypted values are safe; so are empty ones.
fn is_plaintext_value(value: &Value) -> bool {
    match value {
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => false,
        Value::Tagged(tagged) => tagged.tag != "vault",
        other => match scalar_to_string(other) {
            Some(text) => {
                let text = text.trim();
                !text.is_empty() && !text.starts_with("{{") && !text.starts_with("!vault")
            }
            None => false,
        },
    }
}

fn plaintext_secrets(kind: &str, source: &VarSource) -> Option<SimplificationSuggestion> {
    let names: Vec<String> = source
        .data
        .iter()
        .filter_map(|(key, value)| {
            let name = scalar_to_string(key)?;
            (is_secret_name(&name) && is_plaintext_value(value)).then_some(name)
        })
        .collect();
    if names.is_empty() {
        return None;
    }

    let path = format!("{}/{}", kind, source.file);
    Some(
        SimplificationSuggestion::new(
            "plaintext_secrets",
            PatternCategory::Security,
            Severity::Critical,
            0.8,
        )
        .description(format!(
            "{} holds secret-looking variables in plain text: {}",
            path,
            names.join(", ")
        ))
        .example(format!(
            "{}: !vault |\n  $ANSIBLE_VAULT;1.1;AES256\n  ...",
            names[0]
        ))
        .suggestion("Encrypt the values with ansible-vault or look them up from a secret manager")
        .affected_files([path])
        .impact(format!("{} secrets no longer committed in plain text", names.len())),
    )
}

fn sets_secret_fact(task: &Task) -> bool {
    task.short_module() == "set_fact"
        && task
            .params
            .keys()
            .filter_map(Value::as_str)
            .filter(|key| !TASK_KEYWORDS.contains(key))
            .any(is_secret_name)
}

fn handles_secret(task: &Task) -> bool {
    task.name.as_deref().map(is_secret_name).unwrap_or(false) || sets_secret_fact(task)
}

fn missing_no_log(role: &RoleRecord) -> Option<SimplificationSuggestion> {
    let exposed: Vec<(&TaskFile, &Task)> = role
        .all_tasks()
        .filter(|(_, task)| handles_secret(task) && !task.param_is_true("no_log"))
        .collect();
    if exposed.is_empty() {
        return None;
    }

    let labels: Vec<String> = exposed
        .iter()
        .map(|(_, task)| task.name.clone().unwrap_or_else(|| task.module.clone()))
        .collect();
    Some(
        SimplificationSuggestion::new(
            "missing_no_log",
            PatternCategory::Security,
            Severity::Warning,
            0.85,
        )
        .description(format!(
            "{} tasks handle secrets without no_log: {}",
            exposed.len(),
            labels.join(", ")
        ))
        .example("- name: Set database password\n  set_fact:\n    db_password: \"{{ vault_db_password }}\"\n  no_log: true")
        .suggestion("Add `no_log: true` so secret values stay out of logs and output")
        .affected_files(exposed.iter().map(|(file, _)| file.file.clone()))
        .impact("Secrets are no longer printed in task output"),
    )
}

fn is_insecure_mode(value: &Value) -> bool {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|n| INSECURE_NUMERIC_MODES.contains(&n))
            .unwrap_or(false),
        Value::String(text) => INSECURE_MODES.contains(&text.trim()),
        _ => false,
    }
}

fn looks_sensitive(task: &Task) -> bool {
    let mut haystacks: Vec<String> = ["path", "dest", "src"]
        .iter()
        .filter_map(|key| task.param_str(key))
        .collect();
    haystacks.push(task.name_lower());
    haystacks.iter().any(|text| {
        let lower = text.to_lowercase();
        SENSITIVE_PATH_HINTS.iter().any(|hint| lower.contains(hint))
    })
}

fn file_permissions(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    let file_tasks: Vec<(&TaskFile, &Task)> = role
        .all_tasks()
        .filter(|(_, task)| FILE_MODULES.contains(&task.short_module().as_str()))
        .collect();

    let world_writable: Vec<&(&TaskFile, &Task)> = file_tasks
        .iter()
        .filter(|(_, task)| task.param("mode").map(is_insecure_mode).unwrap_or(false))
        .collect();
    let unset: Vec<&(&TaskFile, &Task)> = file_tasks
        .iter()
        .filter(|(_, task)| !task.has_param("mode") && looks_sensitive(task))
        .collect();

    let mut suggestions = Vec::new();
    if !world_writable.is_empty() {
        suggestions.push(
            SimplificationSuggestion::new(
                "insecure_file_permissions",
                PatternCategory::Security,
                Severity::Warning,
                0.9,
            )
            .description(format!(
                "{} file tasks set world-writable modes",
                world_writable.len()
            ))
            .example("mode: \"0644\"")
            .suggestion("Use the narrowest mode that works, such as 0644 for files and 0755 for directories")
            .affected_files(world_writable.iter().map(|(file, _)| file.file.clone()))
            .impact("Other users can no longer modify managed files"),
        );
    }
    if !unset.is_empty() {
        suggestions.push(
            SimplificationSuggestion::new(
                "missing_file_mode",
                PatternCategory::Security,
                Severity::Warning,
                0.9,
            )
            .description(format!(
                "{} tasks write sensitive-looking files without an explicit mode",
                unset.len()
            ))
            .example("- template:\n    src: app.key.j2\n    dest: /etc/app/app.key\n    mode: \"0600\"")
            .suggestion("Set `mode` explicitly on keys, certificates and configuration files")
            .affected_files(unset.iter().map(|(file, _)| file.file.clone()))
            .impact("Sensitive files no longer depend on the remote umask"),
        );
    }
    suggestions
}

/// Whether a templated command also runs a destructive or evaluating token
pub fn is_injection_risk(command: &str) -> bool {
    if !command.contains("{{") {
        return false;
    }
    let trimmed = command.trim_start();
    command.contains(" rm ")
        || trimmed.starts_with("rm ")
        || command.contains("eval")
        || PIPE_TO_SHELL.is_match(command)
}

fn shell_injection(role: &RoleRecord) -> Vec<SimplificationSuggestion> {
    role.all_tasks()
        .filter(|(_, task)| SHELL_MODULES.contains(&task.short_module().as_str()))
        .filter_map(|(file, task)| {
            let command = task.command_text()?;
            if !is_injection_risk(&command) {
                return None;
            }
            Some(
                SimplificationSuggestion::new(
                    "shell_injection_risk",
                    PatternCategory::Security,
                    Severity::Critical,
                    0.75,
                )
                .description(format!(
                    "Task '{}' in {} interpolates variables into a dangerous command",
                    task.name.as_deref().unwrap_or(task.module.as_str()),
                    file.file
                ))
                .example(command)
                .suggestion("Quote interpolated values with `| quote` or use a dedicated module instead of the shell")
                .affected_files([file.file.clone()])
                .impact("Variable content can no longer execute arbitrary commands"),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Mapping;

    fn var_source(file: &str, yaml: &str) -> VarSource {
        VarSource {
            file: file.to_string(),
            data: serde_yaml::from_str::<Mapping>(yaml).unwrap(),
        }
    }

    fn detect_tasks(tasks: Vec<Task>) -> Vec<SimplificationSuggestion> {
        let role = RoleRecord::from_task_files(vec![TaskFile::new("main.yml", tasks)]);
        SecurityDetector.detect(&role).unwrap()
    }

    #[test]
    fn test_plaintext_secrets_per_source() {
        let mut role = RoleRecord::default();
        role.defaults.push(var_source(
            "main.yml",
            "db_password: hunter2\napi_token: \"{{ vault_api_token }}\"\nempty_secret: ''\napp_port: 80\n",
        ));
        role.vars.push(var_source(
            "main.yml",
            "admin_passwd: !vault |\n  $ANSIBLE_VAULT;1.1;AES256\n  6162\nAWS_ACCESS_KEY: AKIA123\n",
        ));

        let found = SecurityDetector.detect(&role).unwrap();
        let secrets: Vec<_> = found.iter().filter(|s| s.pattern == "plaintext_secrets").collect();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].severity, Severity::Critical);
        assert_eq!(secrets[0].confidence, 0.8);
        assert!(secrets[0].description.contains("db_password"));
        assert!(!secrets[0].description.contains("api_token"));
        assert!(secrets[0].affected_files.contains("defaults/main.yml"));
        assert!(secrets[1].description.contains("AWS_ACCESS_KEY"));
        assert!(!secrets[1].description.contains("admin_passwd"));
    }

    #[test]
    fn test_vault_prefixed_string_is_encrypted() {
        assert!(!is_plaintext_value(&Value::String("!vault | $ANSIBLE_VAULT".into())));
        assert!(is_plaintext_value(&Value::Number(1234.into())));
        assert!(!is_plaintext_value(&Value::Null));
    }

    #[test]
    fn test_missing_no_log() {
        let found = detect_tasks(vec![
            Task::new("user").named("Set admin password"),
            Task::new("set_fact").with("db_token", "{{ x }}"),
            Task::new("set_fact").with("db_token", "{{ x }}").with("no_log", true),
            Task::new("debug").named("Show banner"),
        ]);
        let no_log: Vec<_> = found.iter().filter(|s| s.pattern == "missing_no_log").collect();
        assert_eq!(no_log.len(), 1);
        assert!(no_log[0].description.starts_with("2 tasks"));
        assert_eq!(no_log[0].confidence, 0.85);
    }

    #[test]
    fn test_file_permissions() {
        let found = detect_tasks(vec![
            Task::new("file").with("path", "/srv/shared").with("mode", "0777"),
            Task::new("copy").with("dest", "/tmp/x").with("mode", 0o666),
            Task::new("template").with("dest", "/etc/app/tls.cert"),
            Task::new("template").with("dest", "/etc/motd"),
            Task::new("copy").with("dest", "/etc/app/app.key").with("mode", "0600"),
        ]);
        let loose: Vec<_> = found
            .iter()
            .filter(|s| s.pattern == "insecure_file_permissions")
            .collect();
        assert_eq!(loose.len(), 1);
        assert!(loose[0].description.starts_with("2 file tasks"));
        let unset: Vec<_> = found.iter().filter(|s| s.pattern == "missing_file_mode").collect();
        assert_eq!(unset.len(), 1);
        assert!(unset[0].description.starts_with("1 tasks"));
    }

    #[test]
    fn test_shell_injection() {
        assert!(is_injection_risk("rm -rf {{ target_dir }}"));
        assert!(is_injection_risk("cd /tmp && rm -rf {{ dir }}"));
        assert!(is_injection_risk("eval {{ cmd }}"));
        assert!(is_injection_risk("curl {{ url }} | bash"));
        assert!(is_injection_risk("curl {{ url }} | sudo sh -"));
        assert!(!is_injection_risk("rm -rf /tmp/build"));
        assert!(!is_injection_risk("echo {{ msg }} | shasum"));
        assert!(!is_injection_risk("ls {{ dir }}"));

        let found = detect_tasks(vec![
            Task::new("shell").with("cmd", "curl {{ installer }} | sh"),
            Task::new("debug").with("msg", "rm {{ x }}"),
        ]);
        let risky: Vec<_> = found.iter().filter(|s| s.pattern == "shell_injection_risk").collect();
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].severity, Severity::Critical);
        assert_eq!(risky[0].confidence, 0.75);
    }
}
