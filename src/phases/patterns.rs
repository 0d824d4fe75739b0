//! Phase pattern tables
//!
//! A [`PhasePatterns`] table maps each workflow phase to the modules and task
//! name keywords that signal it. The built-in table is the `Default`; a custom
//! table can be loaded from YAML and injected into a
//! [`super::PhaseDetector`].
//!
//! Entry order matters: when two phases score equally for a task, the phase
//! listed first wins.
//!
//! # Examples
//!
//! **YAML Format:**
//! ```yaml
//! - phase: install
//!   modules: [apt, yum, pip]
//!   keywords: [install, download]
//! - phase: verify
//!   modules: [assert, uri]
//!   keywords: [verify, check]
//! ```

use super::Phase;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Signals for one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePattern {
    /// The phase these signals identify
    pub phase: Phase,
    /// Short module names, matched exactly
    #[serde(default)]
    pub modules: Vec<String>,
    /// Lower-case substrings searched in task names
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl PhasePattern {
    fn from_static(phase: Phase, modules: &[&str], keywords: &[&str]) -> Self {
        Self {
            phase,
            modules: modules.iter().map(|m| m.to_string()).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Whether a short module name belongs to this phase
    pub fn matches_module(&self, short_module: &str) -> bool {
        self.modules.iter().any(|m| m == short_module)
    }

    /// Whether a lower-cased task name contains one of the keywords
    pub fn matches_name(&self, name_lower: &str) -> bool {
        !name_lower.is_empty() && self.keywords.iter().any(|k| name_lower.contains(k.as_str()))
    }
}

/// Ordered table of phase signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhasePatterns {
    entries: Vec<PhasePattern>,
}

const SETUP_MODULES: &[&str] = &[
    "file",
    "user",
    "group",
    "set_fact",
    "include_vars",
    "apt_key",
    "apt_repository",
    "yum_repository",
    "rpm_key",
    "authorized_key",
    "hostname",
    "timezone",
];
const SETUP_KEYWORDS: &[&str] = &[
    "prepare",
    "setup",
    "set up",
    "create directory",
    "create directories",
    "create user",
    "create group",
    "add repository",
    "add key",
    "initialize",
    "bootstrap",
    "prerequisite",
];

const INSTALL_MODULES: &[&str] = &[
    "apt", "yum", "dnf", "package", "pip", "npm", "gem", "zypper", "pacman", "apk", "homebrew",
    "snap", "get_url",
];
const INSTALL_KEYWORDS: &[&str] = &["install", "download", "upgrade"];

const CONFIGURE_MODULES: &[&str] = &[
    "template",
    "copy",
    "lineinfile",
    "blockinfile",
    "replace",
    "ini_file",
    "xml",
    "sysctl",
    "assemble",
];
const CONFIGURE_KEYWORDS: &[&str] = &["configure", "config", "template", "setting"];

const DEPLOY_MODULES: &[&str] = &[
    "git",
    "unarchive",
    "synchronize",
    "docker_container",
    "k8s",
    "helm",
    "deploy_helper",
];
const DEPLOY_KEYWORDS: &[&str] = &[
    "deploy", "release", "checkout", "clone", "extract", "unpack", "rollout", "publish",
];

const ACTIVATE_MODULES: &[&str] = &[
    "service",
    "systemd",
    "systemd_service",
    "sysvinit",
    "supervisorctl",
    "reboot",
];
const ACTIVATE_KEYWORDS: &[&str] = &["start", "restart", "enable", "reload", "activate", "launch"];

const VERIFY_MODULES: &[&str] = &[
    "assert",
    "uri",
    "wait_for",
    "wait_for_connection",
    "stat",
    "fail",
    "service_facts",
    "package_facts",
];
const VERIFY_KEYWORDS: &[&str] = &[
    "verify",
    "check",
    "assert",
    "validate",
    "test",
    "wait for",
    "health",
    "ensure running",
    "smoke",
];

const CLEANUP_KEYWORDS: &[&str] = &["clean", "remove", "delete", "purge", "prune", "tidy"];

impl Default for PhasePatterns {
    fn default() -> Self {
        Self {
            entries: vec![
                PhasePattern::from_static(Phase::Setup, SETUP_MODULES, SETUP_KEYWORDS),
                PhasePattern::from_static(Phase::Install, INSTALL_MODULES, INSTALL_KEYWORDS),
                PhasePattern::from_static(Phase::Configure, CONFIGURE_MODULES, CONFIGURE_KEYWORDS),
                PhasePattern::from_static(Phase::Deploy, DEPLOY_MODULES, DEPLOY_KEYWORDS),
                PhasePattern::from_static(Phase::Activate, ACTIVATE_MODULES, ACTIVATE_KEYWORDS),
                PhasePattern::from_static(Phase::Verify, VERIFY_MODULES, VERIFY_KEYWORDS),
                PhasePattern::from_static(Phase::Cleanup, &[], CLEANUP_KEYWORDS),
            ],
        }
    }
}

impl PhasePatterns {
    /// Build a table from explicit entries, keeping their order
    pub fn new(entries: Vec<PhasePattern>) -> Self {
        Self { entries }
    }

    /// Load a table from a YAML list of phase entries
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let patterns: PhasePatterns =
            serde_yaml::from_str(contents).context("Invalid phase pattern table")?;
        if patterns.entries.iter().any(|e| e.phase == Phase::Unknown) {
            anyhow::bail!("Invalid phase pattern table: `unknown` cannot carry patterns");
        }
        Ok(patterns)
    }

    /// Entries in tie-break order
    pub fn entries(&self) -> &[PhasePattern] {
        &self.entries
    }

    /// Signals for one phase
    pub fn get(&self, phase: Phase) -> Option<&PhasePattern> {
        self.entries.iter().find(|e| e.phase == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_follows_phase_order() {
        let patterns = PhasePatterns::default();
        let phases: Vec<Phase> = patterns.entries().iter().map(|e| e.phase).collect();
        assert_eq!(phases, Phase::KNOWN.to_vec());
    }

    #[test]
    fn test_keyword_match_is_substring() {
        let patterns = PhasePatterns::default();
        let activate = patterns.get(Phase::Activate).unwrap();
        assert!(activate.matches_name("restart nginx"));
        assert!(!activate.matches_name(""));
        assert!(activate.matches_module("systemd"));
        assert!(!activate.matches_module("ansible.builtin.systemd"));
    }

    #[test]
    fn test_load_custom_table() {
        let yaml = r#"
- phase: verify
  modules: [command]
  keywords: [smoke]
- phase: install
  modules: [apt]
"#;
        let patterns = PhasePatterns::from_yaml_str(yaml).unwrap();
        assert_eq!(patterns.entries().len(), 2);
        assert_eq!(patterns.entries()[0].phase, Phase::Verify);
        assert!(patterns.get(Phase::Install).unwrap().keywords.is_empty());
    }

    #[test]
    fn test_unknown_phase_rejected() {
        assert!(PhasePatterns::from_yaml_str("- phase: unknown\n  modules: [ping]\n").is_err());
        assert!(PhasePatterns::from_yaml_str("- phase: teardown\n").is_err());
    }
}
