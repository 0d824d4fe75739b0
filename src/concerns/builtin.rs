//! Built-in concern detectors
//!
//! Each built-in concern is a static [`PatternConcern`] entry. The table order
//! is the registration order, which breaks confidence ties in
//! [`super::ConcernRegistry::detect_all`].

use super::ConcernDetector;

/// A concern recognized purely from a static list of module patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternConcern {
    /// Stable identifier
    pub concern_name: &'static str,
    /// Human-readable name
    pub display_name: &'static str,
    /// Short description
    pub description: &'static str,
    /// Module patterns (exact, `prefix_`, or `_suffix`)
    pub module_patterns: &'static [&'static str],
    /// Suggested file name; `{concern_name}.yml` when `None`
    pub suggested_filename: Option<&'static str>,
    /// Lower values are more specific
    pub priority: u32,
}

impl ConcernDetector for PatternConcern {
    fn concern_name(&self) -> &str {
        self.concern_name
    }

    fn display_name(&self) -> &str {
        self.display_name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn module_patterns(&self) -> &[&str] {
        self.module_patterns
    }

    fn suggested_filename(&self) -> String {
        match self.suggested_filename {
            Some(filename) => filename.to_string(),
            None => format!("{}.yml", self.concern_name),
        }
    }

    fn priority(&self) -> u32 {
        self.priority
    }
}

/// The ten built-in concerns in registration order
pub const BUILTIN_CONCERNS: &[PatternConcern] = &[
    PatternConcern {
        concern_name: "package_installation",
        display_name: "Package Installation",
        description: "Installing, upgrading, and removing software packages and repositories",
        module_patterns: &[
            "apt",
            "apt_key",
            "apt_repository",
            "yum",
            "yum_repository",
            "dnf",
            "package",
            "pip",
            "npm",
            "gem",
            "zypper",
            "pacman",
            "apk",
            "homebrew",
            "snap",
            "rpm_key",
            "dpkg_selections",
        ],
        suggested_filename: Some("install.yml"),
        priority: 10,
    },
    PatternConcern {
        concern_name: "configuration",
        display_name: "Configuration Management",
        description: "Rendering and editing configuration files",
        module_patterns: &[
            "template",
            "copy",
            "lineinfile",
            "blockinfile",
            "replace",
            "ini_file",
            "xml",
            "assemble",
            "sysctl",
        ],
        suggested_filename: Some("configure.yml"),
        priority: 20,
    },
    PatternConcern {
        concern_name: "service_management",
        display_name: "Service Management",
        description: "Starting, stopping, enabling, and reloading services",
        module_patterns: &[
            "service",
            "systemd",
            "sysvinit",
            "supervisorctl",
            "launchd",
            "runit",
            "_service",
        ],
        suggested_filename: Some("service.yml"),
        priority: 15,
    },
    PatternConcern {
        concern_name: "identity",
        display_name: "Users and Permissions",
        description: "Managing users, groups, SSH keys, and privilege rules",
        module_patterns: &[
            "user",
            "group",
            "authorized_key",
            "known_hosts",
            "acl",
            "sudoers",
            "pamd",
        ],
        suggested_filename: Some("users.yml"),
        priority: 20,
    },
    PatternConcern {
        concern_name: "filesystem",
        display_name: "Filesystem Layout",
        description: "Creating directories, links, mounts, and inspecting paths",
        module_patterns: &[
            "file",
            "find",
            "mount",
            "filesystem",
            "lvg",
            "lvol",
            "parted",
            "synchronize",
            "tempfile",
        ],
        suggested_filename: None,
        priority: 30,
    },
    PatternConcern {
        concern_name: "network",
        display_name: "Network Configuration",
        description: "Firewall rules, interfaces, and host networking",
        module_patterns: &[
            "firewalld",
            "ufw",
            "iptables",
            "nmcli",
            "hostname",
            "interfaces_file",
            "net_",
        ],
        suggested_filename: None,
        priority: 25,
    },
    PatternConcern {
        concern_name: "windows",
        display_name: "Windows Management",
        description: "Windows and PowerShell specific operations",
        module_patterns: &["win_", "psexec", "_powershell"],
        suggested_filename: None,
        priority: 5,
    },
    PatternConcern {
        concern_name: "artifact_management",
        display_name: "Artifact Management",
        description: "Fetching, unpacking, and checking out release artifacts",
        module_patterns: &[
            "get_url",
            "unarchive",
            "archive",
            "git",
            "maven_artifact",
            "fetch",
        ],
        suggested_filename: Some("artifacts.yml"),
        priority: 25,
    },
    PatternConcern {
        concern_name: "database",
        display_name: "Database Operations",
        description: "Creating databases, users, and grants",
        module_patterns: &["postgresql_", "mysql_", "mongodb_", "redis", "mssql_", "influxdb_"],
        suggested_filename: None,
        priority: 10,
    },
    PatternConcern {
        concern_name: "verification",
        display_name: "Verification",
        description: "Asserting state, probing endpoints, and waiting for readiness",
        module_patterns: &[
            "assert",
            "fail",
            "uri",
            "wait_for",
            "wait_for_connection",
            "stat",
            "service_facts",
            "package_facts",
        ],
        suggested_filename: Some("verify.yml"),
        priority: 40,
    },
];

/// Fresh boxed instances of every built-in detector
pub fn builtin_detectors() -> Vec<Box<dyn ConcernDetector>> {
    BUILTIN_CONCERNS
        .iter()
        .map(|concern| Box::new(*concern) as Box<dyn ConcernDetector>)
        .collect()
}
