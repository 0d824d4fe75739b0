//! External system integration detection
//!
//! Every task module is checked against the rule tables in precedence order:
//! api, database, vault, cloud, network, container, monitoring. The first
//! matching category wins, so one task feeds at most one integration point.

use crate::includes::{ROLE_INCLUDE_MODULES, TASK_INCLUDE_MODULES};
use crate::role::{scalar_to_string, short_module_name, RoleRecord, Task};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeSet;

/// Most endpoints kept per integration point
pub const MAX_ENDPOINTS: usize = 5;
/// Most ports kept per integration point
pub const MAX_PORTS: usize = 10;
/// Most service identifiers kept per integration point
pub const MAX_SERVICES: usize = 10;

const API_MODULES: &[&str] = &["uri", "get_url", "win_uri", "win_get_url"];

const DATABASE_PREFIXES: &[&str] = &[
    "postgresql_",
    "mysql_",
    "mongodb_",
    "redis",
    "mssql_",
    "influxdb_",
    "elasticsearch_",
];

const VAULT_SUBSTRINGS: &[&str] = &["vault", "cyberark", "conjur"];

const AWS_PREFIXES: &[&str] = &[
    "aws_",
    "ec2",
    "s3_",
    "rds",
    "route53",
    "cloudformation",
    "lambda",
    "iam_",
];
const CLOUD_PREFIXES: &[&str] = &[
    "azure_",
    "gcp_",
    "gce",
    "os_",
    "openstack_",
    "digital_ocean",
    "linode",
];
const CLOUD_SUBSTRINGS: &[&str] = &["cloud"];

const NETWORK_MODULES: &[&str] = &[
    "firewalld",
    "ufw",
    "iptables",
    "nmcli",
    "wait_for",
    "nsupdate",
    "haproxy",
];
const FIREWALL_MODULES: &[&str] = &["firewalld", "ufw", "iptables"];
const NETWORK_PREFIXES: &[&str] = &["ios_", "nxos_", "eos_", "junos_", "vyos_", "net_"];

const CONTAINER_PREFIXES: &[&str] = &["docker_", "podman_", "k8s", "kubernetes", "helm", "openshift_"];

const MONITORING_SUBSTRINGS: &[&str] = &[
    "datadog",
    "prometheus",
    "grafana",
    "nagios",
    "zabbix",
    "newrelic",
    "sensu",
    "pagerduty",
    "statsd",
];

/// Parameter key substrings that mean a task passes credentials
pub const CREDENTIAL_KEYS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "api_key",
    "apikey",
    "auth_token",
    "auth_key",
    "secret",
    "credential",
    "private_key",
    "access_key",
];

const ENDPOINT_KEYS: &[&str] = &["url", "uri", "dest", "src"];
const PORT_KEYS: &[&str] = &["port", "ports", "dest_port", "source_port"];
const SERVICE_KEYS: &[&str] = &[
    "login_host",
    "host",
    "server",
    "db",
    "database",
    "image",
    "bucket",
    "namespace",
];

static ENDPOINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?)://([^/?#\s]+)([^?#\s]*)").expect("valid endpoint regex")
});

/// Class of external system a role talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    /// HTTP APIs
    Api,
    /// Database servers
    Database,
    /// Secret stores
    Vault,
    /// Cloud providers
    Cloud,
    /// Firewalls, DNS and network devices
    Network,
    /// Container runtimes and orchestrators
    Container,
    /// Monitoring and alerting services
    Monitoring,
}

impl IntegrationType {
    /// All types in precedence order
    pub const ALL: [IntegrationType; 7] = [
        IntegrationType::Api,
        IntegrationType::Database,
        IntegrationType::Vault,
        IntegrationType::Cloud,
        IntegrationType::Network,
        IntegrationType::Container,
        IntegrationType::Monitoring,
    ];

    /// Lower-case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Api => "api",
            IntegrationType::Database => "database",
            IntegrationType::Vault => "vault",
            IntegrationType::Cloud => "cloud",
            IntegrationType::Network => "network",
            IntegrationType::Container => "container",
            IntegrationType::Monitoring => "monitoring",
        }
    }

    fn matches(&self, module: &str) -> bool {
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| module.starts_with(p));
        let contains = |needles: &[&str]| needles.iter().any(|n| module.contains(n));
        match self {
            IntegrationType::Api => API_MODULES.contains(&module),
            IntegrationType::Database => starts(DATABASE_PREFIXES),
            IntegrationType::Vault => contains(VAULT_SUBSTRINGS),
            IntegrationType::Cloud => {
                starts(AWS_PREFIXES) || starts(CLOUD_PREFIXES) || contains(CLOUD_SUBSTRINGS)
            }
            IntegrationType::Network => NETWORK_MODULES.contains(&module) || starts(NETWORK_PREFIXES),
            IntegrationType::Container => starts(CONTAINER_PREFIXES),
            IntegrationType::Monitoring => contains(MONITORING_SUBSTRINGS),
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one module name; include modules never count as integrations
pub fn classify_integration(module: &str) -> Option<IntegrationType> {
    if TASK_INCLUDE_MODULES.contains(&module) || ROLE_INCLUDE_MODULES.contains(&module) {
        return None;
    }
    let short = short_module_name(module);
    if short.is_empty() {
        return None;
    }
    IntegrationType::ALL.into_iter().find(|kind| kind.matches(&short))
}

/// Integration type of a task, if any
pub fn task_integration(task: &Task) -> Option<IntegrationType> {
    classify_integration(&task.module)
}

/// One external system class the role depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPoint {
    /// System class
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    /// Human-readable system name, e.g. `PostgreSQL`
    pub system_name: String,
    /// Modules used to talk to the system
    pub modules_used: BTreeSet<String>,
    /// Number of tasks touching the system
    pub task_count: usize,
    /// Whether any task passes credential parameters
    pub uses_credentials: bool,
    /// Up to five distinct `scheme://host/path` endpoints
    pub endpoints: Vec<String>,
    /// Up to ten distinct ports, ascending
    pub ports: Vec<u16>,
    /// Hosts, databases, images and similar identifiers
    pub services: Vec<String>,
    /// Task files touching the system
    pub details: Vec<String>,
}

/// Whether a task carries a credential-like parameter key
pub fn uses_credentials(task: &Task) -> bool {
    task.params
        .keys()
        .filter_map(Value::as_str)
        .any(is_credential_key)
}

/// Match a parameter key against [`CREDENTIAL_KEYS`] segment by segment
///
/// Keys split on `_`, `-` and `.`; a hint matches a run of whole segments,
/// optionally pluralized with a trailing `s`.
pub fn is_credential_key(key: &str) -> bool {
    let key = key.to_lowercase();
    let segments: Vec<&str> = key
        .split(|c| matches!(c, '_' | '-' | '.'))
        .filter(|segment| !segment.is_empty())
        .collect();

    CREDENTIAL_KEYS.iter().any(|hint| {
        let width = hint.split('_').count();
        segments.windows(width).any(|window| {
            let joined = window.join("_");
            joined == *hint || joined.strip_suffix('s') == Some(*hint)
        })
    })
}

/// `scheme://netloc/path` of an http(s) URL
pub fn endpoint_of(url: &str) -> Option<String> {
    let captures = ENDPOINT.captures(url.trim())?;
    Some(format!(
        "{}://{}{}",
        &captures[1],
        &captures[2],
        captures.get(3).map(|m| m.as_str()).unwrap_or_default()
    ))
}

fn port_values(value: &Value, out: &mut Vec<u16>) {
    match value {
        Value::Number(n) => {
            if let Some(port) = n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                out.push(port);
            }
        }
        Value::String(text) => {
            if let Ok(port) = text.trim().parse::<u16>() {
                out.push(port);
            }
        }
        Value::Sequence(items) => items.iter().for_each(|v| port_values(v, out)),
        _ => {}
    }
}

fn push_unique(list: &mut Vec<String>, item: String, limit: usize) {
    if list.len() < limit && !list.contains(&item) {
        list.push(item);
    }
}

/// Human-readable name of the system behind a set of modules
pub fn system_name(kind: IntegrationType, modules: &BTreeSet<String>) -> String {
    let shorts: Vec<String> = modules.iter().map(|m| short_module_name(m)).collect();
    let named = |table: &[(&str, &str)], fallback: &str| {
        let mut names: Vec<&str> = Vec::new();
        for (needle, name) in table {
            if shorts.iter().any(|m| m.contains(needle)) && !names.contains(name) {
                names.push(*name);
            }
        }
        if names.is_empty() {
            fallback.to_string()
        } else {
            names.join(", ")
        }
    };
    let any_prefix = |prefixes: &[&str]| {
        shorts
            .iter()
            .any(|m| prefixes.iter().any(|p| m.starts_with(p)))
    };

    match kind {
        IntegrationType::Api => "REST API".to_string(),
        IntegrationType::Database => named(
            &[
                ("postgresql", "PostgreSQL"),
                ("mysql", "MySQL"),
                ("mongodb", "MongoDB"),
                ("redis", "Redis"),
                ("mssql", "SQL Server"),
                ("influxdb", "InfluxDB"),
                ("elasticsearch", "Elasticsearch"),
            ],
            "Database",
        ),
        IntegrationType::Vault => named(
            &[("vault", "HashiCorp Vault"), ("cyberark", "CyberArk"), ("conjur", "Conjur")],
            "Secret Store",
        ),
        IntegrationType::Cloud if any_prefix(AWS_PREFIXES) => "AWS".to_string(),
        IntegrationType::Cloud => named(
            &[
                ("azure", "Azure"),
                ("gcp_", "Google Cloud"),
                ("gce", "Google Cloud"),
                ("openstack", "OpenStack"),
                ("os_", "OpenStack"),
                ("digital_ocean", "DigitalOcean"),
                ("linode", "Linode"),
            ],
            "Cloud Provider",
        ),
        IntegrationType::Network => {
            if any_prefix(FIREWALL_MODULES) {
                "Firewall".to_string()
            } else if any_prefix(NETWORK_PREFIXES) {
                "Network Devices".to_string()
            } else {
                "Network Services".to_string()
            }
        }
        IntegrationType::Container => named(
            &[
                ("docker", "Docker"),
                ("podman", "Podman"),
                ("k8s", "Kubernetes"),
                ("helm", "Helm"),
                ("openshift", "OpenShift"),
            ],
            "Container Platform",
        ),
        IntegrationType::Monitoring => named(
            &[
                ("datadog", "Datadog"),
                ("prometheus", "Prometheus"),
                ("grafana", "Grafana"),
                ("nagios", "Nagios"),
                ("zabbix", "Zabbix"),
                ("newrelic", "New Relic"),
                ("sensu", "Sensu"),
                ("pagerduty", "PagerDuty"),
                ("statsd", "StatsD"),
            ],
            "Monitoring",
        ),
    }
}

/// Group every integration task of the role into one point per type
///
/// Points appear in the order their type is first seen in the role.
pub fn detect_integrations(role: &RoleRecord) -> Vec<IntegrationPoint> {
    let mut points: Vec<IntegrationPoint> = Vec::new();
    let mut ports: Vec<Vec<u16>> = Vec::new();

    for (file, task) in role.all_tasks() {
        let Some(kind) = task_integration(task) else {
            continue;
        };
        let index = match points.iter().position(|p| p.integration_type == kind) {
            Some(index) => index,
            None => {
                points.push(IntegrationPoint {
                    integration_type: kind,
                    system_name: String::new(),
                    modules_used: BTreeSet::new(),
                    task_count: 0,
                    uses_credentials: false,
                    endpoints: Vec::new(),
                    ports: Vec::new(),
                    services: Vec::new(),
                    details: Vec::new(),
                });
                ports.push(Vec::new());
                points.len() - 1
            }
        };

        let point = &mut points[index];
        point.modules_used.insert(task.module.clone());
        point.task_count += 1;
        point.uses_credentials |= uses_credentials(task);
        for key in ENDPOINT_KEYS {
            if let Some(endpoint) = task
                .param_str(key)
                .filter(|v| v.starts_with("http"))
                .and_then(|v| endpoint_of(&v))
            {
                push_unique(&mut point.endpoints, endpoint, MAX_ENDPOINTS);
            }
        }
        for key in PORT_KEYS {
            if let Some(value) = task.param(key) {
                port_values(value, &mut ports[index]);
            }
        }
        for key in SERVICE_KEYS {
            if let Some(service) = task.param(key).and_then(scalar_to_string) {
                push_unique(&mut point.services, service, MAX_SERVICES);
            }
        }
        if !point.details.contains(&file.file) {
            point.details.push(file.file.clone());
        }
    }

    for (point, mut found) in points.iter_mut().zip(ports) {
        found.sort_unstable();
        found.dedup();
        found.truncate(MAX_PORTS);
        point.ports = found;
        point.system_name = system_name(point.integration_type, &point.modules_used);
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::TaskFile;

    #[test]
    fn test_classification_precedence() {
        assert_eq!(classify_integration("uri"), Some(IntegrationType::Api));
        assert_eq!(
            classify_integration("community.postgresql.postgresql_db"),
            Some(IntegrationType::Database)
        );
        assert_eq!(classify_integration("redis_info"), Some(IntegrationType::Database));
        assert_eq!(classify_integration("hashi_vault"), Some(IntegrationType::Vault));
        assert_eq!(classify_integration("amazon.aws.ec2_instance"), Some(IntegrationType::Cloud));
        assert_eq!(classify_integration("cloudflare_dns"), Some(IntegrationType::Cloud));
        assert_eq!(classify_integration("firewalld"), Some(IntegrationType::Network));
        assert_eq!(classify_integration("docker_container"), Some(IntegrationType::Container));
        assert_eq!(classify_integration("k8s_info"), Some(IntegrationType::Container));
        assert_eq!(classify_integration("datadog_monitor"), Some(IntegrationType::Monitoring));
        assert_eq!(classify_integration("apt"), None);
        assert_eq!(classify_integration("include_tasks"), None);
        assert_eq!(classify_integration(""), None);
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            endpoint_of("https://api.example.com:8443/v1/items?page=2").as_deref(),
            Some("https://api.example.com:8443/v1/items")
        );
        assert_eq!(endpoint_of("http://host").as_deref(), Some("http://host"));
        assert_eq!(endpoint_of("/etc/app.conf"), None);
    }

    #[test]
    fn test_detect_integrations_merges_across_files() {
        let role = RoleRecord::from_task_files(vec![
            TaskFile::new(
                "db.yml",
                vec![
                    Task::new("postgresql_db").with("name", "app").with("login_password", "x"),
                    Task::new("postgresql_user").with("port", 5432),
                    Task::new("uri")
                        .with("url", "https://api.example.com/v1/health")
                        .with("port", "8080"),
                ],
            ),
            TaskFile::new(
                "extra.yml",
                vec![
                    Task::new("mysql_db").with("ports", vec![3306, 3306]),
                    Task::new("uri").with("url", "https://api.example.com/v1/health"),
                ],
            ),
        ]);

        let points = detect_integrations(&role);
        assert_eq!(points.len(), 2);

        let db = &points[0];
        assert_eq!(db.integration_type, IntegrationType::Database);
        assert_eq!(db.task_count, 3);
        assert!(db.uses_credentials);
        assert_eq!(db.system_name, "PostgreSQL, MySQL");
        assert_eq!(db.ports, vec![3306, 5432]);
        assert_eq!(db.details, vec!["db.yml".to_string(), "extra.yml".to_string()]);

        let api = &points[1];
        assert_eq!(api.integration_type, IntegrationType::Api);
        assert!(!api.uses_credentials);
        assert_eq!(api.endpoints, vec!["https://api.example.com/v1/health".to_string()]);
        assert_eq!(api.ports, vec![8080]);
    }

    #[test]
    fn test_limits() {
        let tasks = (0..12)
            .map(|i| {
                Task::new("uri")
                    .with("url", format!("https://svc{}.example.com/", i))
                    .with("port", 9000 - i)
            })
            .collect();
        let role = RoleRecord::from_task_files(vec![TaskFile::new("main.yml", tasks)]);
        let point = &detect_integrations(&role)[0];
        assert_eq!(point.endpoints.len(), MAX_ENDPOINTS);
        assert_eq!(point.ports.len(), MAX_PORTS);
        assert_eq!(point.ports[0], 8989);
        assert!(point.ports.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_credential_keys() {
        assert!(uses_credentials(&Task::new("hashi_vault").with("vault_token", "{{ t }}")));
        assert!(uses_credentials(&Task::new("uri").with("url_password", "x")));
        assert!(!uses_credentials(&Task::new("uri").with("url", "https://x")));
        assert!(uses_credentials(&Task::new("mysql_user").with("login_password", "x")));
    }

    #[test]
    fn test_credential_keys_match_whole_segments() {
        assert!(!uses_credentials(&Task::new("uri").with("force_basic_auth", true)));
        assert!(!uses_credentials(&Task::new("user").with("tokenizer", "x")));
        assert!(!is_credential_key("author"));
        assert!(is_credential_key("aws_secret_key"));
        assert!(is_credential_key("client-secrets"));
        assert!(is_credential_key("ssh_private_key_file"));
        assert!(is_credential_key("api.key"));
        assert!(!is_credential_key("private"));
    }

    #[test]
    fn test_system_names() {
        let modules = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        assert_eq!(system_name(IntegrationType::Vault, &modules(&["hashi_vault"])), "HashiCorp Vault");
        assert_eq!(system_name(IntegrationType::Database, &modules(&["neo4j_query"])), "Database");
        assert_eq!(system_name(IntegrationType::Cloud, &modules(&["s3_bucket"])), "AWS");
        assert_eq!(system_name(IntegrationType::Cloud, &modules(&["gcp_compute", "gce_pd"])), "Google Cloud");
    }
}
