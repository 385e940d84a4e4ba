//! Scenario file parser.
//!
//! A scenario describes the resource graph (clusters, nodes, services),
//! the networking objects attached to services, and optionally a load test
//! to run against one of them. Entries reference each other by name;
//! service names are unique across the whole scenario.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SimConfig;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScenarioFile {
    #[serde(default)]
    pub simulation: SimConfig,
    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancerEntry>,
    #[serde(default)]
    pub cluster_services: Vec<ClusterServiceEntry>,
    #[serde(default)]
    pub ingresses: Vec<IngressEntry>,
    #[serde(default)]
    pub network_policies: Vec<NetworkPolicyEntry>,
    pub load_test: Option<LoadTestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterEntry {
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// "managed" or "self-managed".
    #[serde(default = "default_cluster_kind")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeEntry {
    pub name: String,
    pub cluster: String,
    #[serde(default = "default_node_type")]
    pub node_type: String,
    #[serde(default = "default_zone")]
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceEntry {
    pub name: String,
    pub cluster: String,
    /// "nodejs", "python", "golang" or "rust".
    #[serde(default = "default_tech")]
    pub tech: String,
    /// "backend", "frontend" or "microservice".
    #[serde(default = "default_service_kind")]
    pub kind: String,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit_percent: u32,
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u32,
    #[serde(default = "default_response_time")]
    pub response_time_ms: u32,
    /// Requests per second one replica sustains before overload.
    #[serde(default = "default_throughput")]
    pub throughput: u64,
    #[serde(default = "default_pod_startup")]
    pub pod_startup_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancerEntry {
    pub name: String,
    pub service: String,
    /// "external" or "internal".
    #[serde(default = "default_lb_kind")]
    pub kind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_target_port")]
    pub target_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterServiceEntry {
    pub name: String,
    pub service: String,
    /// "ClusterIP", "NodePort" or "LoadBalancer".
    #[serde(default = "default_cluster_service_kind")]
    pub kind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_target_port")]
    pub target_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngressEntry {
    pub name: String,
    pub service: String,
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyEntry {
    pub name: String,
    pub service: String,
    /// "allow" or "deny".
    #[serde(default = "default_policy_action")]
    pub action: String,
    /// "ingress", "egress" or "both".
    #[serde(default = "default_policy_direction")]
    pub direction: String,
    #[serde(default = "default_cidr")]
    pub cidr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadTestEntry {
    pub service: String,
    pub target_rps: u64,
    pub duration_secs: u64,
    /// "constant", "ramp" or "spike".
    #[serde(default = "default_traffic_shape")]
    pub traffic_shape: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_version() -> String {
    "1.28".to_string()
}
fn default_cluster_kind() -> String {
    "managed".to_string()
}
fn default_node_type() -> String {
    "t3.medium".to_string()
}
fn default_zone() -> String {
    "a".to_string()
}
fn default_tech() -> String {
    "nodejs".to_string()
}
fn default_service_kind() -> String {
    "backend".to_string()
}
fn default_min_replicas() -> u32 {
    1
}
fn default_max_replicas() -> u32 {
    10
}
fn default_cpu_limit() -> u32 {
    80
}
fn default_memory_limit() -> u32 {
    512
}
fn default_response_time() -> u32 {
    100
}
fn default_throughput() -> u64 {
    100
}
fn default_pod_startup() -> u64 {
    5
}
fn default_lb_kind() -> String {
    "external".to_string()
}
fn default_cluster_service_kind() -> String {
    "ClusterIP".to_string()
}
fn default_port() -> u16 {
    80
}
fn default_target_port() -> u16 {
    8080
}
fn default_path() -> String {
    "/".to_string()
}
fn default_policy_action() -> String {
    "allow".to_string()
}
fn default_policy_direction() -> String {
    "ingress".to_string()
}
fn default_cidr() -> String {
    "0.0.0.0/0".to_string()
}
fn default_traffic_shape() -> String {
    "constant".to_string()
}

impl ScenarioFile {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let scenario = Self::parse(&content)?;
        debug!(?path, services = scenario.services.len(), "scenario loaded");
        Ok(scenario)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross references and numeric bounds.
    ///
    /// Enum-like string fields (tech, kind, action...) are checked when the
    /// scenario is turned into a resource graph.
    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()?;

        let clusters = unique_names("cluster", self.clusters.iter().map(|c| c.name.as_str()))?;
        unique_names("node", self.nodes.iter().map(|n| n.name.as_str()))?;
        let services = unique_names("service", self.services.iter().map(|s| s.name.as_str()))?;

        for node in &self.nodes {
            if !clusters.contains(node.cluster.as_str()) {
                return Err(invalid(format!(
                    "node '{}' references unknown cluster '{}'",
                    node.name, node.cluster
                )));
            }
        }

        for svc in &self.services {
            if !clusters.contains(svc.cluster.as_str()) {
                return Err(invalid(format!(
                    "service '{}' references unknown cluster '{}'",
                    svc.name, svc.cluster
                )));
            }
            if svc.min_replicas > svc.max_replicas {
                return Err(invalid(format!(
                    "service '{}': min_replicas ({}) exceeds max_replicas ({})",
                    svc.name, svc.min_replicas, svc.max_replicas
                )));
            }
            if svc.throughput == 0 {
                return Err(invalid(format!("service '{}': throughput must be positive", svc.name)));
            }
        }

        let refs = self
            .load_balancers
            .iter()
            .map(|e| ("load balancer", e.name.as_str(), e.service.as_str()))
            .chain(
                self.cluster_services
                    .iter()
                    .map(|e| ("cluster service", e.name.as_str(), e.service.as_str())),
            )
            .chain(
                self.ingresses
                    .iter()
                    .map(|e| ("ingress", e.name.as_str(), e.service.as_str())),
            )
            .chain(
                self.network_policies
                    .iter()
                    .map(|e| ("network policy", e.name.as_str(), e.service.as_str())),
            );
        for (kind, name, service) in refs {
            if !services.contains(service) {
                return Err(invalid(format!(
                    "{kind} '{name}' targets unknown service '{service}'"
                )));
            }
        }

        if let Some(test) = &self.load_test {
            if !services.contains(test.service.as_str()) {
                return Err(invalid(format!(
                    "load test targets unknown service '{}'",
                    test.service
                )));
            }
            if test.target_rps == 0 || test.duration_secs == 0 {
                return Err(invalid(
                    "load test target_rps and duration_secs must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn unique_names<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> ConfigResult<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(invalid(format!("duplicate {kind} name '{name}'")));
        }
    }
    Ok(seen)
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
[simulation.engine]
seed = 7

[[clusters]]
name = "prod"

[[nodes]]
name = "node-a"
cluster = "prod"

[[services]]
name = "api"
cluster = "prod"
tech = "rust"
min_replicas = 2
max_replicas = 6
throughput = 150

[[load_balancers]]
name = "api-lb"
service = "api"

[[ingresses]]
name = "api-ing"
service = "api"
host = "api.example.com"
tls = true

[[network_policies]]
name = "deny-all"
service = "api"
action = "deny"

[load_test]
service = "api"
target_rps = 500
duration_secs = 30
traffic_shape = "spike"
"#;

    #[test]
    fn parse_full_scenario() {
        let scenario = ScenarioFile::parse(SCENARIO).unwrap();
        scenario.validate().unwrap();

        assert_eq!(scenario.simulation.engine.seed, 7);
        assert_eq!(scenario.clusters[0].region, "us-east-1");
        assert_eq!(scenario.nodes[0].node_type, "t3.medium");
        assert_eq!(scenario.services[0].throughput, 150);
        assert_eq!(scenario.services[0].pod_startup_secs, 5);
        assert!(scenario.ingresses[0].tls);
        assert_eq!(scenario.network_policies[0].action, "deny");

        let test = scenario.load_test.as_ref().unwrap();
        assert_eq!(test.traffic_shape, "spike");
        assert_eq!(test.duration_secs, 30);
    }

    #[test]
    fn parse_minimal() {
        let scenario = ScenarioFile::parse("").unwrap();
        scenario.validate().unwrap();
        assert!(scenario.services.is_empty());
        assert!(scenario.load_test.is_none());
    }

    #[test]
    fn toml_output_parses_back() {
        let scenario = ScenarioFile::parse(SCENARIO).unwrap();
        let rendered = scenario.to_toml_string().unwrap();
        assert!(rendered.contains("api.example.com"));
        assert_eq!(ScenarioFile::parse(&rendered).unwrap(), scenario);
    }

    #[test]
    fn unknown_cluster_rejected() {
        let toml_str = r#"
[[services]]
name = "api"
cluster = "missing"
"#;
        let err = ScenarioFile::parse(toml_str).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("unknown cluster 'missing'"));
    }

    #[test]
    fn min_above_max_rejected() {
        let toml_str = r#"
[[clusters]]
name = "prod"

[[services]]
name = "api"
cluster = "prod"
min_replicas = 5
max_replicas = 2
"#;
        let err = ScenarioFile::parse(toml_str).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max_replicas"));
    }

    #[test]
    fn dangling_network_reference_rejected() {
        let toml_str = r#"
[[network_policies]]
name = "deny"
service = "ghost"
"#;
        let err = ScenarioFile::parse(toml_str).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("network policy 'deny'"));
    }

    #[test]
    fn zero_rps_load_test_rejected() {
        let mut scenario = ScenarioFile::parse(SCENARIO).unwrap();
        if let Some(test) = scenario.load_test.as_mut() {
            test.target_rps = 0;
        }
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn duplicate_service_names_rejected() {
        let mut scenario = ScenarioFile::parse(SCENARIO).unwrap();
        let dup = scenario.services[0].clone();
        scenario.services.push(dup);
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate service name 'api'"));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            ScenarioFile::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));

        let present = dir.path().join("scenario.toml");
        std::fs::write(&present, SCENARIO).unwrap();
        let scenario = ScenarioFile::from_file(&present).unwrap();
        assert_eq!(scenario.services.len(), 1);
    }
}
