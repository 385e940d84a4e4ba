//! Domain types for the simulated resource graph.
//!
//! Clusters own nodes and services. A service is the unit under load test
//! and autoscaling: its `current_replicas`, `pending_pods`, `requests` and
//! `errors` fields are rewritten every simulated second while a test runs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Unique identifier for a cluster.
pub type ClusterId = u64;

/// Unique identifier for a worker node.
pub type NodeId = u64;

/// Unique identifier for a service (deployment).
pub type ServiceId = u64;

// ── Cluster ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub region: String,
    /// Kubernetes version label, e.g. "1.28".
    pub version: String,
    pub kind: ClusterKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterKind {
    Managed,
    SelfManaged,
}

// ── Node ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub cluster_id: ClusterId,
    /// Instance type label, e.g. "t3.medium".
    pub node_type: String,
    pub zone: String,
    pub status: NodeStatus,
    /// CPU usage in percent (0-100).
    pub cpu_usage: f64,
    /// Memory usage in percent (0-100).
    pub memory_usage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Draining,
    Drained,
    Failed,
}

// ── Service ───────────────────────────────────────────────────────

/// Runtime used by a service. Only affects labels in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technology {
    NodeJs,
    Python,
    Golang,
    Rust,
}

impl Technology {
    pub fn label(&self) -> &'static str {
        match self {
            Technology::NodeJs => "Node.js",
            Technology::Python => "Python",
            Technology::Golang => "Go",
            Technology::Rust => "Rust",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Backend,
    Frontend,
    Microservice,
}

/// A pod that has been requested but is not serving traffic yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodStart {
    pub id: String,
    /// Simulated time the pod was requested.
    pub started_at: Duration,
    /// Simulated time the pod joins the serving set.
    pub ready_at: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub cluster_id: ClusterId,
    pub tech: Technology,
    pub kind: ServiceKind,

    pub min_replicas: u32,
    pub max_replicas: u32,

    /// Requests per second one replica sustains before overload.
    pub throughput: u64,
    pub response_time_baseline_ms: u32,
    pub cpu_limit_percent: u32,
    pub memory_limit_mb: u32,
    /// Delay between requesting a pod and it serving traffic.
    pub pod_startup_secs: u64,

    /// Replicas currently serving traffic.
    pub current_replicas: u32,
    /// Pods mid-startup, not yet serving traffic.
    pub pending_pods: u32,
    /// Pods mid-startup, oldest first.
    pub starting_pods: Vec<PodStart>,
    /// Requests observed in the most recent tick (not cumulative).
    pub requests: u64,
    /// Errors accumulated across the run, decayed after it stops.
    pub errors: u64,
}

/// Traffic-light health classification shared by services and nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl Service {
    /// Replicas serving traffic plus pods still starting.
    pub fn serving_units(&self) -> u32 {
        self.current_replicas.saturating_add(self.pending_pods)
    }

    pub fn pod_startup(&self) -> Duration {
        Duration::from_secs(self.pod_startup_secs)
    }

    /// Errors relative to the last tick's requests, in percent.
    pub fn error_rate_percent(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.errors as f64 / self.requests as f64 * 100.0
    }

    /// Last tick's requests relative to one replica's throughput, in percent.
    pub fn load_percent(&self) -> f64 {
        if self.requests == 0 || self.throughput == 0 {
            return 0.0;
        }
        self.requests as f64 / self.throughput as f64 * 100.0
    }

    pub fn health(&self) -> HealthStatus {
        let error_rate = self.error_rate_percent();
        let load = self.load_percent();
        if error_rate > 10.0 || load > 90.0 {
            HealthStatus::Critical
        } else if error_rate > 5.0 || load > 70.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Node {
    pub fn health(&self) -> HealthStatus {
        if self.cpu_usage > 90.0 || self.memory_usage > 90.0 {
            HealthStatus::Critical
        } else if self.cpu_usage > 70.0 || self.memory_usage > 70.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

// ── Creation specs ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub name: String,
    pub region: String,
    pub version: String,
    pub kind: ClusterKind,
}

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub cluster_id: ClusterId,
    pub node_type: String,
    pub zone: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub cluster_id: ClusterId,
    pub tech: Technology,
    pub kind: ServiceKind,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub throughput: u64,
    pub response_time_baseline_ms: u32,
    pub cpu_limit_percent: u32,
    pub memory_limit_mb: u32,
    pub pod_startup_secs: u64,
}

impl ServiceSpec {
    /// A spec with the stock limits used by the deploy form.
    pub fn new(name: &str, cluster_id: ClusterId) -> Self {
        Self {
            name: name.to_string(),
            cluster_id,
            tech: Technology::NodeJs,
            kind: ServiceKind::Backend,
            min_replicas: 1,
            max_replicas: 10,
            throughput: 100,
            response_time_baseline_ms: 100,
            cpu_limit_percent: 80,
            memory_limit_mb: 512,
            pod_startup_secs: 5,
        }
    }
}

// ── String parsing (scenario files) ───────────────────────────────

macro_rules! impl_from_str {
    ($ty:ty, $what:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = StateError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(StateError::Validation(format!(
                        concat!("unknown ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

impl_from_str!(ClusterKind, "cluster kind", {
    "managed" => ClusterKind::Managed,
    "self-managed" => ClusterKind::SelfManaged,
});

impl_from_str!(Technology, "technology", {
    "nodejs" => Technology::NodeJs,
    "python" => Technology::Python,
    "golang" => Technology::Golang,
    "go" => Technology::Golang,
    "rust" => Technology::Rust,
});

impl_from_str!(ServiceKind, "service kind", {
    "backend" => ServiceKind::Backend,
    "frontend" => ServiceKind::Frontend,
    "microservice" => ServiceKind::Microservice,
});

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}
