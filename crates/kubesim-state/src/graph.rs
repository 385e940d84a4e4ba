//! ResourceGraph: the in-memory cluster/node/service model.
//!
//! Lookups are by id, filters are by parent cluster. The graph validates
//! deploy requests the same way the deploy form does (resource-name rules,
//! replica bounds, unique name per cluster, a cluster with capacity).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::types::*;

static RESOURCE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").ok());

/// Kubernetes-style resource name: lowercase alphanumerics and hyphens,
/// at most 63 characters.
pub fn validate_resource_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    match RESOURCE_NAME.as_ref() {
        Some(re) => re.is_match(name),
        None => name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'),
    }
}

/// Counts shown on the dashboard header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphTotals {
    pub clusters: usize,
    pub nodes: usize,
    /// Serving replicas summed over every service.
    pub pods: u64,
    /// Sum of every service's last-tick requests.
    pub requests: u64,
}

/// Average node utilisation across the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceGraph {
    clusters: BTreeMap<ClusterId, Cluster>,
    nodes: BTreeMap<NodeId, Node>,
    services: BTreeMap<ServiceId, Service>,
    next_id: u64,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn add_cluster(&mut self, spec: ClusterSpec) -> StateResult<ClusterId> {
        if !validate_resource_name(&spec.name) {
            return Err(invalid_name("cluster", &spec.name));
        }
        if self.clusters.values().any(|c| c.name == spec.name) {
            return Err(StateError::Validation(format!(
                "cluster '{}' already exists",
                spec.name
            )));
        }
        let id = self.allocate_id();
        info!(id, cluster = %spec.name, region = %spec.region, "cluster created");
        self.clusters.insert(
            id,
            Cluster {
                id,
                name: spec.name,
                region: spec.region,
                version: spec.version,
                kind: spec.kind,
            },
        );
        Ok(id)
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Remove a cluster together with its nodes and services.
    pub fn remove_cluster(&mut self, id: ClusterId) -> StateResult<Cluster> {
        let cluster = self
            .clusters
            .remove(&id)
            .ok_or_else(|| StateError::NotFound(format!("cluster {id}")))?;
        self.nodes.retain(|_, n| n.cluster_id != id);
        self.services.retain(|_, s| s.cluster_id != id);
        info!(id, cluster = %cluster.name, "cluster removed");
        Ok(cluster)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    pub fn add_node(&mut self, spec: NodeSpec) -> StateResult<NodeId> {
        if !validate_resource_name(&spec.name) {
            return Err(invalid_name("node", &spec.name));
        }
        if !self.clusters.contains_key(&spec.cluster_id) {
            return Err(StateError::NotFound(format!("cluster {}", spec.cluster_id)));
        }
        if self
            .nodes
            .values()
            .any(|n| n.cluster_id == spec.cluster_id && n.name == spec.name)
        {
            return Err(StateError::Validation(format!(
                "node '{}' already exists in cluster {}",
                spec.name, spec.cluster_id
            )));
        }
        let id = self.allocate_id();
        debug!(id, node = %spec.name, cluster_id = spec.cluster_id, "node added");
        self.nodes.insert(
            id,
            Node {
                id,
                name: spec.name,
                cluster_id: spec.cluster_id,
                node_type: spec.node_type,
                zone: spec.zone,
                status: NodeStatus::Running,
                cpu_usage: spec.cpu_usage.clamp(0.0, 100.0),
                memory_usage: spec.memory_usage.clamp(0.0, 100.0),
            },
        );
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn nodes_in_cluster(&self, cluster_id: ClusterId) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.cluster_id == cluster_id)
            .collect()
    }

    pub fn nodes_in_cluster_mut(&mut self, cluster_id: ClusterId) -> Vec<&mut Node> {
        self.nodes
            .values_mut()
            .filter(|n| n.cluster_id == cluster_id)
            .collect()
    }

    pub fn remove_node(&mut self, id: NodeId) -> StateResult<Node> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or_else(|| StateError::NotFound(format!("node {id}")))?;
        debug!(id, node = %node.name, "node removed");
        Ok(node)
    }

    // ── Services ───────────────────────────────────────────────────

    /// Deploy a service. It starts with `min_replicas` serving and no traffic.
    pub fn deploy_service(&mut self, spec: ServiceSpec) -> StateResult<ServiceId> {
        if !validate_resource_name(&spec.name) {
            return Err(invalid_name("service", &spec.name));
        }
        if spec.min_replicas > spec.max_replicas {
            return Err(StateError::Validation(format!(
                "service '{}': min replicas ({}) exceeds max replicas ({})",
                spec.name, spec.min_replicas, spec.max_replicas
            )));
        }
        if spec.throughput == 0 {
            return Err(StateError::Validation(format!(
                "service '{}': throughput must be positive",
                spec.name
            )));
        }
        if !self.clusters.contains_key(&spec.cluster_id) {
            return Err(StateError::NotFound(format!("cluster {}", spec.cluster_id)));
        }
        if !self.nodes.values().any(|n| n.cluster_id == spec.cluster_id) {
            return Err(StateError::Validation(format!(
                "cluster {} has no nodes to schedule '{}' on",
                spec.cluster_id, spec.name
            )));
        }
        if self
            .services
            .values()
            .any(|s| s.cluster_id == spec.cluster_id && s.name == spec.name)
        {
            return Err(StateError::Validation(format!(
                "service '{}' already exists in cluster {}",
                spec.name, spec.cluster_id
            )));
        }

        let id = self.allocate_id();
        info!(
            id,
            service = %spec.name,
            tech = spec.tech.label(),
            replicas = spec.min_replicas,
            "service deployed"
        );
        self.services.insert(
            id,
            Service {
                id,
                name: spec.name,
                cluster_id: spec.cluster_id,
                tech: spec.tech,
                kind: spec.kind,
                min_replicas: spec.min_replicas,
                max_replicas: spec.max_replicas,
                throughput: spec.throughput,
                response_time_baseline_ms: spec.response_time_baseline_ms,
                cpu_limit_percent: spec.cpu_limit_percent,
                memory_limit_mb: spec.memory_limit_mb,
                pod_startup_secs: spec.pod_startup_secs,
                current_replicas: spec.min_replicas,
                pending_pods: 0,
                starting_pods: Vec::new(),
                requests: 0,
                errors: 0,
            },
        );
        Ok(id)
    }

    pub fn service(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(&id)
    }

    pub fn service_mut(&mut self, id: ServiceId) -> Option<&mut Service> {
        self.services.get_mut(&id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn services_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.services.values_mut()
    }

    pub fn services_in_cluster(&self, cluster_id: ClusterId) -> Vec<&Service> {
        self.services
            .values()
            .filter(|s| s.cluster_id == cluster_id)
            .collect()
    }

    /// First service with the given name, in id order.
    pub fn find_service(&self, name: &str) -> Option<&Service> {
        self.services.values().find(|s| s.name == name)
    }

    /// Manually add or remove one replica. Returns the new replica count;
    /// a step that would leave `[min, max]` is a no-op.
    pub fn scale_service(&mut self, id: ServiceId, delta: i32) -> StateResult<u32> {
        let svc = self
            .services
            .get_mut(&id)
            .ok_or_else(|| StateError::NotFound(format!("service {id}")))?;
        let target = i64::from(svc.current_replicas) + i64::from(delta.signum());
        if target >= i64::from(svc.min_replicas) && target <= i64::from(svc.max_replicas) {
            svc.current_replicas = target as u32;
            info!(service = %svc.name, replicas = svc.current_replicas, "service scaled manually");
        }
        Ok(svc.current_replicas)
    }

    pub fn remove_service(&mut self, id: ServiceId) -> StateResult<Service> {
        let svc = self
            .services
            .remove(&id)
            .ok_or_else(|| StateError::NotFound(format!("service {id}")))?;
        info!(id, service = %svc.name, "service removed");
        Ok(svc)
    }

    // ── Aggregates ─────────────────────────────────────────────────

    pub fn totals(&self) -> GraphTotals {
        GraphTotals {
            clusters: self.clusters.len(),
            nodes: self.nodes.len(),
            pods: self
                .services
                .values()
                .map(|s| u64::from(s.current_replicas))
                .sum(),
            requests: self.services.values().map(|s| s.requests).sum(),
        }
    }

    /// Average cpu/memory over every node; zero when there are no nodes.
    pub fn resource_usage(&self) -> ResourceUsage {
        if self.nodes.is_empty() {
            return ResourceUsage {
                cpu_percent: 0.0,
                memory_percent: 0.0,
            };
        }
        let count = self.nodes.len() as f64;
        let (cpu, mem) = self
            .nodes
            .values()
            .fold((0.0, 0.0), |(c, m), n| (c + n.cpu_usage, m + n.memory_usage));
        ResourceUsage {
            cpu_percent: cpu / count,
            memory_percent: mem / count,
        }
    }
}

fn invalid_name(kind: &str, name: &str) -> StateError {
    StateError::Validation(format!(
        "{kind} name '{name}' must be 1-63 lowercase letters, digits or hyphens"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str) -> ClusterSpec {
        ClusterSpec {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            version: "1.28".to_string(),
            kind: ClusterKind::Managed,
        }
    }

    fn node(name: &str, cluster_id: ClusterId) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            cluster_id,
            node_type: "t3.medium".to_string(),
            zone: "a".to_string(),
            cpu_usage: 40.0,
            memory_usage: 60.0,
        }
    }

    fn graph_with_cluster() -> (ResourceGraph, ClusterId) {
        let mut graph = ResourceGraph::new();
        let cid = graph.add_cluster(cluster("prod")).unwrap();
        graph.add_node(node("node-1", cid)).unwrap();
        (graph, cid)
    }

    #[test]
    fn resource_name_rules() {
        assert!(validate_resource_name("api-v2"));
        assert!(!validate_resource_name(""));
        assert!(!validate_resource_name("Api"));
        assert!(!validate_resource_name("api_v2"));
        assert!(!validate_resource_name(&"a".repeat(64)));
        assert!(validate_resource_name(&"a".repeat(63)));
    }

    #[test]
    fn deploy_initializes_runtime_state() {
        let (mut graph, cid) = graph_with_cluster();
        let mut spec = ServiceSpec::new("api", cid);
        spec.min_replicas = 2;
        let id = graph.deploy_service(spec).unwrap();

        let svc = graph.service(id).unwrap();
        assert_eq!(svc.current_replicas, 2);
        assert_eq!(svc.pending_pods, 0);
        assert_eq!(svc.requests, 0);
        assert_eq!(svc.errors, 0);
        assert_eq!(graph.find_service("api").unwrap().id, id);
    }

    #[test]
    fn deploy_validation() {
        let mut graph = ResourceGraph::new();
        let empty = graph.add_cluster(cluster("empty")).unwrap();
        assert!(graph.deploy_service(ServiceSpec::new("api", empty)).is_err());
        assert!(matches!(
            graph.deploy_service(ServiceSpec::new("api", 999)),
            Err(StateError::NotFound(_))
        ));

        graph.add_node(node("n1", empty)).unwrap();
        let mut inverted = ServiceSpec::new("api", empty);
        inverted.min_replicas = 4;
        inverted.max_replicas = 2;
        assert!(graph.deploy_service(inverted).is_err());
        assert!(graph.deploy_service(ServiceSpec::new("API", empty)).is_err());

        graph.deploy_service(ServiceSpec::new("api", empty)).unwrap();
        assert!(graph.deploy_service(ServiceSpec::new("api", empty)).is_err());
    }

    #[test]
    fn same_service_name_in_other_cluster_allowed() {
        let (mut graph, c1) = graph_with_cluster();
        let c2 = graph.add_cluster(cluster("staging")).unwrap();
        graph.add_node(node("node-1", c2)).unwrap();
        graph.deploy_service(ServiceSpec::new("api", c1)).unwrap();
        graph.deploy_service(ServiceSpec::new("api", c2)).unwrap();
        assert_eq!(graph.services_in_cluster(c2).len(), 1);
    }

    #[test]
    fn manual_scaling_respects_bounds() {
        let (mut graph, cid) = graph_with_cluster();
        let mut spec = ServiceSpec::new("api", cid);
        spec.max_replicas = 2;
        let id = graph.deploy_service(spec).unwrap();

        assert_eq!(graph.scale_service(id, 1).unwrap(), 2);
        assert_eq!(graph.scale_service(id, 1).unwrap(), 2);
        assert_eq!(graph.scale_service(id, -1).unwrap(), 1);
        assert_eq!(graph.scale_service(id, -1).unwrap(), 1);
        assert!(graph.scale_service(42, 1).is_err());
    }

    #[test]
    fn remove_cluster_cascades() {
        let (mut graph, cid) = graph_with_cluster();
        graph.deploy_service(ServiceSpec::new("api", cid)).unwrap();
        graph.remove_cluster(cid).unwrap();

        assert_eq!(graph.nodes().count(), 0);
        assert_eq!(graph.services().count(), 0);
        assert!(graph.remove_cluster(cid).is_err());
    }

    #[test]
    fn totals_and_usage() {
        let (mut graph, cid) = graph_with_cluster();
        let mut second = node("node-2", cid);
        second.cpu_usage = 60.0;
        second.memory_usage = 40.0;
        graph.add_node(second).unwrap();
        let id = graph.deploy_service(ServiceSpec::new("api", cid)).unwrap();
        graph.service_mut(id).unwrap().requests = 120;

        let totals = graph.totals();
        assert_eq!(totals.clusters, 1);
        assert_eq!(totals.nodes, 2);
        assert_eq!(totals.pods, 1);
        assert_eq!(totals.requests, 120);

        let usage = graph.resource_usage();
        assert!((usage.cpu_percent - 50.0).abs() < 1e-9);
        assert!((usage.memory_percent - 50.0).abs() < 1e-9);
        assert_eq!(ResourceGraph::new().resource_usage().cpu_percent, 0.0);
    }

    #[test]
    fn remove_node_and_service() {
        let (mut graph, cid) = graph_with_cluster();
        let nid = graph.nodes_in_cluster(cid)[0].id;
        let sid = graph.deploy_service(ServiceSpec::new("api", cid)).unwrap();

        assert_eq!(graph.remove_service(sid).unwrap().name, "api");
        assert!(graph.service(sid).is_none());
        graph.remove_node(nid).unwrap();
        assert!(graph.nodes_in_cluster(cid).is_empty());
    }
}
