//! Build a resource graph and network topology from a scenario file.

use std::collections::HashMap;

use kubesim_core::scenario::ScenarioFile;
use rand::Rng;
use tracing::info;

use crate::error::{StateError, StateResult};
use crate::graph::ResourceGraph;
use crate::topology::{
    ClusterServiceSpec, IngressSpec, LoadBalancerSpec, NetworkPolicySpec, NetworkTopologyIndex,
};
use crate::types::{ClusterSpec, NodeSpec, ServiceId, ServiceSpec};

/// Populate a fresh graph and topology from `scenario`.
///
/// New nodes start at 10-40% cpu and 15-55% memory, drawn from `rng`.
/// The scenario should already have passed [`ScenarioFile::validate`];
/// dangling names are still reported as `NotFound`.
pub fn from_scenario(
    scenario: &ScenarioFile,
    rng: &mut impl Rng,
) -> StateResult<(ResourceGraph, NetworkTopologyIndex)> {
    let mut graph = ResourceGraph::new();
    let mut topology = NetworkTopologyIndex::new();

    let mut clusters = HashMap::new();
    for entry in &scenario.clusters {
        let id = graph.add_cluster(ClusterSpec {
            name: entry.name.clone(),
            region: entry.region.clone(),
            version: entry.version.clone(),
            kind: entry.kind.parse()?,
        })?;
        clusters.insert(entry.name.as_str(), id);
    }

    let cluster_id = |name: &str| {
        clusters
            .get(name)
            .copied()
            .ok_or_else(|| StateError::NotFound(format!("cluster '{name}'")))
    };

    for entry in &scenario.nodes {
        graph.add_node(NodeSpec {
            name: entry.name.clone(),
            cluster_id: cluster_id(&entry.cluster)?,
            node_type: entry.node_type.clone(),
            zone: entry.zone.clone(),
            cpu_usage: rng.gen_range(10.0..40.0),
            memory_usage: rng.gen_range(15.0..55.0),
        })?;
    }

    let mut services: HashMap<&str, ServiceId> = HashMap::new();
    for entry in &scenario.services {
        let id = graph.deploy_service(ServiceSpec {
            name: entry.name.clone(),
            cluster_id: cluster_id(&entry.cluster)?,
            tech: entry.tech.parse()?,
            kind: entry.kind.parse()?,
            min_replicas: entry.min_replicas,
            max_replicas: entry.max_replicas,
            throughput: entry.throughput,
            response_time_baseline_ms: entry.response_time_ms,
            cpu_limit_percent: entry.cpu_limit_percent,
            memory_limit_mb: entry.memory_limit_mb,
            pod_startup_secs: entry.pod_startup_secs,
        })?;
        services.insert(entry.name.as_str(), id);
    }

    let service_id = |name: &str| {
        services
            .get(name)
            .copied()
            .ok_or_else(|| StateError::NotFound(format!("service '{name}'")))
    };

    for entry in &scenario.load_balancers {
        topology.add_load_balancer(LoadBalancerSpec {
            name: entry.name.clone(),
            service_id: service_id(&entry.service)?,
            kind: entry.kind.parse()?,
            port: entry.port,
            target_port: entry.target_port,
        })?;
    }
    for entry in &scenario.cluster_services {
        topology.add_cluster_service(ClusterServiceSpec {
            name: entry.name.clone(),
            target_service_id: service_id(&entry.service)?,
            kind: entry.kind.parse()?,
            port: entry.port,
            target_port: entry.target_port,
        })?;
    }
    for entry in &scenario.ingresses {
        topology.add_ingress(IngressSpec {
            name: entry.name.clone(),
            service_id: service_id(&entry.service)?,
            host: entry.host.clone(),
            path: entry.path.clone(),
            port: entry.port,
            tls_enabled: entry.tls,
        })?;
    }
    for entry in &scenario.network_policies {
        topology.add_network_policy(NetworkPolicySpec {
            name: entry.name.clone(),
            target_service_id: service_id(&entry.service)?,
            action: entry.action.parse()?,
            direction: entry.direction.parse()?,
            cidr: entry.cidr.clone(),
        })?;
    }

    let totals = graph.totals();
    info!(
        clusters = totals.clusters,
        nodes = totals.nodes,
        services = services.len(),
        networking = topology.len(),
        "scenario seeded"
    );
    Ok((graph, topology))
}
