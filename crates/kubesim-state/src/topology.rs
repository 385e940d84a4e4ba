//! Network topology index: load balancers, cluster services, ingresses
//! and network policies, each targeting one service.
//!
//! The load-test engine snapshots the entries targeting the service under
//! test when a run starts, and writes live traffic figures back into them
//! on every tick.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::graph::validate_resource_name;
use crate::types::ServiceId;

/// Unique identifier for a networking object.
pub type ComponentId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancer {
    pub id: ComponentId,
    pub name: String,
    pub service_id: ServiceId,
    pub kind: LoadBalancerKind,
    pub port: u16,
    pub target_port: u16,
    /// Requests per second routed during the last tick.
    pub current_traffic: u64,
    /// False once the balancer is saturated.
    pub health_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerKind {
    External,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterService {
    pub id: ComponentId,
    pub name: String,
    pub target_service_id: ServiceId,
    pub kind: ClusterServiceKind,
    pub port: u16,
    pub target_port: u16,
    pub cluster_ip: String,
    pub current_connections: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterServiceKind {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ingress {
    pub id: ComponentId,
    pub name: String,
    pub service_id: ServiceId,
    pub host: String,
    pub path: String,
    pub port: u16,
    pub tls_enabled: bool,
    pub current_requests: u64,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicy {
    pub id: ComponentId,
    pub name: String,
    pub target_service_id: ServiceId,
    pub action: PolicyAction,
    pub direction: PolicyDirection,
    pub cidr: String,
    /// Requests the policy has been evaluated against.
    pub rules_applied: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDirection {
    Ingress,
    Egress,
    Both,
}

impl FromStr for LoadBalancerKind {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" => Ok(Self::External),
            "internal" => Ok(Self::Internal),
            other => Err(StateError::Validation(format!("unknown load balancer kind '{other}'"))),
        }
    }
}

impl FromStr for ClusterServiceKind {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clusterip" => Ok(Self::ClusterIP),
            "nodeport" => Ok(Self::NodePort),
            "loadbalancer" => Ok(Self::LoadBalancer),
            other => Err(StateError::Validation(format!("unknown cluster service kind '{other}'"))),
        }
    }
}

impl FromStr for PolicyAction {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(StateError::Validation(format!("unknown policy action '{other}'"))),
        }
    }
}

impl FromStr for PolicyDirection {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingress" => Ok(Self::Ingress),
            "egress" => Ok(Self::Egress),
            "both" => Ok(Self::Both),
            other => Err(StateError::Validation(format!("unknown policy direction '{other}'"))),
        }
    }
}

// ── Creation specs ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub service_id: ServiceId,
    pub kind: LoadBalancerKind,
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone)]
pub struct ClusterServiceSpec {
    pub name: String,
    pub target_service_id: ServiceId,
    pub kind: ClusterServiceKind,
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone)]
pub struct IngressSpec {
    pub name: String,
    pub service_id: ServiceId,
    pub host: String,
    pub path: String,
    pub port: u16,
    pub tls_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NetworkPolicySpec {
    pub name: String,
    pub target_service_id: ServiceId,
    pub action: PolicyAction,
    pub direction: PolicyDirection,
    pub cidr: String,
}

// ── Index ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkTopologyIndex {
    load_balancers: BTreeMap<ComponentId, LoadBalancer>,
    cluster_services: BTreeMap<ComponentId, ClusterService>,
    ingresses: BTreeMap<ComponentId, Ingress>,
    network_policies: BTreeMap<ComponentId, NetworkPolicy>,
    next_id: ComponentId,
}

fn check_name<'a, T: 'a>(
    kind: &str,
    name: &str,
    existing: impl IntoIterator<Item = &'a T>,
    name_of: impl Fn(&T) -> &str,
) -> StateResult<()> {
    if !validate_resource_name(name) {
        return Err(StateError::Validation(format!(
            "{kind} name '{name}' must be 1-63 lowercase letters, digits or hyphens"
        )));
    }
    if existing.into_iter().any(|e| name_of(e) == name) {
        return Err(StateError::Validation(format!("{kind} '{name}' already exists")));
    }
    Ok(())
}

impl NetworkTopologyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> ComponentId {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_load_balancer(&mut self, spec: LoadBalancerSpec) -> StateResult<ComponentId> {
        check_name("load balancer", &spec.name, self.load_balancers.values(), |lb| {
            lb.name.as_str()
        })?;
        let id = self.allocate_id();
        self.load_balancers.insert(
            id,
            LoadBalancer {
                id,
                name: spec.name,
                service_id: spec.service_id,
                kind: spec.kind,
                port: spec.port,
                target_port: spec.target_port,
                current_traffic: 0,
                health_check: true,
            },
        );
        debug!(id, service_id = spec.service_id, "load balancer added");
        Ok(id)
    }

    pub fn add_cluster_service(&mut self, spec: ClusterServiceSpec) -> StateResult<ComponentId> {
        check_name("cluster service", &spec.name, self.cluster_services.values(), |cs| {
            cs.name.as_str()
        })?;
        let id = self.allocate_id();
        self.cluster_services.insert(
            id,
            ClusterService {
                id,
                name: spec.name,
                target_service_id: spec.target_service_id,
                kind: spec.kind,
                port: spec.port,
                target_port: spec.target_port,
                cluster_ip: format!("10.96.{}.{}", (id / 254) % 256, id % 254 + 1),
                current_connections: 0,
            },
        );
        debug!(id, service_id = spec.target_service_id, "cluster service added");
        Ok(id)
    }

    pub fn add_ingress(&mut self, spec: IngressSpec) -> StateResult<ComponentId> {
        check_name("ingress", &spec.name, self.ingresses.values(), |ing| ing.name.as_str())?;
        if spec.host.trim().is_empty() {
            return Err(StateError::Validation(format!(
                "ingress '{}' needs a host",
                spec.name
            )));
        }
        let id = self.allocate_id();
        self.ingresses.insert(
            id,
            Ingress {
                id,
                name: spec.name,
                service_id: spec.service_id,
                host: spec.host,
                path: spec.path,
                port: spec.port,
                tls_enabled: spec.tls_enabled,
                current_requests: 0,
                response_time_ms: 0.0,
            },
        );
        debug!(id, service_id = spec.service_id, "ingress added");
        Ok(id)
    }

    pub fn add_network_policy(&mut self, spec: NetworkPolicySpec) -> StateResult<ComponentId> {
        check_name("network policy", &spec.name, self.network_policies.values(), |np| {
            np.name.as_str()
        })?;
        let id = self.allocate_id();
        self.network_policies.insert(
            id,
            NetworkPolicy {
                id,
                name: spec.name,
                target_service_id: spec.target_service_id,
                action: spec.action,
                direction: spec.direction,
                cidr: spec.cidr,
                rules_applied: 0,
            },
        );
        debug!(id, service_id = spec.target_service_id, "network policy added");
        Ok(id)
    }

    // ── Filter-by-service lookups ──────────────────────────────────

    pub fn load_balancers_for(&self, service_id: ServiceId) -> Vec<&LoadBalancer> {
        self.load_balancers
            .values()
            .filter(|lb| lb.service_id == service_id)
            .collect()
    }

    pub fn cluster_services_for(&self, service_id: ServiceId) -> Vec<&ClusterService> {
        self.cluster_services
            .values()
            .filter(|cs| cs.target_service_id == service_id)
            .collect()
    }

    pub fn ingresses_for(&self, service_id: ServiceId) -> Vec<&Ingress> {
        self.ingresses
            .values()
            .filter(|ing| ing.service_id == service_id)
            .collect()
    }

    pub fn policies_for(&self, service_id: ServiceId) -> Vec<&NetworkPolicy> {
        self.network_policies
            .values()
            .filter(|np| np.target_service_id == service_id)
            .collect()
    }

    /// Write one tick's traffic into every object targeting `service_id`.
    pub fn record_traffic(&mut self, service_id: ServiceId, rps: u64) {
        for lb in self
            .load_balancers
            .values_mut()
            .filter(|lb| lb.service_id == service_id)
        {
            lb.current_traffic = rps;
            lb.health_check = rps < 1000;
        }
        for cs in self
            .cluster_services
            .values_mut()
            .filter(|cs| cs.target_service_id == service_id)
        {
            cs.current_connections = rps;
        }
        for ing in self
            .ingresses
            .values_mut()
            .filter(|ing| ing.service_id == service_id)
        {
            ing.current_requests = rps;
            let per_request = if ing.tls_enabled { 0.1 } else { 0.05 };
            ing.response_time_ms = rps as f64 * per_request;
        }
        for np in self
            .network_policies
            .values_mut()
            .filter(|np| np.target_service_id == service_id)
        {
            np.rules_applied = np.rules_applied.saturating_add(rps);
        }
    }

    /// Drop every object targeting `service_id`. Returns how many were removed.
    pub fn remove_for_service(&mut self, service_id: ServiceId) -> usize {
        let before = self.len();
        self.load_balancers.retain(|_, lb| lb.service_id != service_id);
        self.cluster_services
            .retain(|_, cs| cs.target_service_id != service_id);
        self.ingresses.retain(|_, ing| ing.service_id != service_id);
        self.network_policies
            .retain(|_, np| np.target_service_id != service_id);
        let removed = before - self.len();
        debug!(service_id, removed, "networking objects removed for service");
        removed
    }

    pub fn len(&self) -> usize {
        self.load_balancers.len()
            + self.cluster_services.len()
            + self.ingresses.len()
            + self.network_policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `total` requests evenly across `replicas`, spreading the remainder
/// over the first replicas. Empty when there are no replicas.
pub fn distribute(total: u64, replicas: u32) -> Vec<u64> {
    if replicas == 0 {
        return Vec::new();
    }
    let replicas = u64::from(replicas);
    let base = total / replicas;
    let remainder = total % replicas;
    (0..replicas)
        .map(|i| base + u64::from(i < remainder))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lb(name: &str, service_id: ServiceId) -> LoadBalancerSpec {
        LoadBalancerSpec {
            name: name.to_string(),
            service_id,
            kind: LoadBalancerKind::External,
            port: 80,
            target_port: 8080,
        }
    }

    fn policy(name: &str, service_id: ServiceId, action: PolicyAction) -> NetworkPolicySpec {
        NetworkPolicySpec {
            name: name.to_string(),
            target_service_id: service_id,
            action,
            direction: PolicyDirection::Ingress,
            cidr: "0.0.0.0/0".to_string(),
        }
    }

    fn ingress(name: &str, service_id: ServiceId, tls: bool) -> IngressSpec {
        IngressSpec {
            name: name.to_string(),
            service_id,
            host: "api.example.com".to_string(),
            path: "/".to_string(),
            port: 80,
            tls_enabled: tls,
        }
    }

    #[test]
    fn filter_by_service() {
        let mut index = NetworkTopologyIndex::new();
        index.add_load_balancer(lb("lb-a", 1)).unwrap();
        index.add_load_balancer(lb("lb-b", 2)).unwrap();
        index.add_network_policy(policy("p1", 1, PolicyAction::Deny)).unwrap();
        index.add_ingress(ingress("ing", 2, true)).unwrap();

        assert_eq!(index.load_balancers_for(1).len(), 1);
        assert_eq!(index.load_balancers_for(2)[0].name, "lb-b");
        assert_eq!(index.policies_for(1).len(), 1);
        assert!(index.ingresses_for(1).is_empty());
        assert!(index.cluster_services_for(1).is_empty());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn duplicate_and_invalid_names_rejected() {
        let mut index = NetworkTopologyIndex::new();
        index.add_load_balancer(lb("lb", 1)).unwrap();
        assert!(matches!(
            index.add_load_balancer(lb("lb", 2)),
            Err(StateError::Validation(_))
        ));
        assert!(index.add_load_balancer(lb("Bad_Name", 1)).is_err());

        let mut bad = ingress("ing", 1, false);
        bad.host = " ".to_string();
        assert!(index.add_ingress(bad).is_err());
    }

    #[test]
    fn cluster_ip_assigned() {
        let mut index = NetworkTopologyIndex::new();
        let id = index
            .add_cluster_service(ClusterServiceSpec {
                name: "api-svc".to_string(),
                target_service_id: 1,
                kind: ClusterServiceKind::ClusterIP,
                port: 80,
                target_port: 8080,
            })
            .unwrap();
        let cs = index.cluster_services_for(1)[0];
        assert_eq!(cs.id, id);
        assert!(cs.cluster_ip.starts_with("10.96."));
    }

    #[test]
    fn record_traffic_updates_live_fields() {
        let mut index = NetworkTopologyIndex::new();
        index.add_load_balancer(lb("lb", 1)).unwrap();
        index.add_ingress(ingress("tls", 1, true)).unwrap();
        index.add_ingress(ingress("plain", 1, false)).unwrap();
        index.add_network_policy(policy("p", 1, PolicyAction::Allow)).unwrap();

        index.record_traffic(1, 1200);
        index.record_traffic(1, 200);

        let lb = index.load_balancers_for(1)[0];
        assert_eq!(lb.current_traffic, 200);
        assert!(lb.health_check);

        let ingresses = index.ingresses_for(1);
        let tls = ingresses.iter().find(|i| i.tls_enabled).unwrap();
        let plain = ingresses.iter().find(|i| !i.tls_enabled).unwrap();
        assert!((tls.response_time_ms - 20.0).abs() < 1e-9);
        assert!((plain.response_time_ms - 10.0).abs() < 1e-9);

        assert_eq!(index.policies_for(1)[0].rules_applied, 1400);
    }

    #[test]
    fn saturated_load_balancer_fails_health_check() {
        let mut index = NetworkTopologyIndex::new();
        index.add_load_balancer(lb("lb", 1)).unwrap();
        index.record_traffic(1, 1000);
        assert!(!index.load_balancers_for(1)[0].health_check);
    }

    #[test]
    fn remove_for_service_leaves_others() {
        let mut index = NetworkTopologyIndex::new();
        index.add_load_balancer(lb("lb-a", 1)).unwrap();
        index.add_network_policy(policy("p", 1, PolicyAction::Deny)).unwrap();
        index.add_load_balancer(lb("lb-b", 2)).unwrap();

        assert_eq!(index.remove_for_service(1), 2);
        assert_eq!(index.len(), 1);
        assert_eq!(index.load_balancers_for(2).len(), 1);
    }

    #[test]
    fn distribute_spreads_remainder() {
        assert_eq!(distribute(10, 3), vec![4, 3, 3]);
        assert_eq!(distribute(9, 3), vec![3, 3, 3]);
        assert_eq!(distribute(2, 4), vec![1, 1, 0, 0]);
        assert!(distribute(100, 0).is_empty());
        assert_eq!(distribute(1001, 7).iter().sum::<u64>(), 1001);
    }

    #[test]
    fn parse_enums() {
        assert_eq!("deny".parse::<PolicyAction>().unwrap(), PolicyAction::Deny);
        assert_eq!("Both".parse::<PolicyDirection>().unwrap(), PolicyDirection::Both);
        assert_eq!(
            "NodePort".parse::<ClusterServiceKind>().unwrap(),
            ClusterServiceKind::NodePort
        );
        assert_eq!("internal".parse::<LoadBalancerKind>().unwrap(), LoadBalancerKind::Internal);
        assert!("reject".parse::<PolicyAction>().is_err());
    }
}
