//! Networking context of a load test.
//!
//! Captured once when a run starts: the load balancers, cluster services,
//! ingresses and network policies targeting the tested service. The
//! snapshot drives extra latency, networking error contributions and the
//! per-component request counters for the whole run.

use serde::{Deserialize, Serialize};

use kubesim_state::{
    ClusterService, Ingress, LoadBalancer, NetworkPolicy, NetworkTopologyIndex, PolicyAction,
    ServiceId,
};

/// Added latency per component kind, in milliseconds.
const LOAD_BALANCER_LATENCY_MS: u32 = 5;
const CLUSTER_SERVICE_LATENCY_MS: u32 = 2;
const INGRESS_LATENCY_MS: u32 = 8;
const POLICY_LATENCY_MS: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkingContext {
    pub load_balancers: Vec<LoadBalancer>,
    pub cluster_services: Vec<ClusterService>,
    pub ingresses: Vec<Ingress>,
    pub policies: Vec<NetworkPolicy>,
}

/// Component counts for the report header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingSummary {
    pub load_balancer_count: usize,
    pub cluster_service_count: usize,
    pub ingress_count: usize,
    pub tls_ingress_count: usize,
    pub allow_policy_count: usize,
    pub deny_policy_count: usize,
}

/// Requests routed through each component kind during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingMetrics {
    pub load_balancer_requests: u64,
    pub cluster_service_requests: u64,
    pub ingress_requests: u64,
    pub policy_violations: u64,
}

impl NetworkingContext {
    pub fn capture(topology: &NetworkTopologyIndex, service_id: ServiceId) -> Self {
        Self {
            load_balancers: topology
                .load_balancers_for(service_id)
                .into_iter()
                .cloned()
                .collect(),
            cluster_services: topology
                .cluster_services_for(service_id)
                .into_iter()
                .cloned()
                .collect(),
            ingresses: topology
                .ingresses_for(service_id)
                .into_iter()
                .cloned()
                .collect(),
            policies: topology
                .policies_for(service_id)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    pub fn has_load_balancer(&self) -> bool {
        !self.load_balancers.is_empty()
    }

    pub fn has_cluster_service(&self) -> bool {
        !self.cluster_services.is_empty()
    }

    pub fn has_ingress(&self) -> bool {
        !self.ingresses.is_empty()
    }

    pub fn has_policies(&self) -> bool {
        !self.policies.is_empty()
    }

    pub fn has_tls_ingress(&self) -> bool {
        self.ingresses.iter().any(|i| i.tls_enabled)
    }

    pub fn deny_policy_count(&self) -> usize {
        self.policies
            .iter()
            .filter(|p| p.action == PolicyAction::Deny)
            .count()
    }

    /// +5 ms with a load balancer, +2 ms with a cluster service, +8 ms with
    /// an ingress, +3 ms per network policy.
    pub fn expected_latency_increase_ms(&self) -> u32 {
        let mut total = 0;
        if self.has_load_balancer() {
            total += LOAD_BALANCER_LATENCY_MS;
        }
        if self.has_cluster_service() {
            total += CLUSTER_SERVICE_LATENCY_MS;
        }
        if self.has_ingress() {
            total += INGRESS_LATENCY_MS;
        }
        let policies = u32::try_from(self.policies.len()).unwrap_or(u32::MAX);
        total.saturating_add(POLICY_LATENCY_MS.saturating_mul(policies))
    }

    pub fn summary(&self) -> NetworkingSummary {
        let deny = self.deny_policy_count();
        NetworkingSummary {
            load_balancer_count: self.load_balancers.len(),
            cluster_service_count: self.cluster_services.len(),
            ingress_count: self.ingresses.len(),
            tls_ingress_count: self.ingresses.iter().filter(|i| i.tls_enabled).count(),
            allow_policy_count: self.policies.len() - deny,
            deny_policy_count: deny,
        }
    }

    /// Add one tick of traffic to the run counters. Returns the policy
    /// violations found this tick: 5% of requests per deny policy, 0.1%
    /// per allow policy, each floored.
    pub fn record(&self, rps: u64, metrics: &mut NetworkingMetrics) -> u64 {
        if self.has_load_balancer() {
            metrics.load_balancer_requests = metrics.load_balancer_requests.saturating_add(rps);
        }
        if self.has_cluster_service() {
            metrics.cluster_service_requests = metrics.cluster_service_requests.saturating_add(rps);
        }
        if self.has_ingress() {
            metrics.ingress_requests = metrics.ingress_requests.saturating_add(rps);
        }
        let violations: u64 = self
            .policies
            .iter()
            .map(|p| match p.action {
                PolicyAction::Deny => rps / 20,
                PolicyAction::Allow => rps / 1000,
            })
            .sum();
        metrics.policy_violations = metrics.policy_violations.saturating_add(violations);
        violations
    }
}
