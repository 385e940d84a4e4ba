//! Request failure model.
//!
//! Errors per tick come from two additive rates, both in percent:
//!
//! ```text
//! load_per_replica = rps / current_replicas        (infinite with 0 replicas)
//! base             = min((load_per_replica / throughput - 1) * 20, 50)
//!                    when load_per_replica > throughput, else 0
//! networking       = 0.1  with a load balancer
//!                  + 0.5  per deny policy
//!                  + 0.2  when any ingress terminates TLS
//! errors           = floor(rps * (base + networking) / 100)
//! ```
//!
//! The combined rate is not capped, so a heavily overloaded service behind
//! many deny policies can report more errors than requests.

use serde::{Deserialize, Serialize};
use tracing::debug;

use kubesim_state::Service;

use crate::networking::NetworkingContext;

const MAX_BASE_RATE_PERCENT: f64 = 50.0;
const OVERLOAD_RATE_SLOPE: f64 = 20.0;
const LOAD_BALANCER_RATE_PERCENT: f64 = 0.1;
const DENY_POLICY_RATE_PERCENT: f64 = 0.5;
const TLS_RATE_PERCENT: f64 = 0.2;

/// One tick's error computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorOutcome {
    pub errors: u64,
    pub base_rate_percent: f64,
    pub networking_rate_percent: f64,
}

impl ErrorOutcome {
    pub fn total_rate_percent(&self) -> f64 {
        self.base_rate_percent + self.networking_rate_percent
    }
}

/// Overload error rate in percent, capped at 50.
pub fn base_error_rate(rps: u64, current_replicas: u32, throughput: u64) -> f64 {
    if current_replicas == 0 || throughput == 0 {
        return if rps > 0 { MAX_BASE_RATE_PERCENT } else { 0.0 };
    }
    let load_per_replica = rps as f64 / f64::from(current_replicas);
    let throughput = throughput as f64;
    if load_per_replica <= throughput {
        return 0.0;
    }
    let overload_factor = load_per_replica / throughput;
    ((overload_factor - 1.0) * OVERLOAD_RATE_SLOPE).min(MAX_BASE_RATE_PERCENT)
}

/// Networking error rate in percent.
pub fn networking_error_rate(ctx: &NetworkingContext) -> f64 {
    let mut rate = 0.0;
    if ctx.has_load_balancer() {
        rate += LOAD_BALANCER_RATE_PERCENT;
    }
    rate += DENY_POLICY_RATE_PERCENT * ctx.deny_policy_count() as f64;
    if ctx.has_tls_ingress() {
        rate += TLS_RATE_PERCENT;
    }
    rate
}

/// Errors for `rps` requests against `service` this tick. Pure.
pub fn error_outcome(service: &Service, rps: u64, ctx: &NetworkingContext) -> ErrorOutcome {
    let base_rate_percent = base_error_rate(rps, service.current_replicas, service.throughput);
    let networking_rate_percent = networking_error_rate(ctx);
    let total = base_rate_percent + networking_rate_percent;
    let errors = (rps as f64 * total / 100.0).floor();
    ErrorOutcome {
        errors: if errors.is_finite() && errors > 0.0 {
            errors as u64
        } else {
            0
        },
        base_rate_percent,
        networking_rate_percent,
    }
}

/// Compute this tick's errors and add them to `service.errors`.
pub fn compute_errors(service: &mut Service, rps: u64, ctx: &NetworkingContext) -> ErrorOutcome {
    let outcome = error_outcome(service, rps, ctx);
    service.errors = service.errors.saturating_add(outcome.errors);
    if outcome.errors > 0 {
        debug!(
            service = %service.name,
            errors = outcome.errors,
            base_rate = outcome.base_rate_percent,
            networking_rate = outcome.networking_rate_percent,
            "request errors"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubesim_state::{
        Ingress, LoadBalancer, LoadBalancerKind, NetworkPolicy, PolicyAction, PolicyDirection,
        ServiceKind, Technology,
    };

    fn service(replicas: u32, throughput: u64) -> Service {
        Service {
            id: 1,
            name: "api".to_string(),
            cluster_id: 1,
            tech: Technology::NodeJs,
            kind: ServiceKind::Backend,
            min_replicas: 1,
            max_replicas: 10,
            throughput,
            response_time_baseline_ms: 100,
            cpu_limit_percent: 80,
            memory_limit_mb: 512,
            pod_startup_secs: 5,
            current_replicas: replicas,
            pending_pods: 0,
            starting_pods: Vec::new(),
            requests: 0,
            errors: 0,
        }
    }

    fn policy(id: u64, action: PolicyAction) -> NetworkPolicy {
        NetworkPolicy {
            id,
            name: format!("policy-{id}"),
            target_service_id: 1,
            action,
            direction: PolicyDirection::Ingress,
            cidr: "0.0.0.0/0".to_string(),
            rules_applied: 0,
        }
    }

    fn load_balancer() -> LoadBalancer {
        LoadBalancer {
            id: 1,
            name: "lb".to_string(),
            service_id: 1,
            kind: LoadBalancerKind::External,
            port: 80,
            target_port: 8080,
            current_traffic: 0,
            health_check: true,
        }
    }

    fn tls_ingress() -> Ingress {
        Ingress {
            id: 2,
            name: "ing".to_string(),
            service_id: 1,
            host: "api.example.com".to_string(),
            path: "/".to_string(),
            port: 443,
            tls_enabled: true,
            current_requests: 0,
            response_time_ms: 0.0,
        }
    }

    #[test]
    fn no_errors_within_capacity() {
        let svc = service(2, 100);
        let outcome = error_outcome(&svc, 200, &NetworkingContext::default());
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.total_rate_percent(), 0.0);
    }

    #[test]
    fn overload_rate() {
        // 150 per replica against 100 → factor 1.5 → 10%.
        assert_eq!(base_error_rate(300, 2, 100), 10.0);
        let outcome = error_outcome(&service(2, 100), 300, &NetworkingContext::default());
        assert_eq!(outcome.errors, 30);
    }

    #[test]
    fn base_rate_caps_at_fifty() {
        assert_eq!(base_error_rate(100_000, 1, 100), 50.0);
    }

    #[test]
    fn zero_replicas_saturate() {
        assert_eq!(base_error_rate(10, 0, 100), 50.0);
        assert_eq!(base_error_rate(0, 0, 100), 0.0);
        let outcome = error_outcome(&service(0, 100), 10, &NetworkingContext::default());
        assert_eq!(outcome.errors, 5);
    }

    #[test]
    fn errors_grow_with_overload() {
        let svc = service(1, 100);
        let ctx = NetworkingContext::default();
        let mut last = 0;
        for rps in [150, 200, 250, 300, 350] {
            let errors = error_outcome(&svc, rps, &ctx).errors;
            assert!(errors > last, "{rps} rps gave {errors} errors");
            last = errors;
        }
    }

    #[test]
    fn deny_policy_adds_half_a_point() {
        let svc = service(1, 100);
        let mut ctx = NetworkingContext::default();
        ctx.policies.push(policy(1, PolicyAction::Allow));
        let before = error_outcome(&svc, 1000, &ctx);

        ctx.policies.push(policy(2, PolicyAction::Deny));
        let after = error_outcome(&svc, 1000, &ctx);

        let delta = after.total_rate_percent() - before.total_rate_percent();
        assert!((delta - 0.5).abs() < 1e-9);
        assert!(after.errors > before.errors);
    }

    #[test]
    fn networking_contributions() {
        let mut ctx = NetworkingContext::default();
        ctx.load_balancers.push(load_balancer());
        ctx.ingresses.push(tls_ingress());
        assert!((networking_error_rate(&ctx) - 0.3).abs() < 1e-9);

        // 0.3% of 10_000 requests within capacity.
        let outcome = error_outcome(&service(200, 100), 10_000, &ctx);
        assert_eq!(outcome.base_rate_percent, 0.0);
        assert_eq!(outcome.errors, 30);
    }

    #[test]
    fn combined_rate_is_uncapped() {
        let svc = service(1, 1);
        let mut ctx = NetworkingContext::default();
        for id in 0..120 {
            ctx.policies.push(policy(id, PolicyAction::Deny));
        }
        let outcome = error_outcome(&svc, 1000, &ctx);
        assert!(outcome.total_rate_percent() > 100.0);
        assert!(outcome.errors > 1000);
    }

    #[test]
    fn compute_errors_accumulates() {
        let mut svc = service(2, 100);
        compute_errors(&mut svc, 300, &NetworkingContext::default());
        compute_errors(&mut svc, 300, &NetworkingContext::default());
        assert_eq!(svc.errors, 60);
    }
}
