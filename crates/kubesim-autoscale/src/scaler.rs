//! AutoScaler: load-driven replica decisions with delayed pod startup.
//!
//! Runs once per load-test tick, after the service's `requests` field has
//! been updated. Scale-up never adds a replica directly: it starts a pod
//! that joins the serving set only when the caller completes it at
//! `ready_at`. Scale-down during a run removes one replica immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kubesim_core::config::ScalingConfig;
use kubesim_state::{PodStart, Service};

/// A scaling decision for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleDecision {
    /// A pod was requested; it must be completed at `ready_at`.
    PodStarting { pod_id: String, ready_at: Duration },
    /// One serving replica was removed; `replicas` is the new count.
    ScaledDown { replicas: u32 },
    /// No change needed.
    NoChange,
}

/// Read-only view of a service's pod lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub running: u32,
    /// Running replicas plus pods still starting.
    pub target: u32,
    /// Time until the oldest starting pod serves traffic.
    pub next_ready_in: Option<Duration>,
}

/// The autoscaler compares per-unit load against the service's rated
/// throughput and keeps `current + pending` inside the replica bounds.
pub struct AutoScaler {
    scale_up_threshold: f64,
    scale_down_threshold: f64,
    /// Monotonic counter for pod ids.
    next_pod_seq: u64,
}

impl AutoScaler {
    pub fn new(config: &ScalingConfig) -> Self {
        Self {
            scale_up_threshold: config.scale_up_threshold,
            scale_down_threshold: config.scale_down_threshold,
            next_pod_seq: 0,
        }
    }

    /// Evaluate one tick of load against `service`.
    ///
    /// Load per unit counts pods still starting as capacity. A service with
    /// no replicas and no pending pods is treated as infinitely loaded.
    pub fn evaluate(&mut self, service: &mut Service, rps: u64, now: Duration) -> ScaleDecision {
        let units = service.serving_units();
        let load_per_unit = if units == 0 {
            f64::INFINITY
        } else {
            rps as f64 / f64::from(units)
        };
        let throughput = service.throughput as f64;

        if load_per_unit > throughput * self.scale_up_threshold && units < service.max_replicas {
            let pod = self.start_new_pod(service, now);
            debug!(
                service = %service.name,
                load_per_unit,
                throughput,
                pending = service.pending_pods,
                "scaling up"
            );
            return ScaleDecision::PodStarting {
                pod_id: pod.id,
                ready_at: pod.ready_at,
            };
        }

        if load_per_unit < throughput * self.scale_down_threshold
            && service.current_replicas > service.min_replicas
        {
            service.current_replicas -= 1;
            debug!(
                service = %service.name,
                load_per_unit,
                replicas = service.current_replicas,
                "scaling down"
            );
            return ScaleDecision::ScaledDown {
                replicas: service.current_replicas,
            };
        }

        ScaleDecision::NoChange
    }

    /// Request one pod. It is recorded in `starting_pods` and counted in
    /// `pending_pods` until [`complete_pod`] is called for it.
    pub fn start_new_pod(&mut self, service: &mut Service, now: Duration) -> PodStart {
        self.next_pod_seq += 1;
        let pod = PodStart {
            id: format!("{}-pod-{}", service.name, self.next_pod_seq),
            started_at: now,
            ready_at: now + service.pod_startup(),
        };
        service.starting_pods.push(pod.clone());
        service.pending_pods += 1;
        info!(
            service = %service.name,
            pod = %pod.id,
            startup_secs = service.pod_startup_secs,
            "pod starting"
        );
        pod
    }
}

/// Move a started pod into the serving set.
///
/// Returns false when the pod is unknown (already completed or cancelled).
/// The replica is only added while running replicas stay within
/// `max_replicas`.
pub fn complete_pod(service: &mut Service, pod_id: &str) -> bool {
    let Some(pos) = service.starting_pods.iter().position(|p| p.id == pod_id) else {
        debug!(service = %service.name, pod = %pod_id, "pod completion ignored");
        return false;
    };
    service.starting_pods.remove(pos);
    service.pending_pods = service.pending_pods.saturating_sub(1);

    if service.current_replicas >= service.max_replicas {
        warn!(
            service = %service.name,
            pod = %pod_id,
            replicas = service.current_replicas,
            "pod ready but service already at max replicas"
        );
        return false;
    }
    service.current_replicas += 1;
    info!(
        service = %service.name,
        pod = %pod_id,
        replicas = service.current_replicas,
        "pod ready"
    );
    true
}

/// Drop every starting pod without adding replicas. Returns how many were
/// cancelled.
pub fn cancel_starting_pods(service: &mut Service) -> usize {
    let cancelled = service.starting_pods.len();
    service.starting_pods.clear();
    service.pending_pods = 0;
    if cancelled > 0 {
        warn!(service = %service.name, cancelled, "starting pods cancelled");
    }
    cancelled
}

pub fn pod_status(service: &Service, now: Duration) -> PodStatus {
    PodStatus {
        running: service.current_replicas,
        target: service.serving_units(),
        next_ready_in: service
            .starting_pods
            .first()
            .map(|pod| pod.ready_at.saturating_sub(now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubesim_state::{ServiceKind, Technology};

    fn service(min: u32, max: u32, throughput: u64) -> Service {
        Service {
            id: 1,
            name: "api".to_string(),
            cluster_id: 1,
            tech: Technology::NodeJs,
            kind: ServiceKind::Backend,
            min_replicas: min,
            max_replicas: max,
            throughput,
            response_time_baseline_ms: 100,
            cpu_limit_percent: 80,
            memory_limit_mb: 512,
            pod_startup_secs: 5,
            current_replicas: min,
            pending_pods: 0,
            starting_pods: Vec::new(),
            requests: 0,
            errors: 0,
        }
    }

    fn scaler() -> AutoScaler {
        AutoScaler::new(&ScalingConfig::default())
    }

    #[test]
    fn scale_up_starts_pod_without_adding_replica() {
        let mut svc = service(1, 5, 100);
        let mut scaler = scaler();
        let now = Duration::from_secs(3);

        let decision = scaler.evaluate(&mut svc, 90, now);
        match decision {
            ScaleDecision::PodStarting { ready_at, .. } => {
                assert_eq!(ready_at, Duration::from_secs(8));
            }
            other => panic!("expected pod start, got {other:?}"),
        }
        assert_eq!(svc.current_replicas, 1);
        assert_eq!(svc.pending_pods, 1);
        assert_eq!(svc.starting_pods.len(), 1);
    }

    #[test]
    fn pending_pods_count_as_capacity() {
        let mut svc = service(1, 5, 100);
        let mut scaler = scaler();
        // 90 rps over 1 replica + 1 pending = 45 per unit: no further scale-up.
        scaler.evaluate(&mut svc, 90, Duration::ZERO);
        assert_eq!(scaler.evaluate(&mut svc, 90, Duration::ZERO), ScaleDecision::NoChange);
    }

    #[test]
    fn scale_up_stops_at_max() {
        let mut svc = service(1, 3, 100);
        let mut scaler = scaler();
        for _ in 0..10 {
            scaler.evaluate(&mut svc, 10_000, Duration::ZERO);
        }
        assert_eq!(svc.serving_units(), 3);
        assert_eq!(svc.pending_pods, 2);
    }

    #[test]
    fn scale_down_is_immediate_and_floored() {
        let mut svc = service(1, 5, 100);
        svc.current_replicas = 3;
        let mut scaler = scaler();

        assert_eq!(
            scaler.evaluate(&mut svc, 10, Duration::ZERO),
            ScaleDecision::ScaledDown { replicas: 2 }
        );
        scaler.evaluate(&mut svc, 10, Duration::ZERO);
        assert_eq!(svc.current_replicas, 1);
        assert_eq!(scaler.evaluate(&mut svc, 10, Duration::ZERO), ScaleDecision::NoChange);
    }

    #[test]
    fn band_between_thresholds_is_stable() {
        let mut svc = service(1, 5, 100);
        svc.current_replicas = 2;
        let mut scaler = scaler();
        // 100 rps / 2 = 50 per unit, between 30 and 80.
        assert_eq!(scaler.evaluate(&mut svc, 100, Duration::ZERO), ScaleDecision::NoChange);
    }

    #[test]
    fn zero_units_is_infinite_load() {
        let mut svc = service(0, 2, 100);
        let mut scaler = scaler();
        assert!(matches!(
            scaler.evaluate(&mut svc, 0, Duration::ZERO),
            ScaleDecision::PodStarting { .. }
        ));
    }

    #[test]
    fn complete_pod_joins_serving_set() {
        let mut svc = service(1, 5, 100);
        let mut scaler = scaler();
        let pod = scaler.start_new_pod(&mut svc, Duration::ZERO);

        assert!(complete_pod(&mut svc, &pod.id));
        assert_eq!(svc.current_replicas, 2);
        assert_eq!(svc.pending_pods, 0);
        assert!(svc.starting_pods.is_empty());
        assert!(!complete_pod(&mut svc, &pod.id));
        assert_eq!(svc.current_replicas, 2);
    }

    #[test]
    fn complete_pod_never_exceeds_max() {
        let mut svc = service(1, 2, 100);
        let mut scaler = scaler();
        let pod = scaler.start_new_pod(&mut svc, Duration::ZERO);
        svc.current_replicas = 2;

        assert!(!complete_pod(&mut svc, &pod.id));
        assert_eq!(svc.current_replicas, 2);
        assert_eq!(svc.pending_pods, 0);
    }

    #[test]
    fn pod_ids_are_unique() {
        let mut svc = service(1, 5, 100);
        let mut scaler = scaler();
        let a = scaler.start_new_pod(&mut svc, Duration::ZERO);
        let b = scaler.start_new_pod(&mut svc, Duration::ZERO);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn pod_status_reports_oldest_pending() {
        let mut svc = service(1, 5, 100);
        let mut scaler = scaler();
        scaler.start_new_pod(&mut svc, Duration::from_secs(10));
        scaler.start_new_pod(&mut svc, Duration::from_secs(12));

        let status = pod_status(&svc, Duration::from_secs(13));
        assert_eq!(status.running, 1);
        assert_eq!(status.target, 3);
        assert_eq!(status.next_ready_in, Some(Duration::from_secs(2)));

        let late = pod_status(&svc, Duration::from_secs(30));
        assert_eq!(late.next_ready_in, Some(Duration::ZERO));
    }

    #[test]
    fn cancel_clears_pending() {
        let mut svc = service(1, 5, 100);
        let mut scaler = scaler();
        scaler.start_new_pod(&mut svc, Duration::ZERO);
        scaler.start_new_pod(&mut svc, Duration::ZERO);

        assert_eq!(cancel_starting_pods(&mut svc), 2);
        assert_eq!(svc.pending_pods, 0);
        assert_eq!(svc.current_replicas, 1);
        assert_eq!(pod_status(&svc, Duration::ZERO).next_ready_in, None);
    }
}
