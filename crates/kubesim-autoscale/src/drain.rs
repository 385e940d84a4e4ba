//! Post-run drain: paced replica removal and metric normalization.
//!
//! Both processes are step machines. The owner schedules a step every
//! interval and stops scheduling once a step reports completion; nothing
//! here touches a clock.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kubesim_state::{Service, ServiceId};

/// Outcome of one [`ScaleDownProcess`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// One replica was removed; `replicas` is the new count.
    Removed { replicas: u32 },
    /// At the floor but pods are still starting; try again next interval.
    Waiting,
    /// Target reached or budget spent.
    Done,
}

/// Gradual reduction of a service back to `min_replicas` after a run.
///
/// The step budget is fixed when the process is spawned (running plus
/// pending replicas above the floor), so it terminates in at most that
/// many removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleDownProcess {
    pub service_id: ServiceId,
    remaining: u32,
}

impl ScaleDownProcess {
    /// A process for `service`, or `None` when it is already at its floor.
    pub fn spawn(service: &Service) -> Option<Self> {
        let budget = drain_budget(service);
        if budget == 0 {
            return None;
        }
        info!(
            service = %service.name,
            from = service.serving_units(),
            to = service.min_replicas,
            "scale-down started"
        );
        Some(Self {
            service_id: service.id,
            remaining: budget,
        })
    }

    /// Reset the budget after another stop on the same service.
    pub fn refresh(&mut self, service: &Service) {
        self.remaining = drain_budget(service);
        debug!(service = %service.name, remaining = self.remaining, "scale-down refreshed");
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn step(&mut self, service: &mut Service) -> DrainStep {
        if self.remaining == 0 {
            return self.finish(service);
        }
        if service.current_replicas <= service.min_replicas {
            if service.pending_pods > 0 {
                return DrainStep::Waiting;
            }
            return self.finish(service);
        }
        service.current_replicas -= 1;
        self.remaining -= 1;
        debug!(
            service = %service.name,
            replicas = service.current_replicas,
            remaining = self.remaining,
            "pod terminated"
        );
        DrainStep::Removed {
            replicas: service.current_replicas,
        }
    }

    fn finish(&mut self, service: &Service) -> DrainStep {
        self.remaining = 0;
        info!(service = %service.name, replicas = service.current_replicas, "scale-down complete");
        DrainStep::Done
    }
}

fn drain_budget(service: &Service) -> u32 {
    service.serving_units().saturating_sub(service.min_replicas)
}

/// Outcome of one [`MetricNormalization`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeStep {
    Decaying { step: u32 },
    Settled,
}

/// Cool-down of a service's traffic counters after a run.
///
/// Starting zeroes `requests`. Each step then removes 10% of the errors
/// (rounded up) and sets `requests` to a health-check trickle of 0-4.
/// The last step leaves 0-2 requests and a tenth of the remaining errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNormalization {
    pub service_id: ServiceId,
    step: u32,
    total_steps: u32,
}

impl MetricNormalization {
    pub fn start(service: &mut Service, total_steps: u32) -> Self {
        service.requests = 0;
        info!(service = %service.name, errors = service.errors, "normalizing metrics");
        Self {
            service_id: service.id,
            step: 0,
            total_steps,
        }
    }

    /// Start over from step zero.
    pub fn restart(&mut self, service: &mut Service) {
        service.requests = 0;
        self.step = 0;
    }

    pub fn step(&mut self, service: &mut Service, rng: &mut impl Rng) -> NormalizeStep {
        self.step += 1;
        if service.errors > 0 {
            let reduction = service.errors.div_ceil(10);
            service.errors = service.errors.saturating_sub(reduction);
        }
        service.requests = rng.gen_range(0..5);

        if self.step >= self.total_steps {
            service.requests = rng.gen_range(0..3);
            service.errors /= 10;
            info!(
                service = %service.name,
                requests = service.requests,
                errors = service.errors,
                "metrics normalized"
            );
            return NormalizeStep::Settled;
        }
        NormalizeStep::Decaying { step: self.step }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubesim_state::{ServiceKind, Technology};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn service(min: u32, current: u32) -> Service {
        Service {
            id: 7,
            name: "api".to_string(),
            cluster_id: 1,
            tech: Technology::Python,
            kind: ServiceKind::Backend,
            min_replicas: min,
            max_replicas: 10,
            throughput: 100,
            response_time_baseline_ms: 100,
            cpu_limit_percent: 80,
            memory_limit_mb: 512,
            pod_startup_secs: 5,
            current_replicas: current,
            pending_pods: 0,
            starting_pods: Vec::new(),
            requests: 400,
            errors: 1000,
        }
    }

    #[test]
    fn no_process_at_floor() {
        assert!(ScaleDownProcess::spawn(&service(2, 2)).is_none());
    }

    #[test]
    fn drains_one_replica_per_step_to_min() {
        let mut svc = service(1, 4);
        let mut process = ScaleDownProcess::spawn(&svc).unwrap();
        assert_eq!(process.remaining(), 3);

        let mut steps = 0;
        while process.step(&mut svc) != DrainStep::Done {
            steps += 1;
            assert!(svc.current_replicas >= svc.min_replicas);
            assert!(steps <= 3);
        }
        assert_eq!(steps, 3);
        assert_eq!(svc.current_replicas, 1);
    }

    #[test]
    fn stops_early_when_replicas_removed_elsewhere() {
        let mut svc = service(1, 4);
        let mut process = ScaleDownProcess::spawn(&svc).unwrap();
        svc.current_replicas = 1;
        assert_eq!(process.step(&mut svc), DrainStep::Done);
        assert_eq!(svc.current_replicas, 1);
    }

    #[test]
    fn waits_for_pending_pods_then_drains_them() {
        let mut svc = service(1, 1);
        svc.pending_pods = 2;
        let mut process = ScaleDownProcess::spawn(&svc).unwrap();
        assert_eq!(process.remaining(), 2);
        assert_eq!(process.step(&mut svc), DrainStep::Waiting);

        svc.pending_pods = 0;
        svc.current_replicas = 3;
        assert_eq!(process.step(&mut svc), DrainStep::Removed { replicas: 2 });
        assert_eq!(process.step(&mut svc), DrainStep::Removed { replicas: 1 });
        assert_eq!(process.step(&mut svc), DrainStep::Done);
    }

    #[test]
    fn refresh_resets_budget() {
        let mut svc = service(1, 3);
        let mut process = ScaleDownProcess::spawn(&svc).unwrap();
        process.step(&mut svc);
        svc.current_replicas = 5;
        process.refresh(&svc);
        assert_eq!(process.remaining(), 4);
    }

    #[test]
    fn normalization_decays_errors() {
        let mut svc = service(1, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let mut norm = MetricNormalization::start(&mut svc, 10);
        assert_eq!(svc.requests, 0);

        assert_eq!(norm.step(&mut svc, &mut rng), NormalizeStep::Decaying { step: 1 });
        assert_eq!(svc.errors, 900);
        assert!(svc.requests < 5);
        norm.step(&mut svc, &mut rng);
        assert_eq!(svc.errors, 810);
    }

    #[test]
    fn normalization_settles_after_configured_steps() {
        let mut svc = service(1, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let mut norm = MetricNormalization::start(&mut svc, 10);

        let mut expected = 1000u64;
        for step in 1..=10 {
            expected -= expected.div_ceil(10);
            let outcome = norm.step(&mut svc, &mut rng);
            if step < 10 {
                assert_eq!(outcome, NormalizeStep::Decaying { step });
            } else {
                assert_eq!(outcome, NormalizeStep::Settled);
            }
        }
        assert_eq!(svc.errors, expected / 10);
        assert!(svc.requests < 3);
    }

    #[test]
    fn restart_resets_step_counter() {
        let mut svc = service(1, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let mut norm = MetricNormalization::start(&mut svc, 2);
        norm.step(&mut svc, &mut rng);
        svc.requests = 300;
        norm.restart(&mut svc);
        assert_eq!(svc.requests, 0);
        assert_eq!(norm.step(&mut svc, &mut rng), NormalizeStep::Decaying { step: 1 });
    }
}
