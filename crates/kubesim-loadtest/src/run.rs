//! TestRun: the single active load test and its accumulators.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kubesim_state::{Service, ServiceId};

use crate::error::{LoadTestError, LoadTestResult};
use crate::networking::{NetworkingContext, NetworkingMetrics};
use crate::traffic::TrafficShape;

/// Lifecycle of the engine: `Idle → Running ⇄ Paused → Stopping → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Stopping,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// What to run. Validated by [`RunConfig::validate`] before a run exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub service_id: ServiceId,
    pub target_rps: u64,
    pub duration_secs: u64,
    pub shape: TrafficShape,
}

impl RunConfig {
    pub fn validate(&self) -> LoadTestResult<()> {
        if self.target_rps == 0 {
            return Err(LoadTestError::InvalidInput(
                "target rps must be positive".to_string(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(LoadTestError::InvalidInput(
                "duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    pub config: RunConfig,
    pub service_name: String,
    pub tech_label: &'static str,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub response_time_baseline_ms: u32,

    pub state: RunState,
    pub elapsed_secs: u64,
    /// Simulated time the run started.
    pub started_at: Duration,

    pub current_rps: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub max_replicas_observed: u32,
    /// Response time of the last tick, including networking latency.
    pub response_time_ms: f64,

    pub networking: NetworkingContext,
    pub networking_metrics: NetworkingMetrics,
}

impl TestRun {
    pub fn new(
        config: RunConfig,
        service: &Service,
        networking: NetworkingContext,
        now: Duration,
    ) -> Self {
        Self {
            config,
            service_name: service.name.clone(),
            tech_label: service.tech.label(),
            min_replicas: service.min_replicas,
            max_replicas: service.max_replicas,
            response_time_baseline_ms: service.response_time_baseline_ms,
            state: RunState::Running,
            elapsed_secs: 0,
            started_at: now,
            current_rps: 0,
            total_requests: 0,
            total_errors: 0,
            max_replicas_observed: service.current_replicas,
            response_time_ms: 0.0,
            networking,
            networking_metrics: NetworkingMetrics::default(),
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.config.service_id
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed_secs >= self.config.duration_secs
    }

    pub fn error_rate_percent(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_errors as f64 / self.total_requests as f64 * 100.0
    }

    pub fn observe_replicas(&mut self, replicas: u32) {
        self.max_replicas_observed = self.max_replicas_observed.max(replicas);
    }

    /// `max(10, baseline + noise + networking latency)`; `noise` is the
    /// caller's ±50 ms jitter.
    pub fn update_response_time(&mut self, noise_ms: f64) -> f64 {
        let latency = f64::from(self.networking.expected_latency_increase_ms());
        self.response_time_ms =
            (f64::from(self.response_time_baseline_ms) + noise_ms + latency).max(10.0);
        self.response_time_ms
    }

    pub fn status(&self, service: Option<&Service>) -> RunStatus {
        RunStatus {
            service_id: self.service_id(),
            service_name: self.service_name.clone(),
            state: self.state,
            elapsed_secs: self.elapsed_secs,
            duration_secs: self.config.duration_secs,
            current_rps: self.current_rps,
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            error_rate_percent: self.error_rate_percent(),
            response_time_ms: self.response_time_ms,
            replicas: service.map_or(0, |s| s.current_replicas),
            pending_pods: service.map_or(0, |s| s.pending_pods),
        }
    }
}

/// Live projection of the active run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub service_id: ServiceId,
    pub service_name: String,
    pub state: RunState,
    pub elapsed_secs: u64,
    pub duration_secs: u64,
    pub current_rps: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate_percent: f64,
    pub response_time_ms: f64,
    pub replicas: u32,
    pub pending_pods: u32,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}/{}s rps={} replicas={} (+{} starting) errors={} ({:.1}%) latency={:.0}ms",
            self.service_name,
            self.state,
            self.elapsed_secs,
            self.duration_secs,
            self.current_rps,
            self.replicas,
            self.pending_pods,
            self.total_errors,
            self.error_rate_percent,
            self.response_time_ms
        )
    }
}
