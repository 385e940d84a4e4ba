//! Simulation: the explicit context that owns one simulated cluster.
//!
//! Owns the resource graph, the network topology, the virtual scheduler and
//! every process that mutates services over time: the load-test tick, pod
//! startups, post-run scale-down and metric normalization, and idle node
//! jitter. Nothing here is global; tests build as many simulations as they
//! need.
//!
//! # Tick order
//!
//! ```text
//! EngineTick
//!   elapsed += 1
//!   rps = shape(target, elapsed, duration)
//!   service.requests = rps; total_requests += rps
//!   AutoScaler::evaluate          → maybe schedule PodReady at ready_at
//!   compute_errors                → service.errors, total_errors
//!   nodes::apply_load             → nodes of the service's cluster
//!   networking counters           → run metrics + topology live traffic
//!   emit Tick
//!   elapsed >= duration ? stop() : schedule next EngineTick
//! ```
//!
//! Every step of a tick runs to completion before any other task is popped,
//! so pod completions and drain steps only interleave between ticks.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kubesim_autoscale::{
    AutoScaler, DrainStep, MetricNormalization, NormalizeStep, PodStatus, ScaleDecision,
    ScaleDownProcess, cancel_starting_pods, complete_pod, pod_status,
};
use kubesim_core::{LoadTestEntry, ScenarioFile, SimConfig};
use kubesim_metrics::{EventLog, LogLevel, RunGauges, nodes, render_prometheus};
use kubesim_state::{
    GraphSnapshot, NetworkTopologyIndex, ResourceGraph, Service, ServiceId, distribute,
};

use crate::clock::Scheduler;
use crate::error::{LoadTestError, LoadTestResult};
use crate::error_model::compute_errors;
use crate::networking::NetworkingContext;
use crate::report::Report;
use crate::run::{RunConfig, RunState, RunStatus, TestRun};
use crate::traffic::TrafficShape;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Work queued on the virtual clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    EngineTick,
    PodReady { service_id: ServiceId, pod_id: String },
    ScaleDownStep { service_id: ServiceId },
    NormalizeStep { service_id: ServiceId },
    NodeJitter,
}

impl Task {
    fn service_id(&self) -> Option<ServiceId> {
        match self {
            Task::PodReady { service_id, .. }
            | Task::ScaleDownStep { service_id }
            | Task::NormalizeStep { service_id } => Some(*service_id),
            Task::EngineTick | Task::NodeJitter => None,
        }
    }
}

/// Presentation hook. Sent fire-and-forget; a simulation with no
/// subscribers behaves identically.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    RunStarted {
        service_id: ServiceId,
        service_name: String,
    },
    Tick(RunStatus),
    Paused {
        service_id: ServiceId,
    },
    Resumed {
        service_id: ServiceId,
    },
    PodReady {
        service_id: ServiceId,
        pod_id: String,
        replicas: u32,
    },
    ScaledDown {
        service_id: ServiceId,
        replicas: u32,
    },
    RunStopped(Box<Report>),
    DrainComplete {
        service_id: ServiceId,
        replicas: u32,
    },
    MetricsNormalized {
        service_id: ServiceId,
    },
}

pub struct Simulation {
    config: SimConfig,
    graph: ResourceGraph,
    topology: NetworkTopologyIndex,
    scheduler: Scheduler<Task>,
    rng: StdRng,
    log: EventLog,
    scaler: AutoScaler,
    run: Option<TestRun>,
    scale_downs: BTreeMap<ServiceId, ScaleDownProcess>,
    normalizations: BTreeMap<ServiceId, MetricNormalization>,
    last_report: Option<Report>,
    events: broadcast::Sender<SimEvent>,
}

impl Simulation {
    pub fn new(
        config: SimConfig,
        graph: ResourceGraph,
        topology: NetworkTopologyIndex,
    ) -> LoadTestResult<Self> {
        let rng = StdRng::seed_from_u64(config.engine.seed);
        Self::with_rng(config, graph, topology, rng)
    }

    /// Build the graph and topology described by `scenario`. Initial node
    /// usage is drawn from the scenario's seed.
    pub fn from_scenario(scenario: &ScenarioFile) -> LoadTestResult<Self> {
        scenario.validate()?;
        let config = scenario.simulation.clone();
        let mut rng = StdRng::seed_from_u64(config.engine.seed);
        let (graph, topology) = kubesim_state::from_scenario(scenario, &mut rng)?;
        Self::with_rng(config, graph, topology, rng)
    }

    /// Rebuild a simulation from a saved snapshot.
    ///
    /// Only settled state is restored: pods that were still starting when
    /// the snapshot was taken are dropped, and replicas are clamped into
    /// each service's bounds. No run, drain or normalization carries over.
    pub fn from_snapshot(config: SimConfig, snapshot: GraphSnapshot) -> LoadTestResult<Self> {
        let GraphSnapshot {
            mut graph,
            topology,
            saved_at_secs,
        } = snapshot;
        let mut dropped = 0;
        for service in graph.services_mut() {
            dropped += service.starting_pods.len();
            service.starting_pods.clear();
            service.pending_pods = 0;
            service.current_replicas = service
                .current_replicas
                .clamp(service.min_replicas, service.max_replicas);
        }
        info!(saved_at_secs, dropped_pods = dropped, "restoring snapshot");
        Self::new(config, graph, topology)
    }

    fn with_rng(
        config: SimConfig,
        graph: ResourceGraph,
        topology: NetworkTopologyIndex,
        rng: StdRng,
    ) -> LoadTestResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut sim = Self {
            log: EventLog::new(config.log.capacity),
            scaler: AutoScaler::new(&config.scaling),
            config,
            graph,
            topology,
            scheduler: Scheduler::new(),
            rng,
            run: None,
            scale_downs: BTreeMap::new(),
            normalizations: BTreeMap::new(),
            last_report: None,
            events,
        };
        if sim.config.nodes.jitter_enabled {
            sim.scheduler
                .schedule_in(sim.config.jitter_interval(), Task::NodeJitter);
        }
        info!(
            services = sim.graph.services().count(),
            nodes = sim.graph.nodes().count(),
            seed = sim.config.engine.seed,
            "simulation ready"
        );
        Ok(sim)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Direct access for setup between ticks.
    pub fn graph_mut(&mut self) -> &mut ResourceGraph {
        &mut self.graph
    }

    pub fn topology(&self) -> &NetworkTopologyIndex {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut NetworkTopologyIndex {
        &mut self.topology
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn last_report(&self) -> Option<&Report> {
        self.last_report.as_ref()
    }

    pub fn run_state(&self) -> RunState {
        self.run.as_ref().map_or(RunState::Idle, |r| r.state)
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn is_draining(&self, service_id: ServiceId) -> bool {
        self.scale_downs.contains_key(&service_id)
    }

    pub fn is_normalizing(&self, service_id: ServiceId) -> bool {
        self.normalizations.contains_key(&service_id)
    }

    /// Tasks still queued on the virtual clock.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    fn emit(&self, event: SimEvent) {
        let _ = self.events.send(event);
    }

    // ── Run control ────────────────────────────────────────────────

    /// Start a load test against `service_id`.
    ///
    /// Fails with `Conflict` while another run is active, and with
    /// `InvalidInput` for a zero rate, a zero duration or an unknown
    /// service. A failed start mutates nothing.
    pub fn start(
        &mut self,
        service_id: ServiceId,
        target_rps: u64,
        duration_secs: u64,
        shape: TrafficShape,
    ) -> LoadTestResult<()> {
        if let Some(run) = &self.run {
            return Err(LoadTestError::Conflict {
                service: run.service_name.clone(),
            });
        }
        let config = RunConfig {
            service_id,
            target_rps,
            duration_secs,
            shape,
        };
        config.validate()?;
        let service = self.graph.service(service_id).ok_or_else(|| {
            LoadTestError::InvalidInput(format!("unknown service {service_id}"))
        })?;

        let networking = NetworkingContext::capture(&self.topology, service_id);
        let now = self.now();
        let run = TestRun::new(config, service, networking, now);

        info!(
            service = %run.service_name,
            target_rps,
            duration_secs,
            %shape,
            "load test started"
        );
        self.log.test(
            now,
            LogLevel::Info,
            format!(
                "Load test started: {} at {} rps for {}s ({})",
                run.service_name, target_rps, duration_secs, shape
            ),
        );
        let latency = run.networking.expected_latency_increase_ms();
        if latency > 0 {
            self.log.test(
                now,
                LogLevel::Info,
                format!("Networking adds an expected +{latency}ms per request"),
            );
        }

        self.emit(SimEvent::RunStarted {
            service_id,
            service_name: run.service_name.clone(),
        });
        self.run = Some(run);
        self.scheduler
            .schedule_in(self.config.tick_interval(), Task::EngineTick);
        Ok(())
    }

    /// Start the `[load_test]` block of a scenario.
    pub fn start_from_entry(&mut self, entry: &LoadTestEntry) -> LoadTestResult<()> {
        let shape: TrafficShape = entry.traffic_shape.parse()?;
        let service_id = self
            .graph
            .find_service(&entry.service)
            .map(|s| s.id)
            .ok_or_else(|| {
                LoadTestError::InvalidInput(format!("unknown service '{}'", entry.service))
            })?;
        self.start(service_id, entry.target_rps, entry.duration_secs, shape)
    }

    /// Halt ticking. Returns false when no run is running.
    pub fn pause(&mut self) -> bool {
        let now = self.now();
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        if run.state != RunState::Running {
            return false;
        }
        run.state = RunState::Paused;
        let service_id = run.service_id();
        let elapsed = run.elapsed_secs;
        self.scheduler.retain(|t| *t != Task::EngineTick);
        self.log
            .test(now, LogLevel::Warning, format!("Load test paused at {elapsed}s"));
        self.emit(SimEvent::Paused { service_id });
        true
    }

    /// Continue a paused run from the same elapsed second.
    pub fn resume(&mut self) -> bool {
        let now = self.now();
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        if run.state != RunState::Paused {
            return false;
        }
        run.state = RunState::Running;
        let service_id = run.service_id();
        let elapsed = run.elapsed_secs;
        self.scheduler
            .schedule_in(self.config.tick_interval(), Task::EngineTick);
        self.log
            .test(now, LogLevel::Info, format!("Load test resumed at {elapsed}s"));
        self.emit(SimEvent::Resumed { service_id });
        true
    }

    /// Stop the active run and return its report. A no-op returning `None`
    /// when nothing is running.
    ///
    /// The run is detached before any cleanup, so a tick already queued
    /// sees no run. The tested service then gets one scale-down process
    /// (spawned, or refreshed if one is still draining) and one metric
    /// normalization (started, or restarted).
    pub fn stop(&mut self) -> Option<Report> {
        let mut run = self.run.take()?;
        run.state = RunState::Stopping;
        self.scheduler.retain(|t| *t != Task::EngineTick);

        let now = self.now();
        let service_id = run.service_id();
        if let Some(service) = self.graph.service_mut(service_id) {
            match self.scale_downs.get_mut(&service_id) {
                Some(process) => process.refresh(service),
                None => {
                    if let Some(process) = ScaleDownProcess::spawn(service) {
                        self.scale_downs.insert(service_id, process);
                        self.scheduler.schedule_in(
                            self.config.scale_down_interval(),
                            Task::ScaleDownStep { service_id },
                        );
                    }
                }
            }
            match self.normalizations.get_mut(&service_id) {
                Some(normalization) => normalization.restart(service),
                None => {
                    let normalization =
                        MetricNormalization::start(service, self.config.drain.normalize_steps);
                    self.normalizations.insert(service_id, normalization);
                    self.scheduler.schedule_in(
                        self.config.normalize_interval(),
                        Task::NormalizeStep { service_id },
                    );
                }
            }
        }

        let report = Report::from_run(&run);
        run.state = RunState::Idle;

        info!(
            service = %report.service_name,
            elapsed = report.elapsed_secs,
            requests = report.results.total_requests,
            errors = report.results.total_errors,
            "load test stopped"
        );
        self.log.test(
            now,
            LogLevel::Success,
            format!(
                "Load test finished: {} requests, {} errors ({:.2}%)",
                report.results.total_requests,
                report.results.total_errors,
                report.results.error_rate_percent
            ),
        );
        if self.scale_downs.contains_key(&service_id) {
            self.log.system(
                now,
                LogLevel::Info,
                format!("Scaling {} down to {} replicas", report.service_name, run.min_replicas),
            );
        }
        self.emit(SimEvent::RunStopped(Box::new(report.clone())));
        self.last_report = Some(report.clone());
        Some(report)
    }

    // ── Clock ──────────────────────────────────────────────────────

    /// Run every task due within the next `by`, then move the clock to the
    /// end of the window. Returns how many tasks ran.
    pub fn advance(&mut self, by: Duration) -> usize {
        let until = self.now() + by;
        let mut ran = 0;
        while let Some((_, task)) = self.scheduler.pop_due(until) {
            self.dispatch(task);
            ran += 1;
        }
        self.scheduler.advance_to(until);
        ran
    }

    /// Fast-forward until the active run stops, at most `limit` of simulated
    /// time. Returns the run's report, or `None` when there was no run or it
    /// did not finish in time.
    pub fn run_until_stopped(&mut self, limit: Duration) -> Option<Report> {
        self.run.as_ref()?;
        let deadline = self.now() + limit;
        while self.run.is_some() {
            let due = self.scheduler.next_due()?;
            if due > deadline {
                self.scheduler.advance_to(deadline);
                return None;
            }
            if let Some((_, task)) = self.scheduler.pop_due(due) {
                self.dispatch(task);
            }
        }
        self.last_report.clone()
    }

    /// Fast-forward until no run, pod startup, drain or normalization is
    /// pending, at most `limit` of simulated time. Idle node jitter does not
    /// count as pending work.
    pub fn settle(&mut self, limit: Duration) -> bool {
        let deadline = self.now() + limit;
        loop {
            if self.is_settled() {
                return true;
            }
            let Some(due) = self.scheduler.next_due() else {
                return false;
            };
            if due > deadline {
                self.scheduler.advance_to(deadline);
                return false;
            }
            if let Some((_, task)) = self.scheduler.pop_due(due) {
                self.dispatch(task);
            }
        }
    }

    fn is_settled(&self) -> bool {
        self.run.is_none() && !self.scheduler.any(|t| *t != Task::NodeJitter)
    }

    fn dispatch(&mut self, task: Task) {
        match task {
            Task::EngineTick => self.engine_tick(),
            Task::PodReady { service_id, pod_id } => self.pod_ready(service_id, &pod_id),
            Task::ScaleDownStep { service_id } => self.scale_down_step(service_id),
            Task::NormalizeStep { service_id } => self.normalize_step(service_id),
            Task::NodeJitter => self.node_jitter(),
        }
    }

    // ── Tasks ──────────────────────────────────────────────────────

    fn engine_tick(&mut self) {
        let now = self.now();
        let Some(service_id) = self
            .run
            .as_ref()
            .filter(|r| r.state == RunState::Running)
            .map(TestRun::service_id)
        else {
            return;
        };
        if self.graph.service(service_id).is_none() {
            warn!(service_id, "tested service disappeared, stopping load test");
            self.stop();
            return;
        }
        let (Some(run), Some(service)) = (self.run.as_mut(), self.graph.service_mut(service_id))
        else {
            return;
        };

        run.elapsed_secs += 1;
        let rps = run.config.shape.rps(
            run.config.target_rps,
            run.elapsed_secs,
            run.config.duration_secs,
        );
        run.current_rps = rps;
        service.requests = rps;
        run.total_requests = run.total_requests.saturating_add(rps);

        match self.scaler.evaluate(service, rps, now) {
            ScaleDecision::PodStarting { pod_id, ready_at } => {
                self.log.system(
                    now,
                    LogLevel::Info,
                    format!(
                        "Starting pod {pod_id} for {} ({}s startup)",
                        service.name, service.pod_startup_secs
                    ),
                );
                self.scheduler
                    .schedule_at(ready_at, Task::PodReady { service_id, pod_id });
            }
            ScaleDecision::ScaledDown { replicas } => {
                self.log.system(
                    now,
                    LogLevel::Info,
                    format!("Scaled {} down to {replicas} replicas", service.name),
                );
                let _ = self.events.send(SimEvent::ScaledDown {
                    service_id,
                    replicas,
                });
            }
            ScaleDecision::NoChange => {}
        }
        run.observe_replicas(service.current_replicas);

        let outcome = compute_errors(service, rps, &run.networking);
        run.total_errors = run.total_errors.saturating_add(outcome.errors);
        if outcome.errors > 0 && outcome.base_rate_percent > 0.0 {
            self.log.test(
                now,
                LogLevel::Warning,
                format!(
                    "{} errors at {rps} rps ({:.1}% overload)",
                    outcome.errors, outcome.base_rate_percent
                ),
            );
        }

        let cluster_id = service.cluster_id;
        let replicas = service.current_replicas;
        let throughput = service.throughput;
        nodes::apply_load(
            self.graph.nodes_in_cluster_mut(cluster_id),
            rps,
            replicas,
            throughput,
            &mut self.rng,
        );

        let violations = run.networking.record(rps, &mut run.networking_metrics);
        self.topology.record_traffic(service_id, rps);
        for lb in &run.networking.load_balancers {
            let per_replica = distribute(rps, replicas).first().copied().unwrap_or(0);
            self.log.test(
                now,
                LogLevel::Info,
                format!(
                    "[LB] {}: {rps} rps across {replicas} replicas ({per_replica} per replica)",
                    lb.name
                ),
            );
        }
        if violations > 0 {
            debug!(service_id, violations, "policy violations");
        }

        let noise = self.rng.gen_range(-50.0..50.0);
        run.update_response_time(noise);

        let finished = run.is_finished();
        let status = run.status(self.graph.service(service_id));
        debug!(
            service_id,
            elapsed = status.elapsed_secs,
            rps,
            replicas = status.replicas,
            pending = status.pending_pods,
            errors = status.total_errors,
            "tick"
        );
        self.emit(SimEvent::Tick(status));

        if finished {
            self.stop();
        } else {
            self.scheduler
                .schedule_in(self.config.tick_interval(), Task::EngineTick);
        }
    }

    fn pod_ready(&mut self, service_id: ServiceId, pod_id: &str) {
        let now = self.now();
        let Some(service) = self.graph.service_mut(service_id) else {
            return;
        };
        if !complete_pod(service, pod_id) {
            return;
        }
        let replicas = service.current_replicas;
        self.log.system(
            now,
            LogLevel::Success,
            format!("Pod {pod_id} ready, {} now at {replicas} replicas", service.name),
        );
        if let Some(run) = self.run.as_mut() {
            if run.service_id() == service_id {
                run.observe_replicas(replicas);
            }
        }
        self.emit(SimEvent::PodReady {
            service_id,
            pod_id: pod_id.to_string(),
            replicas,
        });
    }

    fn scale_down_step(&mut self, service_id: ServiceId) {
        let now = self.now();
        let Some(process) = self.scale_downs.get_mut(&service_id) else {
            return;
        };
        let Some(service) = self.graph.service_mut(service_id) else {
            self.scale_downs.remove(&service_id);
            return;
        };
        match process.step(service) {
            DrainStep::Removed { replicas } => {
                self.log.system(
                    now,
                    LogLevel::Info,
                    format!("Terminated a pod of {}, {replicas} replicas left", service.name),
                );
                self.emit(SimEvent::ScaledDown {
                    service_id,
                    replicas,
                });
                self.scheduler.schedule_in(
                    self.config.scale_down_interval(),
                    Task::ScaleDownStep { service_id },
                );
            }
            DrainStep::Waiting => {
                self.scheduler.schedule_in(
                    self.config.scale_down_interval(),
                    Task::ScaleDownStep { service_id },
                );
            }
            DrainStep::Done => {
                let replicas = service.current_replicas;
                self.log.system(
                    now,
                    LogLevel::Success,
                    format!("{} scaled down to {replicas} replicas", service.name),
                );
                self.scale_downs.remove(&service_id);
                self.emit(SimEvent::DrainComplete {
                    service_id,
                    replicas,
                });
            }
        }
    }

    fn normalize_step(&mut self, service_id: ServiceId) {
        let now = self.now();
        let Some(normalization) = self.normalizations.get_mut(&service_id) else {
            return;
        };
        let Some(service) = self.graph.service_mut(service_id) else {
            self.normalizations.remove(&service_id);
            return;
        };
        match normalization.step(service, &mut self.rng) {
            NormalizeStep::Decaying { .. } => {
                self.scheduler.schedule_in(
                    self.config.normalize_interval(),
                    Task::NormalizeStep { service_id },
                );
            }
            NormalizeStep::Settled => {
                self.log.test(
                    now,
                    LogLevel::Success,
                    format!("Metrics of {} normalized", service.name),
                );
                self.normalizations.remove(&service_id);
                self.emit(SimEvent::MetricsNormalized { service_id });
            }
        }
    }

    fn node_jitter(&mut self) {
        if self.run.is_none() {
            let touched = nodes::jitter(self.graph.nodes_mut(), &mut self.rng);
            debug!(nodes = touched, "node jitter");
        }
        self.scheduler
            .schedule_in(self.config.jitter_interval(), Task::NodeJitter);
    }

    // ── Graph maintenance ─────────────────────────────────────────

    /// Remove a service. An active run against it is stopped first; its
    /// drain processes, queued tasks and networking objects go with it.
    pub fn remove_service(&mut self, service_id: ServiceId) -> LoadTestResult<Service> {
        if self
            .run
            .as_ref()
            .is_some_and(|r| r.service_id() == service_id)
        {
            self.stop();
        }
        let service = self.graph.remove_service(service_id)?;
        self.scale_downs.remove(&service_id);
        self.normalizations.remove(&service_id);
        self.scheduler
            .retain(|t| t.service_id() != Some(service_id));
        let removed = self.topology.remove_for_service(service_id);
        self.log.system(
            self.now(),
            LogLevel::Warning,
            format!(
                "Service {} removed with {removed} networking objects",
                service.name
            ),
        );
        Ok(service)
    }

    /// Cancel every pod startup, scale-down and normalization. The active
    /// run, if any, keeps ticking. Returns how many queued tasks were
    /// dropped.
    pub fn emergency_cleanup(&mut self) -> usize {
        let dropped = self
            .scheduler
            .retain(|t| matches!(t, Task::EngineTick | Task::NodeJitter));
        self.scale_downs.clear();
        self.normalizations.clear();
        let pods: usize = self
            .graph
            .services_mut()
            .map(cancel_starting_pods)
            .sum();
        warn!(dropped, pods, "emergency cleanup");
        self.log.system(
            self.now(),
            LogLevel::Error,
            format!("Emergency cleanup: {dropped} tasks and {pods} starting pods cancelled"),
        );
        dropped
    }

    // ── Projections ───────────────────────────────────────────────

    pub fn status(&self) -> Option<RunStatus> {
        let run = self.run.as_ref()?;
        Some(run.status(self.graph.service(run.service_id())))
    }

    pub fn pod_status(&self, service_id: ServiceId) -> Option<PodStatus> {
        self.graph
            .service(service_id)
            .map(|s| pod_status(s, self.now()))
    }

    pub fn prometheus(&self) -> String {
        let gauges = self.run.as_ref().map(|run| RunGauges {
            service: run.service_name.clone(),
            elapsed_secs: run.elapsed_secs,
            total_requests: run.total_requests,
            total_errors: run.total_errors,
        });
        render_prometheus(self.graph.services(), self.graph.nodes(), gauges.as_ref())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            graph: self.graph.clone(),
            topology: self.topology.clone(),
            saved_at_secs: self.now().as_secs(),
        }
    }
}
