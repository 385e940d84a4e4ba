//! Real-time driver: a tokio task that owns a [`Simulation`] and advances
//! it one engine tick per paced interval.
//!
//! Callers talk to it through a cloneable [`DriverHandle`]; every command
//! carries a oneshot reply. The task stops on the shutdown signal or once
//! every handle is dropped, and hands the simulation back through its
//! `JoinHandle`.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use kubesim_state::ServiceId;

use crate::error::{LoadTestError, LoadTestResult};
use crate::report::Report;
use crate::run::RunStatus;
use crate::simulation::Simulation;
use crate::traffic::TrafficShape;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Start {
        service_id: ServiceId,
        target_rps: u64,
        duration_secs: u64,
        shape: TrafficShape,
        reply: oneshot::Sender<LoadTestResult<()>>,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<Option<Report>>,
    },
    Status {
        reply: oneshot::Sender<Option<RunStatus>>,
    },
    LastReport {
        reply: oneshot::Sender<Option<Report>>,
    },
    Prometheus {
        reply: oneshot::Sender<String>,
    },
}

#[derive(Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<Command>,
}

impl DriverHandle {
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> LoadTestResult<R> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| LoadTestError::DriverClosed)?;
        rx.await.map_err(|_| LoadTestError::DriverClosed)
    }

    pub async fn start(
        &self,
        service_id: ServiceId,
        target_rps: u64,
        duration_secs: u64,
        shape: TrafficShape,
    ) -> LoadTestResult<()> {
        self.request(|reply| Command::Start {
            service_id,
            target_rps,
            duration_secs,
            shape,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> LoadTestResult<bool> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> LoadTestResult<bool> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn stop(&self) -> LoadTestResult<Option<Report>> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn status(&self) -> LoadTestResult<Option<RunStatus>> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn last_report(&self) -> LoadTestResult<Option<Report>> {
        self.request(|reply| Command::LastReport { reply }).await
    }

    pub async fn prometheus(&self) -> LoadTestResult<String> {
        self.request(|reply| Command::Prometheus { reply }).await
    }
}

pub struct SimulationDriver;

impl SimulationDriver {
    /// Spawn the driver task. Each `pace` of wall-clock time advances the
    /// simulation by one configured tick interval.
    pub fn spawn(
        sim: Simulation,
        pace: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (DriverHandle, JoinHandle<Simulation>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(run(sim, pace, rx, shutdown));
        (DriverHandle { tx }, handle)
    }
}

async fn run(
    mut sim: Simulation,
    pace: Duration,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) -> Simulation {
    let step = sim.config().tick_interval();
    let mut ticker = tokio::time::interval(pace);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    info!(pace_ms = pace.as_millis() as u64, "simulation driver started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ran = sim.advance(step);
                debug!(ran, now = sim.now().as_secs(), "driver step");
            }
            cmd = commands.recv() => match cmd {
                Some(cmd) => handle(&mut sim, cmd),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    info!(now = sim.now().as_secs(), "simulation driver stopped");
    sim
}

fn handle(sim: &mut Simulation, cmd: Command) {
    // A dropped reply receiver means the caller gave up; nothing to do.
    match cmd {
        Command::Start {
            service_id,
            target_rps,
            duration_secs,
            shape,
            reply,
        } => {
            let _ = reply.send(sim.start(service_id, target_rps, duration_secs, shape));
        }
        Command::Pause { reply } => {
            let _ = reply.send(sim.pause());
        }
        Command::Resume { reply } => {
            let _ = reply.send(sim.resume());
        }
        Command::Stop { reply } => {
            let _ = reply.send(sim.stop());
        }
        Command::Status { reply } => {
            let _ = reply.send(sim.status());
        }
        Command::LastReport { reply } => {
            let _ = reply.send(sim.last_report().cloned());
        }
        Command::Prometheus { reply } => {
            let _ = reply.send(sim.prometheus());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubesim_core::SimConfig;
    use kubesim_state::{
        ClusterKind, ClusterSpec, NetworkTopologyIndex, NodeSpec, ResourceGraph, ServiceSpec,
    };

    use crate::run::RunState;

    fn simulation() -> (Simulation, ServiceId) {
        let mut graph = ResourceGraph::new();
        let cluster_id = graph
            .add_cluster(ClusterSpec {
                name: "dev".to_string(),
                region: "us-east-1".to_string(),
                version: "1.29".to_string(),
                kind: ClusterKind::SelfManaged,
            })
            .unwrap();
        graph
            .add_node(NodeSpec {
                name: "node-1".to_string(),
                cluster_id,
                node_type: "m5.large".to_string(),
                zone: "us-east-1a".to_string(),
                cpu_usage: 25.0,
                memory_usage: 40.0,
            })
            .unwrap();
        let mut spec = ServiceSpec::new("web", cluster_id);
        spec.min_replicas = 1;
        spec.max_replicas = 1;
        let id = graph.deploy_service(spec).unwrap();

        let mut config = SimConfig::default();
        config.nodes.jitter_enabled = false;
        let sim = Simulation::new(config, graph, NetworkTopologyIndex::new()).unwrap();
        (sim, id)
    }

    #[tokio::test(start_paused = true)]
    async fn paced_run_completes() {
        let (sim, id) = simulation();
        let mut events = sim.subscribe();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, join) = SimulationDriver::spawn(sim, Duration::from_secs(1), shutdown_rx);

        handle.start(id, 20, 3, TrafficShape::Constant).await.unwrap();
        let status = handle.status().await.unwrap().unwrap();
        assert_eq!(status.state, RunState::Running);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.status().await.unwrap().is_none());
        let report = handle.last_report().await.unwrap().unwrap();
        assert_eq!(report.results.total_requests, 60);

        let mut stopped = false;
        while let Ok(event) = events.try_recv() {
            if let crate::simulation::SimEvent::RunStopped(_) = event {
                stopped = true;
            }
        }
        assert!(stopped);

        drop(handle);
        let sim = join.await.unwrap();
        assert!(sim.last_report().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn commands_surface_engine_errors() {
        let (sim, id) = simulation();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, _join) = SimulationDriver::spawn(sim, Duration::from_secs(1), shutdown_rx);

        assert!(matches!(
            handle.start(id, 0, 3, TrafficShape::Ramp).await,
            Err(LoadTestError::InvalidInput(_))
        ));
        handle.start(id, 10, 30, TrafficShape::Ramp).await.unwrap();
        assert!(matches!(
            handle.start(id, 10, 30, TrafficShape::Ramp).await,
            Err(LoadTestError::Conflict { .. })
        ));
        assert!(handle.pause().await.unwrap());
        assert!(handle.resume().await.unwrap());
        let report = handle.stop().await.unwrap().unwrap();
        assert_eq!(report.traffic_shape, TrafficShape::Ramp);
        assert!(handle.stop().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_simulation() {
        let (sim, id) = simulation();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, join) = SimulationDriver::spawn(sim, Duration::from_millis(100), shutdown_rx);
        handle.start(id, 10, 600, TrafficShape::Constant).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        shutdown_tx.send(true).unwrap();
        let sim = join.await.unwrap();
        assert!(sim.is_running());
        assert!(sim.status().unwrap().elapsed_secs > 0);

        assert!(matches!(
            handle.prometheus().await,
            Err(LoadTestError::DriverClosed)
        ));
    }
}
