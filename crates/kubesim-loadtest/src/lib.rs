//! kubesim-loadtest: the load-test engine.
//!
//! # Architecture
//!
//! ```text
//! Simulation (one per simulated cluster)
//!   ├── ResourceGraph + NetworkTopologyIndex   (kubesim-state)
//!   ├── Scheduler<Task>                        virtual clock
//!   │     ├── EngineTick      → traffic shape, AutoScaler, ErrorModel,
//!   │     │                     node load, networking counters
//!   │     ├── PodReady        → complete_pod at ready_at
//!   │     ├── ScaleDownStep   → post-run drain, one replica per interval
//!   │     ├── NormalizeStep   → post-run metric decay
//!   │     └── NodeJitter      → idle node drift
//!   ├── TestRun (at most one)  → Report on stop
//!   └── broadcast::Sender<SimEvent>
//!
//! SimulationDriver (tokio task)
//!   └── paces Simulation::advance in real time, serves DriverHandle commands
//! ```
//!
//! Tests and the CLI's fast-forward mode drive a [`Simulation`] directly
//! with [`Simulation::advance`] / [`Simulation::run_until_stopped`]; the
//! [`SimulationDriver`] only adds wall-clock pacing.

pub mod clock;
pub mod driver;
pub mod error;
pub mod error_model;
pub mod networking;
pub mod report;
pub mod run;
pub mod simulation;
pub mod traffic;

pub use clock::Scheduler;
pub use driver::{DriverHandle, SimulationDriver};
pub use error::{LoadTestError, LoadTestResult};
pub use error_model::{ErrorOutcome, base_error_rate, compute_errors, error_outcome};
pub use networking::{NetworkingContext, NetworkingMetrics, NetworkingSummary};
pub use report::{Conclusion, Report, ReportResults};
pub use run::{RunConfig, RunState, RunStatus, TestRun};
pub use simulation::{SimEvent, Simulation, Task};
pub use traffic::TrafficShape;
