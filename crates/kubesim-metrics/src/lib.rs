//! kubesim-metrics: observability for the simulated cluster.
//!
//! # Architecture
//!
//! ```text
//! nodes
//!   ├── apply_load() ← every load-test tick, nodes of the tested cluster
//!   └── jitter()     ← periodic idle drift while no test runs
//!
//! EventLog
//!   └── push()       → bounded history, oldest evicted first
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain gauges
//! ```

pub mod log;
pub mod nodes;
pub mod prometheus;

pub use log::{EventLog, LogChannel, LogEntry, LogLevel};
pub use prometheus::{RunGauges, render_prometheus};
