//! kubesim-core: configuration shared by every kubesim crate.
//!
//! `SimConfig` carries the simulation tunables (tick pacing, scaling
//! thresholds, drain timing, node jitter, event log size). `ScenarioFile`
//! is the TOML document a user hands to `kubesimd`: the resource graph,
//! the networking objects attached to it, and an optional load test.

pub mod config;
pub mod error;
pub mod scenario;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
pub use scenario::*;
