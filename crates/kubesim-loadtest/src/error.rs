//! Error types for the load-test engine.

use kubesim_core::ConfigError;
use kubesim_state::StateError;
use thiserror::Error;

/// Result type alias for load-test operations.
pub type LoadTestResult<T> = Result<T, LoadTestError>;

#[derive(Debug, Error)]
pub enum LoadTestError {
    /// Out-of-range or unknown input; nothing was mutated.
    #[error("invalid load test input: {0}")]
    InvalidInput(String),

    /// A run is already active; nothing was mutated.
    #[error("a load test is already running against '{service}'")]
    Conflict { service: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("simulation driver is not running")]
    DriverClosed,
}
