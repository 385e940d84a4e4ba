//! Simulation tunables.
//!
//! Every section and field is defaulted, so an empty `[simulation]` table
//! (or none at all) yields the stock behaviour: one tick per second, scale
//! up above 80% and down below 30% of per-replica throughput, drain one
//! replica every 5 seconds, normalize metrics over 10 steps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SimConfig {
    pub engine: EngineConfig,
    pub scaling: ScalingConfig,
    pub drain: DrainConfig,
    pub nodes: NodeJitterConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Simulated time covered by one load-test tick, in milliseconds.
    pub tick_interval_ms: u64,
    /// Seed for the simulation RNG (residual traffic, node noise).
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    /// Fraction of per-replica throughput above which a pod is started.
    pub scale_up_threshold: f64,
    /// Fraction of per-replica throughput below which a replica is removed.
    pub scale_down_threshold: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DrainConfig {
    /// Seconds between replica removals after a run stops.
    pub scale_down_interval_secs: u64,
    /// Seconds between metric normalization steps.
    pub normalize_interval_secs: u64,
    /// Number of normalization steps before metrics settle.
    pub normalize_steps: u32,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            scale_down_interval_secs: 5,
            normalize_interval_secs: 5,
            normalize_steps: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeJitterConfig {
    pub jitter_enabled: bool,
    pub jitter_interval_secs: u64,
}

impl Default for NodeJitterConfig {
    fn default() -> Self {
        Self {
            jitter_enabled: true,
            jitter_interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum entries kept by the event log; oldest are evicted first.
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

impl SimConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine.tick_interval_ms)
    }

    pub fn scale_down_interval(&self) -> Duration {
        Duration::from_secs(self.drain.scale_down_interval_secs)
    }

    pub fn normalize_interval(&self) -> Duration {
        Duration::from_secs(self.drain.normalize_interval_secs)
    }

    pub fn jitter_interval(&self) -> Duration {
        Duration::from_secs(self.nodes.jitter_interval_secs)
    }

    /// Check the tunables for values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.tick_interval_ms must be positive".to_string(),
            ));
        }
        let up = self.scaling.scale_up_threshold;
        let down = self.scaling.scale_down_threshold;
        if !(up.is_finite() && down.is_finite()) || down < 0.0 || down >= up {
            return Err(ConfigError::Invalid(format!(
                "scaling thresholds must satisfy 0 <= down < up (down={down}, up={up})"
            )));
        }
        if self.drain.scale_down_interval_secs == 0 || self.drain.normalize_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "drain intervals must be positive".to_string(),
            ));
        }
        if self.nodes.jitter_enabled && self.nodes.jitter_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "nodes.jitter_interval_secs must be positive when jitter is enabled".to_string(),
            ));
        }
        if self.log.capacity == 0 {
            return Err(ConfigError::Invalid("log.capacity must be positive".to_string()));
        }
        Ok(())
    }
}
