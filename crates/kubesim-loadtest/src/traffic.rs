//! Traffic shapes: offered requests per second as a pure function of
//! elapsed time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoadTestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficShape {
    /// Always the target rate.
    Constant,
    /// Linear from 0 to the target over the run.
    Ramp,
    /// Five equal windows, each opening with a burst at twice the target
    /// for its first tenth and idling at 30% of the target otherwise.
    Spike,
}

impl TrafficShape {
    pub fn rps(self, target_rps: u64, elapsed_secs: u64, duration_secs: u64) -> u64 {
        match self {
            TrafficShape::Constant => target_rps,
            TrafficShape::Ramp => {
                if duration_secs == 0 {
                    return target_rps;
                }
                let scaled =
                    u128::from(target_rps) * u128::from(elapsed_secs) / u128::from(duration_secs);
                u64::try_from(scaled).unwrap_or(u64::MAX)
            }
            TrafficShape::Spike => {
                let window = duration_secs / 5;
                if window == 0 {
                    return target_rps;
                }
                let position = elapsed_secs % window;
                if u128::from(position) * 10 < u128::from(window) {
                    target_rps.saturating_mul(2)
                } else {
                    target_rps.saturating_mul(3) / 10
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficShape::Constant => "constant",
            TrafficShape::Ramp => "ramp",
            TrafficShape::Spike => "spike",
        }
    }
}

impl fmt::Display for TrafficShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficShape {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "ramp" => Ok(Self::Ramp),
            "spike" => Ok(Self::Spike),
            other => Err(LoadTestError::InvalidInput(format!(
                "unknown traffic shape '{other}' (expected constant, ramp or spike)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant() {
        for elapsed in 0..20 {
            assert_eq!(TrafficShape::Constant.rps(250, elapsed, 20), 250);
        }
    }

    #[test]
    fn ramp() {
        assert_eq!(TrafficShape::Ramp.rps(100, 5, 10), 50);
        assert_eq!(TrafficShape::Ramp.rps(100, 0, 10), 0);
        assert_eq!(TrafficShape::Ramp.rps(100, 10, 10), 100);
        assert_eq!(TrafficShape::Ramp.rps(7, 1, 3), 2);
    }

    #[test]
    fn spike_windows() {
        let shape = TrafficShape::Spike;
        assert_eq!(shape.rps(100, 0, 50), 200);
        assert_eq!(shape.rps(100, 1, 50), 30);
        assert_eq!(shape.rps(100, 5, 50), 30);
        assert_eq!(shape.rps(100, 10, 50), 200);
        assert_eq!(shape.rps(100, 49, 50), 30);
    }

    #[test]
    fn spike_short_run_acts_constant() {
        for elapsed in 0..4 {
            assert_eq!(TrafficShape::Spike.rps(100, elapsed, 4), 100);
        }
    }

    #[test]
    fn deterministic() {
        for shape in [TrafficShape::Constant, TrafficShape::Ramp, TrafficShape::Spike] {
            assert_eq!(shape.rps(333, 17, 60), shape.rps(333, 17, 60));
        }
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        assert_eq!(TrafficShape::Spike.rps(u64::MAX, 0, 50), u64::MAX);
        assert_eq!(TrafficShape::Ramp.rps(u64::MAX, 10, 10), u64::MAX);
    }

    #[test]
    fn parse() {
        assert_eq!("Spike".parse::<TrafficShape>().unwrap(), TrafficShape::Spike);
        assert_eq!(TrafficShape::Ramp.to_string(), "ramp");
        assert!(matches!(
            "burst".parse::<TrafficShape>(),
            Err(LoadTestError::InvalidInput(_))
        ));
    }
}
