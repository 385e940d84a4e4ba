//! kubesim-autoscale: load-driven replica scaling.
//!
//! [`AutoScaler::evaluate`] runs once per load-test tick. Pods requested by
//! a scale-up join the serving set after the service's startup delay; the
//! caller schedules [`complete_pod`] at the returned `ready_at`.
//!
//! # Scaling Algorithm
//!
//! ```text
//! units         = current_replicas + pending_pods
//! load_per_unit = rps / units            (infinite when units == 0)
//!
//! if load_per_unit > throughput * 0.8 and units < max_replicas:
//!     start one pod (joins after pod_startup_secs)
//!
//! if load_per_unit < throughput * 0.3 and current_replicas > min_replicas:
//!     current_replicas -= 1              (immediate)
//! ```
//!
//! After a run stops, [`ScaleDownProcess`] removes one replica per interval
//! down to `min_replicas` and [`MetricNormalization`] decays the service's
//! request and error counters.

pub mod drain;
pub mod scaler;

pub use drain::{DrainStep, MetricNormalization, NormalizeStep, ScaleDownProcess};
pub use scaler::{
    AutoScaler, PodStatus, ScaleDecision, cancel_starting_pods, complete_pod, pod_status,
};
