//! Node cpu/memory model.
//!
//! Under load every node of the tested service's cluster is recomputed from
//! the per-replica load; while idle, running nodes drift by a small random
//! amount each jitter interval. All values stay inside [0, 100].

use rand::Rng;

use kubesim_state::{Node, NodeStatus};

/// Recompute usage for the nodes hosting a service under load.
///
/// `base = rps / (replicas * throughput)`, saturating at 1.0 when the
/// service has no serving capacity.
pub fn apply_load<'a>(
    nodes: impl IntoIterator<Item = &'a mut Node>,
    rps: u64,
    current_replicas: u32,
    throughput: u64,
    rng: &mut impl Rng,
) {
    let capacity = u64::from(current_replicas).saturating_mul(throughput);
    let base = if capacity == 0 {
        1.0
    } else {
        rps as f64 / capacity as f64
    };
    let memory_base = f64::from(current_replicas) * 15.0;

    for node in nodes {
        node.cpu_usage = (base * 80.0 + rng.gen_range(0.0..20.0)).clamp(10.0, 95.0);
        node.memory_usage = (memory_base + rng.gen_range(0.0..20.0)).clamp(15.0, 90.0);
    }
}

/// Idle drift for running nodes: cpu moves by up to ±2.5 points within
/// [5, 95], memory by up to ±1.5 points within [10, 90].
pub fn jitter<'a>(nodes: impl IntoIterator<Item = &'a mut Node>, rng: &mut impl Rng) -> usize {
    let mut touched = 0;
    for node in nodes {
        if node.status != NodeStatus::Running {
            continue;
        }
        node.cpu_usage = (node.cpu_usage + (rng.gen_range(0.0..1.0) - 0.5) * 5.0).clamp(5.0, 95.0);
        node.memory_usage =
            (node.memory_usage + (rng.gen_range(0.0..1.0) - 0.5) * 3.0).clamp(10.0, 90.0);
        touched += 1;
    }
    touched
}
