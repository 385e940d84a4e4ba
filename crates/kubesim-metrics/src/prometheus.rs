//! Prometheus text exposition format.
//!
//! Renders the simulated services, nodes and the active load test as
//! gauges, so a run can be scraped or diffed like a real cluster.

use std::fmt::Write;

use kubesim_state::{Node, Service};

/// Counters of the active load test, filled in by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RunGauges {
    pub service: String,
    pub elapsed_secs: u64,
    pub total_requests: u64,
    pub total_errors: u64,
}

fn header(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
}

/// Render services, nodes and the optional run into Prometheus text format.
///
/// Service gauges carry `service` labels, node gauges `node` and `cluster`
/// labels. Load-test gauges are only emitted while a run is active.
pub fn render_prometheus<'a>(
    services: impl IntoIterator<Item = &'a Service>,
    nodes: impl IntoIterator<Item = &'a Node>,
    run: Option<&RunGauges>,
) -> String {
    let services: Vec<&Service> = services.into_iter().collect();
    let nodes: Vec<&Node> = nodes.into_iter().collect();
    let mut out = String::new();

    header(
        &mut out,
        "kubesim_service_requests_per_second",
        "Requests observed in the last tick.",
    );
    for s in &services {
        let _ = writeln!(
            out,
            "kubesim_service_requests_per_second{{service=\"{}\"}} {}",
            s.name, s.requests
        );
    }

    header(&mut out, "kubesim_service_replicas", "Replicas serving traffic.");
    for s in &services {
        let _ = writeln!(
            out,
            "kubesim_service_replicas{{service=\"{}\"}} {}",
            s.name, s.current_replicas
        );
    }

    header(&mut out, "kubesim_service_pending_pods", "Pods still starting.");
    for s in &services {
        let _ = writeln!(
            out,
            "kubesim_service_pending_pods{{service=\"{}\"}} {}",
            s.name, s.pending_pods
        );
    }

    header(&mut out, "kubesim_service_errors_total", "Accumulated request errors.");
    for s in &services {
        let _ = writeln!(
            out,
            "kubesim_service_errors_total{{service=\"{}\"}} {}",
            s.name, s.errors
        );
    }

    header(&mut out, "kubesim_node_cpu_percent", "Node CPU usage in percent.");
    for n in &nodes {
        let _ = writeln!(
            out,
            "kubesim_node_cpu_percent{{node=\"{}\",cluster=\"{}\"}} {:.2}",
            n.name, n.cluster_id, n.cpu_usage
        );
    }

    header(&mut out, "kubesim_node_memory_percent", "Node memory usage in percent.");
    for n in &nodes {
        let _ = writeln!(
            out,
            "kubesim_node_memory_percent{{node=\"{}\",cluster=\"{}\"}} {:.2}",
            n.name, n.cluster_id, n.memory_usage
        );
    }

    if let Some(run) = run {
        header(
            &mut out,
            "kubesim_loadtest_elapsed_seconds",
            "Simulated seconds elapsed in the active load test.",
        );
        let _ = writeln!(
            out,
            "kubesim_loadtest_elapsed_seconds{{service=\"{}\"}} {}",
            run.service, run.elapsed_secs
        );
        header(
            &mut out,
            "kubesim_loadtest_requests_total",
            "Requests offered so far in the active load test.",
        );
        let _ = writeln!(
            out,
            "kubesim_loadtest_requests_total{{service=\"{}\"}} {}",
            run.service, run.total_requests
        );
        header(
            &mut out,
            "kubesim_loadtest_errors_total",
            "Errors so far in the active load test.",
        );
        let _ = writeln!(
            out,
            "kubesim_loadtest_errors_total{{service=\"{}\"}} {}",
            run.service, run.total_errors
        );
    }

    out
}
