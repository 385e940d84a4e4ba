//! Final report of a load test.
//!
//! Built once when a run stops, from the run's accumulators and its
//! networking snapshot. Renders as plain text via `Display` and as JSON via
//! `serde`; conclusions serialize as their English sentence.

use std::fmt;

use serde::Serialize;

use crate::networking::{NetworkingMetrics, NetworkingSummary};
use crate::run::TestRun;
use crate::traffic::TrafficShape;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub service_name: String,
    pub tech_label: String,
    pub elapsed_secs: u64,
    pub duration_secs: u64,
    pub target_rps: u64,
    pub traffic_shape: TrafficShape,
    pub networking: NetworkingSummary,
    pub results: ReportResults,
    pub networking_metrics: NetworkingMetrics,
    pub conclusions: Vec<Conclusion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportResults {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate_percent: f64,
    pub min_replicas: u32,
    pub max_replicas_observed: u32,
    pub auto_scale_triggered: bool,
    pub extra_latency_ms: u32,
}

/// Qualitative findings, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Conclusion {
    LowErrorRate,
    ModerateErrorRate,
    HighErrorRate,
    AutoScaled { replicas: u32 },
    NoScalingNeeded,
    MaxReplicasReached,
    LoadBalancerDistributed,
    TlsLatency,
    DenyPoliciesEnforced,
    HighNetworkLatency { ms: u32 },
    LowNetworkLatency { ms: u32 },
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conclusion::LowErrorRate => {
                f.write_str("The service handled the load successfully with very few errors.")
            }
            Conclusion::ModerateErrorRate => {
                f.write_str("The service had some errors but remained stable.")
            }
            Conclusion::HighErrorRate => {
                f.write_str("The service experienced a high error rate under load.")
            }
            Conclusion::AutoScaled { replicas } => {
                write!(f, "Auto-scaling worked, scaling up to {replicas} replicas.")
            }
            Conclusion::NoScalingNeeded => {
                f.write_str("No scaling was needed during the test.")
            }
            Conclusion::MaxReplicasReached => f.write_str(
                "The maximum replica limit was reached. Consider raising it for more capacity.",
            ),
            Conclusion::LoadBalancerDistributed => {
                f.write_str("The load balancer distributed traffic across the replicas.")
            }
            Conclusion::TlsLatency => {
                f.write_str("TLS on the ingress added latency in exchange for security.")
            }
            Conclusion::DenyPoliciesEnforced => {
                f.write_str("Deny network policies blocked unauthorized traffic.")
            }
            Conclusion::HighNetworkLatency { ms } => write!(
                f,
                "The networking configuration added significant latency (+{ms}ms). Consider optimizing it."
            ),
            Conclusion::LowNetworkLatency { ms } => write!(
                f,
                "The networking configuration added minimal latency (+{ms}ms)."
            ),
        }
    }
}

impl From<Conclusion> for String {
    fn from(c: Conclusion) -> Self {
        c.to_string()
    }
}

impl Report {
    pub fn from_run(run: &TestRun) -> Self {
        let networking = run.networking.summary();
        let extra_latency_ms = run.networking.expected_latency_increase_ms();
        let results = ReportResults {
            total_requests: run.total_requests,
            total_errors: run.total_errors,
            error_rate_percent: run.error_rate_percent(),
            min_replicas: run.min_replicas,
            max_replicas_observed: run.max_replicas_observed,
            auto_scale_triggered: run.max_replicas_observed > run.min_replicas,
            extra_latency_ms,
        };
        let conclusions = conclusions(&results, run.max_replicas, &networking);

        Self {
            service_name: run.service_name.clone(),
            tech_label: run.tech_label.to_string(),
            elapsed_secs: run.elapsed_secs,
            duration_secs: run.config.duration_secs,
            target_rps: run.config.target_rps,
            traffic_shape: run.config.shape,
            networking,
            results,
            networking_metrics: run.networking_metrics,
            conclusions,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn conclusions(
    results: &ReportResults,
    max_replicas: u32,
    networking: &NetworkingSummary,
) -> Vec<Conclusion> {
    let mut out = Vec::new();

    out.push(if results.error_rate_percent < 1.0 {
        Conclusion::LowErrorRate
    } else if results.error_rate_percent < 5.0 {
        Conclusion::ModerateErrorRate
    } else {
        Conclusion::HighErrorRate
    });

    out.push(if results.auto_scale_triggered {
        Conclusion::AutoScaled {
            replicas: results.max_replicas_observed,
        }
    } else {
        Conclusion::NoScalingNeeded
    });

    if results.max_replicas_observed == max_replicas {
        out.push(Conclusion::MaxReplicasReached);
    }
    if networking.load_balancer_count > 0 {
        out.push(Conclusion::LoadBalancerDistributed);
    }
    if networking.tls_ingress_count > 0 {
        out.push(Conclusion::TlsLatency);
    }
    if networking.deny_policy_count > 0 {
        out.push(Conclusion::DenyPoliciesEnforced);
    }

    let ms = results.extra_latency_ms;
    if ms > 10 {
        out.push(Conclusion::HighNetworkLatency { ms });
    } else if ms > 0 {
        out.push(Conclusion::LowNetworkLatency { ms });
    }
    out
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = &self.networking;
        let r = &self.results;
        let m = &self.networking_metrics;

        writeln!(f, "=== LOAD TEST REPORT ===")?;
        writeln!(f, "Service: {} ({})", self.service_name, self.tech_label)?;
        writeln!(f, "Duration: {}/{} seconds", self.elapsed_secs, self.duration_secs)?;
        writeln!(f, "Target RPS: {}", self.target_rps)?;
        writeln!(f, "Traffic shape: {}", self.traffic_shape)?;

        writeln!(f)?;
        writeln!(f, "NETWORKING:")?;
        let mut any = false;
        if n.load_balancer_count > 0 {
            writeln!(f, "- Load balancers: {}", n.load_balancer_count)?;
            any = true;
        }
        if n.cluster_service_count > 0 {
            writeln!(f, "- Cluster services: {}", n.cluster_service_count)?;
            any = true;
        }
        if n.ingress_count > 0 {
            writeln!(f, "- Ingresses: {}", n.ingress_count)?;
            if n.tls_ingress_count > 0 {
                writeln!(f, "- Ingresses with TLS: {}", n.tls_ingress_count)?;
            }
            any = true;
        }
        if n.allow_policy_count + n.deny_policy_count > 0 {
            writeln!(
                f,
                "- Network policies: {} allow, {} deny",
                n.allow_policy_count, n.deny_policy_count
            )?;
            any = true;
        }
        if !any {
            writeln!(f, "- None (direct traffic)")?;
        }

        writeln!(f)?;
        writeln!(f, "RESULTS:")?;
        writeln!(f, "- Total requests: {}", r.total_requests)?;
        writeln!(f, "- Total errors: {}", r.total_errors)?;
        writeln!(f, "- Error rate: {:.2}%", r.error_rate_percent)?;
        writeln!(f, "- Initial replicas: {}", r.min_replicas)?;
        writeln!(f, "- Max replicas reached: {}", r.max_replicas_observed)?;
        writeln!(
            f,
            "- Auto-scaling triggered: {}",
            if r.auto_scale_triggered { "yes" } else { "no" }
        )?;
        writeln!(f, "- Extra networking latency: +{}ms", r.extra_latency_ms)?;

        writeln!(f)?;
        writeln!(f, "NETWORKING METRICS:")?;
        if any {
            if n.load_balancer_count > 0 {
                writeln!(f, "- Requests via load balancer: {}", m.load_balancer_requests)?;
            }
            if n.cluster_service_count > 0 {
                writeln!(f, "- Requests via cluster service: {}", m.cluster_service_requests)?;
            }
            if n.ingress_count > 0 {
                writeln!(f, "- Requests via ingress: {}", m.ingress_requests)?;
            }
            if n.allow_policy_count + n.deny_policy_count > 0 {
                writeln!(f, "- Network policy violations: {}", m.policy_violations)?;
            }
        } else {
            writeln!(f, "- No networking components used")?;
        }

        writeln!(f)?;
        writeln!(f, "CONCLUSIONS:")?;
        for c in &self.conclusions {
            writeln!(f, "- {c}")?;
        }
        Ok(())
    }
}
