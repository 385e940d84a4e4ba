//! kubesimd: the kubesim command-line driver.
//!
//! Loads a scenario (clusters, nodes, services, networking objects and a
//! `[load_test]` block), runs the load test against the simulated cluster
//! and prints the report:
//! - fast-forwarded on the virtual clock (default), or
//! - paced in real time by the simulation driver (`--realtime`).
//!
//! # Usage
//!
//! ```text
//! kubesimd validate --scenario scenarios/checkout.toml
//! kubesimd run --scenario scenarios/checkout.toml --json
//! kubesimd run --scenario scenarios/checkout.toml --realtime --pace-ms 250
//! kubesimd run --scenario scenarios/checkout.toml --store sim.redb --save after-spike
//! kubesimd run --scenario scenarios/checkout.toml --store sim.redb --load after-spike
//! kubesimd snapshots --store sim.redb
//! kubesimd snapshots --store sim.redb --delete after-spike
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kubesim_core::{LoadTestEntry, ScenarioFile};
use kubesim_loadtest::{Report, SimEvent, Simulation, SimulationDriver};
use kubesim_state::SnapshotStore;

/// Simulated time allowed for the post-run drain and metric decay.
const SETTLE_LIMIT: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "kubesimd", about = "Kubernetes load-test and autoscaling simulator")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a scenario file.
    Validate {
        #[arg(long)]
        scenario: PathBuf,
    },

    /// Run the scenario's load test and print the report.
    Run {
        #[arg(long)]
        scenario: PathBuf,

        /// Pace ticks in wall-clock time instead of fast-forwarding.
        #[arg(long)]
        realtime: bool,

        /// Wall-clock milliseconds per tick in real-time mode.
        #[arg(long, default_value = "1000")]
        pace_ms: u64,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Print Prometheus gauges after the run settles.
        #[arg(long)]
        prometheus: bool,

        /// Snapshot store (redb file).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Save the settled cluster under this snapshot name.
        #[arg(long, requires = "store")]
        save: Option<String>,

        /// Run against a saved cluster instead of the scenario's resources.
        /// The scenario still supplies `[simulation]` and `[load_test]`.
        #[arg(long, requires = "store")]
        load: Option<String>,
    },

    /// List snapshots in a store, or delete one.
    Snapshots {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        delete: Option<String>,
    },
}

struct RunArgs {
    scenario: PathBuf,
    realtime: bool,
    pace: Duration,
    json: bool,
    prometheus: bool,
    store: Option<PathBuf>,
    save: Option<String>,
    load: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Validate { scenario } => validate(&scenario),
        Command::Run {
            scenario,
            realtime,
            pace_ms,
            json,
            prometheus,
            store,
            save,
            load,
        } => {
            run(RunArgs {
                scenario,
                realtime,
                pace: Duration::from_millis(pace_ms.max(1)),
                json,
                prometheus,
                store,
                save,
                load,
            })
            .await
        }
        Command::Snapshots { store, delete } => match delete {
            Some(name) => delete_snapshot(&store, &name),
            None => list_snapshots(&store),
        },
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kubesimd=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── validate ─────────────────────────────────────────────────────

fn validate(path: &Path) -> anyhow::Result<()> {
    let scenario = ScenarioFile::from_file(path)?;
    let sim = Simulation::from_scenario(&scenario)
        .with_context(|| format!("building {}", path.display()))?;

    let totals = sim.graph().totals();
    println!("scenario OK: {}", path.display());
    println!(
        "  {} clusters, {} nodes, {} services ({} pods)",
        totals.clusters,
        totals.nodes,
        sim.graph().services().count(),
        totals.pods
    );
    println!("  {} networking objects", sim.topology().len());
    match &scenario.load_test {
        Some(lt) => println!(
            "  load test: {} at {} rps for {}s ({})",
            lt.service, lt.target_rps, lt.duration_secs, lt.traffic_shape
        ),
        None => println!("  no [load_test] block"),
    }
    Ok(())
}

// ── run ──────────────────────────────────────────────────────────

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let scenario = ScenarioFile::from_file(&args.scenario)?;
    let entry = scenario
        .load_test
        .clone()
        .context("scenario has no [load_test] block")?;
    let store = args.store.as_deref().map(SnapshotStore::open).transpose()?;
    let mut sim = match (&store, &args.load) {
        (Some(store), Some(name)) => {
            let snapshot = store
                .get(name)?
                .with_context(|| format!("no snapshot named {name}"))?;
            info!(snapshot = %name, "snapshot loaded");
            Simulation::from_snapshot(scenario.simulation.clone(), snapshot)?
        }
        _ => Simulation::from_scenario(&scenario)?,
    };
    sim.start_from_entry(&entry)?;

    let (mut sim, report) = if args.realtime {
        run_realtime(sim, args.pace).await?
    } else {
        let report = sim
            .run_until_stopped(run_limit(&sim, &entry))
            .context("load test did not finish")?;
        (sim, report)
    };

    if !sim.settle(SETTLE_LIMIT) {
        warn!("cluster did not settle after the load test");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    if args.prometheus {
        print!("{}", sim.prometheus());
    }

    if let (Some(store), Some(name)) = (&store, &args.save) {
        store.put(name, &sim.snapshot())?;
        info!(snapshot = %name, "snapshot saved");
    }
    Ok(())
}

fn run_limit(sim: &Simulation, entry: &LoadTestEntry) -> Duration {
    let ticks = u32::try_from(entry.duration_secs.saturating_add(1)).unwrap_or(u32::MAX);
    sim.config().tick_interval().saturating_mul(ticks)
}

async fn run_realtime(sim: Simulation, pace: Duration) -> anyhow::Result<(Simulation, Report)> {
    let mut events = sim.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, join) = SimulationDriver::spawn(sim, pace, shutdown_rx);

    let report = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SimEvent::Tick(status)) => info!(%status, "load test progress"),
                Ok(SimEvent::RunStopped(report)) => break *report,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    bail!("simulation ended before the load test finished");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping load test");
                match handle.stop().await? {
                    Some(report) => break report,
                    None => bail!("no load test was running"),
                }
            }
        }
    };

    let _ = shutdown_tx.send(true);
    let sim = join.await?;
    Ok((sim, report))
}

// ── snapshots ────────────────────────────────────────────────────

fn list_snapshots(path: &Path) -> anyhow::Result<()> {
    let store = SnapshotStore::open(path)?;
    let names = store.list()?;
    if names.is_empty() {
        println!("no snapshots in {}", path.display());
        return Ok(());
    }
    for name in names {
        if let Some(snapshot) = store.get(&name)? {
            let totals = snapshot.graph.totals();
            println!(
                "{name}\tt={}s\t{} services\t{} pods",
                snapshot.saved_at_secs,
                snapshot.graph.services().count(),
                totals.pods
            );
        }
    }
    Ok(())
}

fn delete_snapshot(path: &Path, name: &str) -> anyhow::Result<()> {
    let store = SnapshotStore::open(path)?;
    if !store.delete(name)? {
        bail!("no snapshot named {name} in {}", path.display());
    }
    println!("deleted {name}");
    Ok(())
}
