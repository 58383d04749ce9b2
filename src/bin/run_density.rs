//! run_density - Race course density analysis CLI.
//!
//! Loads runner pace/start data, segment geometry, an event calendar, and a
//! rulebook, then runs one pipeline execution and writes its artifacts to
//! an output directory.

use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use racecourse_density::config::{ReportingConfigFile, RunConfig};
use racecourse_density::pipeline::{self, RunInputs};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Race course density analysis CLI.
#[derive(Parser)]
#[command(name = "run_density", about = "Race course density analysis", version)]
struct Args {
    /// Path to the runners CSV (event, runner_id, pace_min_per_km, start_offset_s).
    #[arg(long)]
    runners: PathBuf,

    /// Path to the segments CSV (geometry, width, per-event presence).
    #[arg(long)]
    segments: PathBuf,

    /// Path to the event calendar YAML (start_time, duration_min per event).
    #[arg(long)]
    events: PathBuf,

    /// Path to the rulebook YAML (LOS bands, triggers, schema bindings).
    #[arg(long)]
    rulebook: PathBuf,

    /// Optional reporting-config YAML overriding min_los_flag/utilization_pctile/require_min_bin_len_m.
    #[arg(long)]
    reporting_config: Option<PathBuf>,

    /// Directory this run's artifacts are written to. Created if missing.
    #[arg(long, default_value = "./runs/current")]
    run_dir: PathBuf,

    /// Directory holding the cross-run latest.json/index.json pointers.
    #[arg(long, default_value = "./runs")]
    index_dir: PathBuf,

    /// Floor bin_size_km toward 0.2 up front, for constrained environments.
    #[arg(long)]
    deploy_mode: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("run_density={}", level).parse().unwrap())
        .add_directive(format!("racecourse_density={}", level).parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Derives a run id from the current instant. No UUID dependency: the
/// timestamp is unique enough for a single-daemon, single-host run cadence.
fn generate_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

fn load_reporting_config(path: &PathBuf) -> anyhow::Result<ReportingConfigFile> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("run_density {} starting", env!("CARGO_PKG_VERSION"));

    let mut cfg = RunConfig { deploy_mode: args.deploy_mode, ..RunConfig::default() };
    if let Some(path) = &args.reporting_config {
        let reporting = load_reporting_config(path)?;
        cfg.apply_reporting_config(&reporting);
        info!(path = %path.display(), "applied reporting config");
    }

    let inputs = RunInputs {
        runners_path: args.runners,
        segments_path: args.segments,
        events_path: args.events,
        rulebook_path: args.rulebook,
    };

    let run_id = generate_run_id();
    let started_at_iso = Utc::now().to_rfc3339();

    info!(run_id = %run_id, run_dir = %args.run_dir.display(), "starting run");

    match pipeline::execute_run(&inputs, cfg, &args.run_dir, &args.index_dir, run_id.clone(), started_at_iso) {
        Ok(status) => {
            info!(run_id = %run_id, status = ?status, "run finished");
            Ok(())
        }
        Err(e) => {
            error!(run_id = %run_id, error = %e, "run failed");
            Err(e.into())
        }
    }
}
