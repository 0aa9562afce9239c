//! CoCoChain simulator.
//!
//! Runs one scenario to completion and prints the aggregated report as JSON.

use anyhow::Context;
use clap::Parser;
use cocochain_sim::observability::{init_logging, LogFormat};
use cocochain_consensus::ConsensusMode;
use cocochain_sim::{ScenarioConfig, SimulationRunner};
use std::path::PathBuf;
use std::time::Duration;

/// CoCoChain - semantic BFT consensus for vehicular networks
#[derive(Parser, Debug)]
#[command(name = "cocochain-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML scenario file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the simulated duration, in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Vote without semantic verification, for comparison runs
    #[arg(long)]
    baseline: bool,

    /// Print Prometheus metrics after the report
    #[arg(long)]
    prometheus: bool,

    /// Print the resolved scenario as YAML and exit
    #[arg(long)]
    print_scenario: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(&args.log_level, format).context("failed to initialize logging")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting CoCoChain simulation");

    let mut scenario =
        ScenarioConfig::load(args.config.as_deref()).context("failed to load scenario")?;
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    if let Some(secs) = args.duration {
        scenario.duration =
            Duration::try_from_secs_f64(secs).context("duration must be a non-negative number")?;
    }

    if args.baseline {
        scenario.protocol.consensus_mode = ConsensusMode::Baseline;
    }

    if args.print_scenario {
        print!("{}", serde_yaml::to_string(&scenario)?);
        return Ok(());
    }

    let mut runner = SimulationRunner::new(scenario).context("failed to build simulation")?;
    runner.start();
    let report = runner.run();

    tracing::info!(
        finalized = report.originator_finalized,
        rejected = report.originator_rejected,
        false_positive_rate = report.false_positive_rate,
        handover_success_rate = report.handover_success_rate,
        "Simulation finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    if args.prometheus {
        let text = runner
            .exporter()
            .encode()
            .context("failed to encode metrics")?;
        print!("{text}");
    }
    Ok(())
}
