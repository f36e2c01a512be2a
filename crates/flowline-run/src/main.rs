//! Flowline Run - executes a simulation setup from the command line.
//!
//! Loads a JSON setup, runs it to the requested stop condition, and
//! prints either a human-readable summary or the full result as JSON.

use clap::Parser;
use flowline_kernel::{Engine, RunResult, SimulationSetup, StopCondition};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "flowline-run")]
#[command(about = "Run a Flowline process simulation from a JSON setup")]
struct Cli {
    /// Path to a JSON simulation setup
    setup: PathBuf,

    /// Stop after this many steps
    #[arg(long, default_value = "1000", conflicts_with_all = ["until_time", "until_processed"])]
    steps: u64,

    /// Stop when virtual time reaches this value
    #[arg(long, conflicts_with = "until_processed")]
    until_time: Option<f64>,

    /// Stop after this many entities have been fully processed
    #[arg(long)]
    until_processed: Option<u64>,

    /// Print the full run result as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowline_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("loading setup from {}", cli.setup.display());
    let raw = match std::fs::read_to_string(&cli.setup) {
        Ok(raw) => raw,
        Err(e) => {
            error!("failed to read {}: {e}", cli.setup.display());
            std::process::exit(1);
        }
    };
    let setup: SimulationSetup = match serde_json::from_str(&raw) {
        Ok(setup) => setup,
        Err(e) => {
            error!("invalid setup file: {e}");
            std::process::exit(1);
        }
    };

    let stop = if let Some(t) = cli.until_time {
        StopCondition::UntilTime(t)
    } else if let Some(n) = cli.until_processed {
        StopCondition::UntilProcessed(n)
    } else {
        StopCondition::MaxSteps(cli.steps)
    };

    let mut engine = Engine::new();
    if let Err(e) = engine.setup(setup) {
        error!("setup failed: {e}");
        std::process::exit(1);
    }

    let result = match engine.run(stop) {
        Ok(result) => result,
        Err(e) => {
            error!("run failed: {e}");
            std::process::exit(1);
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                error!("failed to serialize result: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print_summary(&result);
    }
}

fn print_summary(result: &RunResult) {
    println!(
        "stopped after {} steps at t={:.3}: {}",
        result.steps_executed, result.final_time, result.completion_reason
    );
    println!(
        "entities processed: {}",
        result.final_state.entities_processed_total
    );
    for block in &result.final_state.blocks {
        println!(
            "  {:<20} holding {:>3}  processed {:>5}{}",
            block.id,
            block.entity_count,
            block.total_processed,
            block
                .status
                .as_deref()
                .map(|s| format!("  [{s}]"))
                .unwrap_or_default()
        );
    }
    if !result.log.is_empty() {
        println!("log:");
        for entry in &result.log {
            println!("  [{:>8.3}] {}: {}", entry.time, entry.block, entry.message);
        }
    }
    if !result.warnings.is_empty() {
        println!("warnings:");
        for w in &result.warnings {
            match w.line {
                Some(line) => println!("  [{:>8.3}] {} line {}: {}", w.time, w.block, line, w.message),
                None => println!("  [{:>8.3}] {}: {}", w.time, w.block, w.message),
            }
        }
    }
}
