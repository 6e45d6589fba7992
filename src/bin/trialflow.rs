//! trialflow - fetch, anonymize and reshape one experiment version
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin trialflow -- run 1.3
//! cargo run --release --bin trialflow -- run --nofetch
//! ```
//!
//! Without a version argument the one in the experiment config file
//! (`TRIALFLOW_EXPERIMENT_CONFIG`, default config.txt) is used. See
//! [`trialflow::config`] for the environment variables.
//!
//! - RUST_LOG - Logging level (optional, default: info)

use clap::{Args, Parser, Subcommand};
use trialflow::{Config, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "trialflow")]
#[command(about = "Fetch psiTurk participant data and reshape it for analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch, anonymize and reshape one experiment version
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Experiment code version to fetch
    version: Option<String>,

    /// Reshape the raw exports already on disk instead of fetching
    #[arg(long)]
    nofetch: bool,

    /// Keep debug sessions
    #[arg(long)]
    debug: bool,
}

/// Stderr logger filtered by `filter_var`, `info` when unset.
fn logger(filter_var: &'static str) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().filter_or(filter_var, "info"));
    builder.target(env_logger::Target::Stderr);
    builder
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env first so RUST_LOG from it reaches the logger
    dotenv::dotenv().ok();
    logger("RUST_LOG").init();

    let Command::Run(args) = Cli::parse().command;
    let config = Config::from_env()?;
    let version = config.resolve_version(args.version)?;

    log::info!("🚀 Starting trialflow");
    log::info!("   Version: {}", version);
    log::info!("   Raw exports: {}", config.raw_dir(&version).display());
    log::info!("   Reshaped data: {}", config.reshaped_dir(&version).display());
    if args.debug {
        log::info!("   Including debug sessions");
    }

    let options = RunOptions {
        version,
        nofetch: args.nofetch,
        include_debug_sessions: args.debug,
    };

    let summary = trialflow::run(&config, &options)?;

    if let Some(report) = &summary.aggregation {
        log::info!(
            "📦 Fetched {} records, {} completed, {} debug sessions dropped, {} extraction failures",
            report.fetched,
            report.completed,
            report.debug_dropped,
            report.failures.len()
        );
    }
    log::info!(
        "✅ Done: {} trial rows ({} skipped), {} participants, {} bonuses",
        summary.reshape.demux.rows_read,
        summary.reshape.demux.failures.len(),
        summary.reshape.participants,
        summary.reshape.bonuses
    );

    Ok(())
}
