//! Lapse - in-memory session store with TTL reclamation
//!
//! Main entry point for the Lapse CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

mod commands;

use commands::{config, demo, soak};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Lapse - in-memory session store with TTL reclamation
#[derive(Parser)]
#[command(name = "lapse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of discovering it
    #[arg(long, global = true, env = "LAPSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session TTL in seconds (overrides config)
    #[arg(long, global = true)]
    pub ttl_secs: Option<u64>,

    /// Reclaimer sweep interval in milliseconds (overrides config)
    #[arg(long, global = true)]
    pub sweep_interval_ms: Option<u64>,

    /// Also write JSON logs to daily rotated files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk a session through create, update, read and expiry
    Demo(demo::DemoArgs),

    /// Run a sustained workload and report reclaimer behaviour
    Soak(soak::SoakArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut lapse_config, sources, warnings) = match &cli.config {
        Some(path) => {
            let config = lapse_config::load_config_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (config, vec![path.clone()], Vec::new())
        }
        None => {
            let loaded = lapse_config::load_config(None)?;
            let sources = loaded
                .loaded_from()
                .into_iter()
                .map(|p| p.to_path_buf())
                .collect();
            (loaded.config, sources, loaded.warnings)
        }
    };

    // CLI flags override file layers
    let mut session = lapse_config.session();
    if let Some(ttl) = cli.ttl_secs {
        session.ttl_secs = ttl;
    }
    if let Some(interval) = cli.sweep_interval_ms {
        session.sweep_interval_ms = interval;
    }
    session.validate()?;
    lapse_config.session = Some(session);

    let mut logging = lapse_config.logging();
    if cli.log_dir.is_some() {
        logging.dir = cli.log_dir.clone();
    }
    let _guard = init_tracing(cli.verbose, &logging)?;
    lapse_config.logging = Some(logging);

    for warning in &warnings {
        warn!("{}", warning);
    }

    let ctx = commands::Context {
        config: lapse_config,
        sources,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Demo(args) => demo::run(args, &ctx).await,
        Commands::Soak(args) => soak::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Console (human-readable, stderr) plus optional rotating JSON file.
fn init_tracing(
    verbose: bool,
    logging: &lapse_config::LoggingConfig,
) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let console_filter = format!("lapse={level},lapse_session={level},lapse_config={level},warn");

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("lapse")
                .filename_suffix("log")
                .build(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("lapse=trace,lapse_session=trace,info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(console_filter)),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}
