//! ilearn - semantic memory and rule store for conversational agents
//!
//! Main entry point for the ilearn CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod commands;

use commands::{config, maintenance, memories, rules};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// ilearn - semantic memory and rule store for conversational agents
#[derive(Parser)]
#[command(name = "ilearn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this config file instead of discovering one
    #[arg(long, global = true, env = "ILEARN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interaction memories
    Memories(memories::MemoriesArgs),

    /// Behavioral rules
    Rules(rules::RulesArgs),

    /// Re-embed every record and rebuild the indexes
    Reindex,

    /// Show collection sizes and configuration
    Stats,

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ilearn_config::load_explicit(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ilearn_config::load_config(None)?,
    };

    // Console (human-readable, stderr) + rotating JSON file
    let _guard = init_tracing(cli.verbose, &loaded.config);
    for warning in &loaded.warnings {
        warn!("{warning}");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        loaded,
        cancel,
    };

    match cli.command {
        Commands::Memories(args) => memories::run(args, &ctx).await,
        Commands::Rules(args) => rules::run(args, &ctx).await,
        Commands::Reindex => maintenance::reindex(&ctx).await,
        Commands::Stats => maintenance::stats(&ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

fn init_tracing(
    verbose: bool,
    config: &ilearn_config::IlearnConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "ilearn=debug,ilearn_memory=debug,ilearn_embed=debug,ilearn_config=debug,info"
    } else {
        "ilearn=warn,ilearn_memory=warn,ilearn_embed=warn,ilearn_config=warn,error"
    };
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    let logging = config.logging.clone().unwrap_or_default();
    let log_dir = logging.dir.or_else(|| {
        ilearn_config::user_config_dir().map(|d| d.join("logs"))
    });

    match log_dir.filter(|_| logging.file) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "ilearn.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(tracing_subscriber::EnvFilter::new(
                            "ilearn=trace,ilearn_memory=trace,ilearn_embed=trace,ilearn_config=trace,info",
                        )),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console).init();
            None
        }
    }
}
