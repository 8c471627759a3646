use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resilience_config::load_config;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::backoff::{cmd_backoff, BackoffArgs};
use cli::classify::{cmd_classify, ClassifyArgs};
use cli::config::{cmd_config, ConfigArgs};
use cli::OutputFormat;

/// Resilience engine tooling: classify failures, inspect retry schedules and configuration
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an error message and print the diagnostic report
    Classify(ClassifyArgs),

    /// Print the retry delay schedule for a policy
    Backoff(BackoffArgs),

    /// Print the effective configuration after file and environment overlays
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.debug, cli.json_logs) {
        eprintln!("{e:#}");
        std::process::exit(2);
    }

    if let Err(e) = run(cli) {
        error!("Command failed: {:#}", e);
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("configuration loaded: {:?}", config.provenance);

    match cli.command {
        Commands::Classify(args) => cmd_classify(args, &config, cli.output),
        Commands::Backoff(args) => cmd_backoff(args, &config, cli.output),
        Commands::Config(args) => cmd_config(args, &config, cli.output),
    }
}

fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
