//! Lodestar CLI — terminal interface for the Lodestar research pipeline.
//!
//! `lodestar search` drives the full pipeline with interactive gates;
//! `lodestar research` runs only the research engine; `lodestar saved`
//! browses persisted results.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Lodestar: answer questions from your files and the web.
#[derive(Parser, Debug)]
#[command(name = "lodestar", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the full search pipeline for a query
    Search {
        /// The question to answer
        query: String,
        /// Skip all interactive gates (no file selection, no approval)
        #[arg(long)]
        no_interaction: bool,
        /// Save the result when the pipeline completes
        #[arg(long)]
        save: bool,
    },
    /// Run only the web research stage and print answer + references
    Research {
        /// The topic to research
        query: String,
        /// Model to use (unknown models fall back to the default)
        #[arg(short, long)]
        model: Option<String>,
        /// Fail hard instead of degrading to a placeholder
        #[arg(long)]
        force_real: bool,
    },
    /// Browse saved results
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SavedAction {
    /// List saved results, newest first
    List,
    /// Print one saved result in full
    Show { id: String },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the user config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr at the chosen verbosity, JSON file log with
    // full diagnostics. Raw internals go to the file, not the terminal.
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("io", "lodestar", "lodestar")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "lodestar.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let config = lodestar_core::load_config(cli.config.as_deref())?;
    for warning in config.validate() {
        tracing::warn!(warning = %warning, "Configuration warning");
    }

    match cli.command {
        Commands::Search {
            query,
            no_interaction,
            save,
        } => commands::run_search(&config, &query, no_interaction, save).await,
        Commands::Research {
            query,
            model,
            force_real,
        } => commands::run_research(&config, &query, model.as_deref(), force_real).await,
        Commands::Saved { action } => match action {
            SavedAction::List => commands::run_saved_list(&config),
            SavedAction::Show { id } => commands::run_saved_show(&config, &id),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::run_config_show(&config),
            ConfigAction::Path => commands::run_config_path(),
        },
    }
}
