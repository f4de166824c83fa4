//! Grounded CLI
//!
//! Main entry point for the grounded command-line tool: ingest documents
//! into a local collection and ask cited questions about them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, IngestCommand, ResetCommand, StatusCommand};
use grounded_core::{config::AppConfig, logging, LogFormat};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Grounded - answer questions from your own documents, with citations
#[derive(Parser, Debug)]
#[command(name = "grounded")]
#[command(about = "Answer questions from your own documents, with citations", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "GROUNDED_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "GROUNDED_CONFIG")]
    config: Option<PathBuf>,

    /// Collection to operate on
    #[arg(long, global = true, env = "GROUNDED_COLLECTION")]
    collection: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed and index documents
    Ingest(IngestCommand),

    /// Ask a question about the indexed documents
    Ask(AskCommand),

    /// Show collection status
    Status(StatusCommand),

    /// Remove every entry from the collection
    Reset(ResetCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Workspace and config file decide which config.yaml is merged, so they
    // are resolved before loading rather than applied as overrides after it
    let workspace = cli.workspace.map(|p| p.to_string_lossy().to_string());
    let config_file = cli.config.map(|p| p.to_string_lossy().to_string());
    let config = AppConfig::load_with(|key| match key {
        "GROUNDED_WORKSPACE" => workspace.clone(),
        "GROUNDED_CONFIG" => config_file.clone(),
        _ => std::env::var(key).ok(),
    })?
    .with_overrides(
        None,
        None,
        cli.collection,
        cli.log_level,
        cli.log_format,
        cli.verbose,
        cli.no_color,
    );
    config.validate()?;

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("Grounded CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Collection: {}", config.collection);

    config.ensure_state_dir()?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Ask(_) => "ask",
        Commands::Status(_) => "status",
        Commands::Reset(_) => "reset",
    };
    let span = tracing::info_span!("command", name = command_name, collection = %config.collection);
    let result = async {
        match cli.command {
            Commands::Ingest(cmd) => cmd.execute(&config, &cancel).await,
            Commands::Ask(cmd) => cmd.execute(&config, &cancel).await,
            Commands::Status(cmd) => cmd.execute(&config),
            Commands::Reset(cmd) => cmd.execute(&config),
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
