//! Docent CLI
//!
//! Main entry point for the docent command-line tool.
//! Answers questions from a document collection, with optional
//! web augmentation.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, StatsCommand, StoresCommand, UploadCommand};
use docent_core::{config::AppConfig, logging};
use std::path::PathBuf;

/// Docent CLI - document-grounded question answering
#[derive(Parser, Debug)]
#[command(name = "docent")]
#[command(about = "Document-grounded question answering with web augmentation", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DOCENT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DOCENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question against the document stores
    Ask(AskCommand),

    /// Document store provisioning and inspection
    Stores(StoresCommand),

    /// Upload a document into a store
    Upload(UploadCommand),

    /// Show cache statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Docent CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Retrieval model: {}", config.pipeline.retrieval_model);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Stores(_) => "stores",
        Commands::Upload(_) => "upload",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Stores(cmd) => cmd.execute(&config).await,
        Commands::Upload(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result.map_err(Into::into)
}
