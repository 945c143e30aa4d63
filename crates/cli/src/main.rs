//! Bastion CLI
//!
//! Main entry point for the bastion command-line tool.
//! Answers security questions through the guarded retrieval pipeline.

mod commands;

use bastion_core::logging::{self, LogFormat};
use bastion_core::{config::AppConfig, AppError, AppResult};
use clap::{Parser, Subcommand};
use commands::{AskCommand, BatchCommand, PromptsCommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Bastion - guarded answers to security questions
#[derive(Parser, Debug)]
#[command(name = "bastion")]
#[command(about = "Guarded security-question answering over a document corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "BASTION_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "BASTION_CONFIG")]
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

    /// Log line format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// API prefix of the search and dialogue services
    #[arg(long, global = true, env = "BASTION_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask one question
    Ask(AskCommand),

    /// Answer every question in a file, one JSON line per result
    Batch(BatchCommand),

    /// List available prompt definitions
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            eprintln!("error: {}", e.user_message());
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 2 when the caller can fix the request, 1 otherwise.
fn exit_status(error: &AppError) -> u8 {
    if error.is_user_correctable() {
        2
    } else {
        1
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    // Defaults, then YAML, then environment
    let config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.base_url,
        cli.log_level,
        cli.log_format,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(
        config.log_level.as_deref(),
        config.no_color,
        LogFormat::parse(&config.log_format),
    )?;

    tracing::info!("Bastion CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Service: {}", config.service.base_url);
    tracing::debug!("Dialogue provider: {}", config.dialogue.provider);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Batch(_) => "batch",
        Commands::Prompts(_) => "prompts",
    };
    let span = tracing::info_span!("command", name = command_name);
    let _guard = span.enter();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Batch(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config),
    };

    if result.is_ok() {
        tracing::info!("Command completed successfully");
    }

    result
}
