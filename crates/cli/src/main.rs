//! Ferrule CLI, the main entry point.
//!
//! Commands:
//! - `ask`            Run a single turn and print the answer
//! - `chat`           Interactive multi-turn session
//! - `tools`          List registered tools and their schemas
//! - `config`         Show the effective configuration
//! - `check-command`  Dry-run the command validator
//! - `check-path`     Dry-run the path validator
//! - `check-url`      Dry-run the URL validator

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "ferrule",
    about = "Ferrule: tool-augmented LLM request orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Read configuration from this file instead of ~/.ferrule/config.toml
    #[arg(long, global = true, env = "FERRULE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the answer
    Ask {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Print the full response envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive session
    Chat,

    /// List the registered tools
    Tools,

    /// Show the effective configuration (secrets redacted)
    Config,

    /// Check whether a shell command would be allowed
    CheckCommand {
        /// The full command line
        command: String,
    },

    /// Check whether a path would be allowed
    CheckPath {
        path: String,
    },

    /// Check whether a URL would be allowed
    CheckUrl {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `ask --json` output stays clean.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask { message, json } => commands::ask::run(&config, message, json).await?,
        Commands::Chat => commands::chat::run(&config).await?,
        Commands::Tools => commands::tools::run(&config)?,
        Commands::Config => commands::config_cmd::run(&config, cli.config.as_deref()),
        Commands::CheckCommand { command } => commands::check::command(&config, &command)?,
        Commands::CheckPath { path } => commands::check::path(&config, &path)?,
        Commands::CheckUrl { url } => commands::check::url(&config, &url)?,
    }

    Ok(())
}
