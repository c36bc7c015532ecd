//! CLI module — command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod common;
pub mod gateway;
pub mod status;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use maru::config::Config;

#[derive(Parser)]
#[command(name = "maru")]
#[command(version)]
#[command(about = "Lightweight personal AI assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive agent mode
    Agent {
        /// Direct message to process (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
        /// Session key for conversation history
        #[arg(long, default_value = "cli:direct")]
        session: String,
    },
    /// Start the gateway (webhook server + agent loop)
    Gateway,
    /// Show system status
    Status,
    /// Show version information
    Version,
}

/// Initialize the global tracing subscriber.
///
/// Falls back to `RUST_LOG`; if unset, info level.
fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

/// Entry point for the CLI — called from main().
pub async fn run() -> Result<()> {
    // .env is optional; API keys are often provided this way in development.
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Agent { message, session }) => {
            Config::init().with_context(|| "Failed to load configuration")?;
            agent::cmd_agent(message, session).await?;
        }
        Some(Commands::Gateway) => {
            Config::init().with_context(|| "Failed to load configuration")?;
            gateway::cmd_gateway().await?;
        }
        Some(Commands::Status) => {
            Config::init().with_context(|| "Failed to load configuration")?;
            status::cmd_status().await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("maru {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Lightweight personal AI assistant");
}
