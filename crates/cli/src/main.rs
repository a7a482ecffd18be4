//! SpurChat CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Start the HTTP chat server
//! - `chat`     — Talk to a running server from the terminal
//! - `history`  — Print a stored conversation
//! - `onboard`  — Write a default config
//! - `doctor`   — Diagnose configuration, store and provider

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "spurchat",
    about = "SpurChat — AI customer support chat for Spur Mart",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config.toml (defaults to ~/.spurchat/config.toml)
    #[arg(short, long, global = true, env = "SPURCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with a running server
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Forget the saved session and start a new conversation
        #[arg(long)]
        new: bool,

        /// Server base URL (defaults to the configured host and port)
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the stored history of a session
    History {
        /// The session id returned by the server
        session_id: String,

        /// Print JSON instead of a transcript
        #[arg(long)]
        json: bool,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat { message, new, url } => {
            commands::chat::run(config_path, message, new, url).await?
        }
        Commands::History { session_id, json } => {
            commands::history::run(config_path, &session_id, json).await?
        }
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
