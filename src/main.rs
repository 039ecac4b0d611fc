//! `steward` - agent task orchestration server
//!
//! This binary hosts the task engine behind a WebSocket protocol surface
//! with a human-in-the-loop approval gate for risky tool calls.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use steward_core::card::AgentCard;
use steward_core::config::Config;

mod server;

#[derive(Parser)]
#[command(name = "steward", version, about = "Agent task orchestration server")]
struct Cli {
    /// Path to a YAML config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the protocol server (the default)
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the agent capability card as JSON and exit
    Card,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "steward=info,steward_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    match cli.command {
        Some(Commands::Card) => {
            let card = AgentCard::for_this_server(env!("CARGO_PKG_VERSION"));
            println!("{}", serde_json::to_string_pretty(&card)?);
            Ok(())
        }
        Some(Commands::Serve { port }) => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            server::start_server(config).await
        }
        None => server::start_server(config).await,
    }
}
