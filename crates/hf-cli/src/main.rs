//! holdfast demo CLI -- drives a terminal session end to end against the
//! in-process loopback bridge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hf_bridge::LoopbackBridge;
use hf_core::{AgentId, Config};
use hf_session::{SessionOptions, TerminalSession};
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// holdfast CLI -- exercise the terminal session bridge.
#[derive(Parser)]
#[command(name = "hold", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command through a loopback session and print what comes back.
    Echo {
        /// Command text to execute.
        command: String,

        /// Agent identifier; generated when omitted.
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    hf_core::logging::init_logging("hold", "info");

    let cli = Cli::parse();
    let cfg = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Echo { command, agent } => {
            let agent_id =
                AgentId::new(agent.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
            info!(%agent_id, "opening loopback session");

            let bridge = Arc::new(LoopbackBridge::new());
            let session = TerminalSession::with_options(
                agent_id,
                bridge,
                SessionOptions::from_config(&cfg),
            );

            session.start().await.context("session connect failed")?;
            let outputs = session.outputs();
            session
                .execute_command(&command)
                .await
                .context("failed to send command")?;

            // Drain whatever the backend echoes until it goes quiet.
            while let Ok(Ok(text)) =
                tokio::time::timeout(Duration::from_millis(250), outputs.recv_async()).await
            {
                print!("{text}");
            }

            session.stop().await;
            info!(agent = session.agent_id().short(), "session closed");
        }
        Commands::Config => {
            println!("{}", cfg.to_toml().context("failed to render config")?);
        }
    }

    Ok(())
}
