//! LanSync - Local-network discovery and sync orchestrator
//!
//! This is the main entry point for the lansync command.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lansync::cli::{Cli, CliHandler};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut handler = CliHandler::new(cli.config)?;

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        handler.config().log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lansync={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "LanSync v{} ({}, built {})",
        lansync::VERSION,
        lansync::TARGET,
        lansync::BUILD_DATE
    );

    handler.handle_command(cli.command).await?;

    Ok(())
}
