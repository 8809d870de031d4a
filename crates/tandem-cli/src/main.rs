use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Commands;

mod commands;
mod config;
mod logger;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = config::Cli::parse();

    match cli.command {
        Commands::Up { file, dependencies } => commands::up(file, dependencies).await,
        Commands::Down { file } => commands::down(file).await,
        Commands::Status { file } => commands::status(file).await,
        Commands::Uninstall { file, dependency } => commands::uninstall(file, dependency).await,
        Commands::Reclaim { port, grace_secs } => commands::reclaim(port, grace_secs).await,
    }
}
