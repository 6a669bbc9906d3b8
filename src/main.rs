//! Tradepost - live item trading server
//!
#![doc = "Main entry point for the Tradepost server and admin CLI."]

use anyhow::Result;

use tradepost::cli::{Cli, Commands};
use tradepost::commands;
use tradepost::config::Config;
use tradepost::logging::{bootstrap_subscriber, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; warnings go to STDERR until logging is configured
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        Config::load(config_path, &cli)
    })?;

    // Validate configuration
    config.validate()?;

    init_logging(&config.logging)?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting live trade server");
            commands::serve::run_serve(config).await
        }
        Commands::Users { command } => {
            let storage = commands::open_storage(&config)?;
            commands::users::handle_users(&storage, command)
        }
        Commands::Items { command } => {
            let storage = commands::open_storage(&config)?;
            commands::items::handle_items(&storage, command)
        }
        Commands::Inventory { command } => {
            let storage = commands::open_storage(&config)?;
            commands::inventory::handle_inventory(&storage, command)
        }
        Commands::Trades { command } => {
            let storage = commands::open_storage(&config)?;
            commands::trades::handle_trades(&storage, command)
        }
    }
}
