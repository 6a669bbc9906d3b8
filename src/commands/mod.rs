/*!
Command handlers for the CLI

- `serve`     : Run the live trade WebSocket server
- `users`     : Create users
- `items`     : Manage the item catalog
- `inventory` : Seed and inspect inventories
- `trades`    : Inspect completed trades
*/

use crate::config::Config;
use crate::error::Result;
use crate::storage::SqliteStorage;

pub mod inventory;
pub mod items;
pub mod trades;
pub mod users;

/// Open the database configured in `storage.db_path`, or the default location
pub fn open_storage(config: &Config) -> Result<SqliteStorage> {
    match &config.storage.db_path {
        Some(path) => SqliteStorage::new_with_path(path),
        None => SqliteStorage::new(),
    }
}

pub mod serve {
    //! Live trade server command

    use super::*;
    use crate::server;
    use crate::telemetry;

    /// Start the server and block until shutdown
    pub async fn run_serve(config: Config) -> Result<()> {
        let storage = open_storage(&config)?;
        tracing::info!("Using database {}", storage.db_path().display());
        telemetry::init_metrics_exporter();
        server::run(&config, storage).await
    }
}
