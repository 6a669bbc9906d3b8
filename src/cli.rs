//! Command-line interface definition for Tradepost
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the `serve` command plus small catalog and inventory
//! administration commands used to seed and inspect the database.

use clap::{Parser, Subcommand};

/// Tradepost - live item trading server
///
/// Runs the WebSocket negotiation server and manages the item catalog,
/// user inventories, and completed trade records.
#[derive(Parser, Debug, Clone)]
#[command(name = "tradepost")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the SQLite database path
    #[arg(long, env = "TRADEPOST_DB_PATH")]
    pub db_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Tradepost
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the live trade WebSocket server
    Serve {
        /// Address to bind, overrides `server.bind_addr`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Manage users
    Users {
        /// User management subcommand
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Manage the item catalog
    Items {
        /// Item management subcommand
        #[command(subcommand)]
        command: ItemCommand,
    },

    /// Inspect and seed user inventories
    Inventory {
        /// Inventory subcommand
        #[command(subcommand)]
        command: InventoryCommand,
    },

    /// Inspect completed trades
    Trades {
        /// Trade history subcommand
        #[command(subcommand)]
        command: TradeCommand,
    },
}

/// User management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Create a user
    Add {
        /// Display name for the user
        #[arg(short, long)]
        username: String,
    },
}

/// Item catalog subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ItemCommand {
    /// Add an item to the catalog
    Add {
        /// Item display name
        #[arg(short, long)]
        name: String,

        /// Mark the item as not tradeable
        #[arg(long)]
        untradeable: bool,
    },

    /// List catalog items
    List,
}

/// Inventory subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum InventoryCommand {
    /// Grant a quantity of an item to a user
    Grant {
        /// Receiving user id
        #[arg(short, long)]
        user: i64,

        /// Item id
        #[arg(short, long)]
        item: i64,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
    },

    /// Show a user's inventory
    Show {
        /// User id
        #[arg(short, long)]
        user: i64,
    },
}

/// Trade history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum TradeCommand {
    /// List completed trades, newest first
    List {
        /// Only trades involving this user
        #[arg(short, long)]
        user: Option<i64>,

        /// Maximum number of trades to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
