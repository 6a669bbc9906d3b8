//! Tradepost - live item trading server library
//!
//! Two connected users negotiate an item swap in real time and the agreed
//! swap is committed to SQLite in a single transaction.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `trade`: Negotiation engine, session state, connection registry, settlement
//! - `storage`: SQLite inventory, trade record and notification storage
//! - `notify`: Best-effort notification sinks
//! - `server`: axum WebSocket transport and health endpoint
//! - `config`: Configuration management and validation
//! - `logging`: tracing subscriber setup
//! - `telemetry`: Trade metrics
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tradepost::config::TradeConfig;
//! use tradepost::storage::SqliteStorage;
//! use tradepost::trade::{ConnectionRegistry, Dispatcher, NegotiationEngine};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = SqliteStorage::new_with_path("trade.db")?;
//! let engine = NegotiationEngine::new(
//!     Arc::new(ConnectionRegistry::new()),
//!     Arc::new(storage.clone()),
//!     Arc::new(storage),
//!     TradeConfig::default(),
//! );
//! let dispatcher = Dispatcher::new(Arc::new(engine));
//! let (_connection, _outbound) = dispatcher.connect(1, "alice");
//! dispatcher.handle_text(1, r#"{"type":"invite","target_user_id":2}"#).await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod trade;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TradepostError};
pub use storage::SqliteStorage;
pub use trade::{Dispatcher, NegotiationEngine, TradeError};
