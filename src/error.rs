//! Error types for Tradepost
//!
//! This module defines the application-level error type used by configuration,
//! storage plumbing, commands, and the server. Errors specific to a single trade
//! session live in [`crate::trade::error`].

use thiserror::Error;

/// Main error type for Tradepost operations
///
/// Covers failures that are not scoped to one trade session: configuration
/// loading, database access, transport setup, and serialization.
#[derive(Error, Debug)]
pub enum TradepostError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inventory or trade database errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// WebSocket/transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Tradepost operations
///
/// Uses `anyhow::Error` so callers can attach context while propagating.
pub type Result<T> = anyhow::Result<T>;
