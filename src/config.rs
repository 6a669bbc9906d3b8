//! Configuration management for Tradepost
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, TradepostError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Tradepost
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Live trade negotiation policy
    #[serde(default)]
    pub trade: TradeConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (host:port)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite database path; the platform data directory is used when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Live trade session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Seconds an unanswered invite may stay pending before eviction
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_seconds: u64,

    /// Seconds an active session may stay idle before eviction (None = never)
    #[serde(default)]
    pub active_ttl_seconds: Option<u64>,

    /// How often the stale-session sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Maximum number of offer lines per side
    #[serde(default = "default_max_items_per_side")]
    pub max_items_per_side: usize,

    /// Merge repeated adds of the same item into one offer line
    #[serde(default)]
    pub merge_duplicate_items: bool,
}

/// Upper bound for every trade timer setting (one year)
pub const MAX_TIMER_SECONDS: u64 = 365 * 24 * 60 * 60;

fn default_pending_ttl() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_max_items_per_side() -> usize {
    32
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            pending_ttl_seconds: default_pending_ttl(),
            active_ttl_seconds: None,
            sweep_interval_seconds: default_sweep_interval(),
            max_items_per_side: default_max_items_per_side(),
            merge_duplicate_items: false,
        }
    }
}

impl TradeConfig {
    /// Pending invite lifetime as a duration
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_seconds)
    }

    /// Active session idle lifetime, if bounded
    pub fn active_ttl(&self) -> Option<Duration> {
        self.active_ttl_seconds.map(Duration::from_secs)
    }

    /// Sweeper period as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,

    /// Log file path (if None, STDOUT only)
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "tradepost=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TradepostError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TradepostError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind_addr) = std::env::var("TRADEPOST_BIND_ADDR") {
            self.server.bind_addr = bind_addr;
        }

        if let Ok(db_path) = std::env::var("TRADEPOST_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(db_path));
        }

        if let Ok(ttl) = std::env::var("TRADEPOST_PENDING_TTL_SECONDS") {
            match ttl.parse() {
                Ok(v) => self.trade.pending_ttl_seconds = v,
                Err(_) => tracing::warn!("Ignoring invalid TRADEPOST_PENDING_TTL_SECONDS: {}", ttl),
            }
        }

        if let Ok(interval) = std::env::var("TRADEPOST_SWEEP_INTERVAL_SECONDS") {
            match interval.parse() {
                Ok(v) => self.trade.sweep_interval_seconds = v,
                Err(_) => {
                    tracing::warn!(
                        "Ignoring invalid TRADEPOST_SWEEP_INTERVAL_SECONDS: {}",
                        interval
                    )
                }
            }
        }

        if let Ok(max_items) = std::env::var("TRADEPOST_MAX_ITEMS_PER_SIDE") {
            match max_items.parse() {
                Ok(v) => self.trade.max_items_per_side = v,
                Err(_) => {
                    tracing::warn!("Ignoring invalid TRADEPOST_MAX_ITEMS_PER_SIDE: {}", max_items)
                }
            }
        }

        if let Ok(merge) = std::env::var("TRADEPOST_MERGE_DUPLICATE_ITEMS") {
            self.trade.merge_duplicate_items = parse_bool(&merge);
        }

        if let Ok(level) = std::env::var("TRADEPOST_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("TRADEPOST_JSON_LOGS") {
            self.logging.json_format = parse_bool(&json_logs);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(db_path) = &cli.db_path {
            self.storage.db_path = Some(PathBuf::from(db_path));
        }

        if let crate::cli::Commands::Serve {
            bind: Some(bind), ..
        } = &cli.command
        {
            self.server.bind_addr = bind.clone();
        }

        if cli.verbose {
            self.logging.level = "tradepost=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_addr.trim().is_empty() {
            return Err(
                TradepostError::Config("server.bind_addr cannot be empty".to_string()).into(),
            );
        }

        if self.trade.sweep_interval_seconds == 0 {
            return Err(TradepostError::Config(
                "trade.sweep_interval_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.trade.max_items_per_side == 0 {
            return Err(TradepostError::Config(
                "trade.max_items_per_side must be greater than 0".to_string(),
            )
            .into());
        }

        if self.trade.active_ttl_seconds == Some(0) {
            return Err(TradepostError::Config(
                "trade.active_ttl_seconds must be greater than 0 when set".to_string(),
            )
            .into());
        }

        let timers = [
            ("pending_ttl_seconds", Some(self.trade.pending_ttl_seconds)),
            ("active_ttl_seconds", self.trade.active_ttl_seconds),
            ("sweep_interval_seconds", Some(self.trade.sweep_interval_seconds)),
        ];
        for (name, value) in timers {
            if value.is_some_and(|v| v > MAX_TIMER_SECONDS) {
                return Err(TradepostError::Config(format!(
                    "trade.{} must be at most {}",
                    name, MAX_TIMER_SECONDS
                ))
                .into());
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
