//! Trade engine metrics
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line.
//!
//! # Metrics
//!
//! - `trade_sessions_created_total`: Counter of invites that created a session
//! - `trade_sessions_closed_total`: Counter of sessions closed, by reason
//! - `trade_active_sessions`: Gauge of sessions currently in the table
//! - `trade_settlements_total`: Counter of settlement attempts, by outcome
//! - `trade_commands_rejected_total`: Counter of rejected commands, by error kind

use metrics::{decrement_gauge, increment_counter, increment_gauge};

pub fn record_session_created() {
    increment_counter!("trade_sessions_created_total");
    increment_gauge!("trade_active_sessions", 1.0);
}

/// `reason` is one of completed, declined, cancelled, disconnected, expired
pub fn record_session_closed(reason: &'static str) {
    increment_counter!("trade_sessions_closed_total", "reason" => reason);
    decrement_gauge!("trade_active_sessions", 1.0);
}

pub fn record_settlement(outcome: &'static str) {
    increment_counter!("trade_settlements_total", "outcome" => outcome);
}

pub fn record_rejected(kind: &'static str) {
    increment_counter!("trade_commands_rejected_total", "kind" => kind);
}

/// Install the Prometheus exporter when built with the `prometheus` feature
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let _ = PrometheusBuilder::new().install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
