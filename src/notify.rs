//! Best-effort notification delivery
//!
//! Trade lifecycle events are pushed to a [`NotificationSink`] so users who are
//! not looking at the trade window still learn about them. Delivery failures
//! are logged by the caller and never affect trade state.

use crate::error::Result;
use crate::storage::{SqliteStorage, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Category of a trade notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TradeInvite,
    TradeCompleted,
    TradeFailed,
    TradeCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TradeInvite => "trade_invite",
            NotificationKind::TradeCompleted => "trade_completed",
            NotificationKind::TradeFailed => "trade_failed",
            NotificationKind::TradeCancelled => "trade_cancelled",
        }
    }
}

/// A message addressed to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(user_id: UserId, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
        }
    }
}

/// Destination for trade notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Sink that only writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            user_id = notification.user_id,
            kind = notification.kind.as_str(),
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SqliteStorage {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || {
            storage.insert_notification(
                notification.user_id,
                notification.kind.as_str(),
                &notification.message,
            )
        })
        .await??;
        Ok(())
    }
}
