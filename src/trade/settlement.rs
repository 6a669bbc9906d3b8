//! Settlement of a mutually confirmed session

use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::storage::{InventoryStore, TradeRecord};
use crate::trade::error::SettlementError;
use crate::trade::session::LiveTradeSession;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns a confirmed session into an inventory transfer and a trade record
///
/// The transfer itself is delegated to [`InventoryStore::settle`], which
/// re-validates every line and applies all of them or none.
pub struct SettlementExecutor {
    store: Arc<dyn InventoryStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl SettlementExecutor {
    pub fn new(store: Arc<dyn InventoryStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    /// Settle `session`
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::EmptyTrade` if neither side offered anything,
    /// or whatever the store reports when its authoritative re-check fails.
    /// In every error case no inventory row has changed.
    pub async fn execute(&self, session: &LiveTradeSession) -> Result<TradeRecord, SettlementError> {
        let plan = session.settlement_plan();
        if plan.lines.is_empty() {
            return Err(SettlementError::EmptyTrade);
        }

        match self.store.settle(plan).await {
            Ok(record) => {
                info!(
                    session_id = %session.id,
                    trade_id = record.id,
                    lines = record.lines.len(),
                    "Live trade settled"
                );
                self.notify_both(session, NotificationKind::TradeCompleted, |partner| {
                    format!("Your trade with {} completed", partner)
                })
                .await;
                Ok(record)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Live trade settlement failed");
                self.notify_both(session, NotificationKind::TradeFailed, |partner| {
                    format!("Your trade with {} could not be completed", partner)
                })
                .await;
                Err(e)
            }
        }
    }

    async fn notify_both<F>(&self, session: &LiveTradeSession, kind: NotificationKind, message: F)
    where
        F: Fn(&str) -> String,
    {
        for (user, partner) in [
            (&session.initiator, &session.target),
            (&session.target, &session.initiator),
        ] {
            let notification = Notification::new(user.user_id, kind, message(&partner.display_name));
            if let Err(e) = self.notifier.notify(notification).await {
                warn!(
                    user_id = user.user_id,
                    error = %e,
                    "Failed to deliver trade notification"
                );
            }
        }
    }
}
