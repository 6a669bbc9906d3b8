//! Live trade negotiation engine
//!
//! The engine is the only writer of the [`SessionTable`]. Each command locks
//! its session for the full duration of the command, validates against the
//! current state and the inventory store, mutates the session, and pushes the
//! resulting per-participant view through the [`ConnectionRegistry`].
//!
//! Validation failures are returned to the caller and leave the session
//! untouched. Settlement failures are broadcast to both participants and
//! clear both confirmations so the offer has to be confirmed again.

use crate::config::TradeConfig;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::storage::{InventoryStore, ItemId, UserId};
use crate::telemetry;
use crate::trade::error::TradeError;
use crate::trade::messages::ServerMessage;
use crate::trade::registry::ConnectionRegistry;
use crate::trade::session::{
    LiveTradeSession, OfferItem, Participant, Role, SessionId, SessionStatus,
};
use crate::trade::settlement::SettlementExecutor;
use crate::trade::table::SessionTable;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

type SessionGuard = OwnedMutexGuard<LiveTradeSession>;

/// Why a session left the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Completed,
    Declined,
    Cancelled,
    Disconnected,
    Expired,
}

impl CloseReason {
    fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::Declined => "declined",
            CloseReason::Cancelled => "cancelled",
            CloseReason::Disconnected => "disconnected",
            CloseReason::Expired => "expired",
        }
    }
}

pub struct NegotiationEngine {
    sessions: SessionTable,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn InventoryStore>,
    notifier: Arc<dyn NotificationSink>,
    settlement: SettlementExecutor,
    config: TradeConfig,
}

impl NegotiationEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn InventoryStore>,
        notifier: Arc<dyn NotificationSink>,
        config: TradeConfig,
    ) -> Self {
        let settlement = SettlementExecutor::new(store.clone(), notifier.clone());
        Self {
            sessions: SessionTable::new(),
            registry,
            store,
            notifier,
            settlement,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of pending and active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Copy of a live session's current state
    pub async fn snapshot(&self, session_id: &str) -> Option<LiveTradeSession> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.lock().await;
        if session.status.is_terminal() {
            None
        } else {
            Some(session.clone())
        }
    }

    /// Invite `target_id` to trade with `initiator_id`
    ///
    /// # Errors
    ///
    /// `SelfTrade` when both ids match, `TargetOffline` when the target has no
    /// registered connection. No session exists afterwards in either case.
    pub async fn invite(
        &self,
        initiator_id: UserId,
        target_id: UserId,
    ) -> Result<SessionId, TradeError> {
        if initiator_id == target_id {
            return Err(TradeError::SelfTrade);
        }

        let target_conn = self
            .registry
            .resolve(target_id)
            .filter(|c| !c.is_closed())
            .ok_or(TradeError::TargetOffline(target_id))?;
        let initiator_name = self
            .registry
            .resolve(initiator_id)
            .map(|c| c.display_name)
            .unwrap_or_else(|| format!("user-{}", initiator_id));

        let initiator = Participant::new(initiator_id, initiator_name);
        let target = Participant::new(target_id, target_conn.display_name);
        let session = LiveTradeSession::new(initiator.clone(), target.clone());
        let session_id = session.id.clone();
        self.sessions.insert(session);
        telemetry::record_session_created();

        info!(
            session_id = %session_id,
            initiator = initiator_id,
            target = target_id,
            "Trade invite sent"
        );

        self.registry.send(
            target_id,
            ServerMessage::InviteReceived {
                session_id: session_id.clone(),
                from_user: initiator.clone(),
            },
        );
        self.registry.send(
            initiator_id,
            ServerMessage::InviteSent {
                session_id: session_id.clone(),
                to_user: target,
            },
        );

        self.notify(Notification::new(
            target_id,
            NotificationKind::TradeInvite,
            format!("{} wants to trade with you", initiator.display_name),
        ))
        .await;

        Ok(session_id)
    }

    /// Target accepts a pending invite; the session becomes active
    pub async fn accept(&self, user_id: UserId, session_id: &str) -> Result<(), TradeError> {
        let mut session = self.lock_session(session_id).await?;
        Self::require_target(&session, user_id)?;
        Self::require_status(&session, SessionStatus::Pending)?;

        session.status = SessionStatus::Active;
        session.touch();
        info!(session_id = %session.id, "Trade session started");

        for role in [Role::Initiator, Role::Target] {
            let view = session.view_for(role);
            self.registry.send(
                session.participant(role).user_id,
                ServerMessage::SessionStarted {
                    session_id: session.id.clone(),
                    partner: session.participant(role.other()).clone(),
                    is_initiator: role == Role::Initiator,
                    your_items: view.your_items,
                    partner_items: view.partner_items,
                },
            );
        }
        Ok(())
    }

    /// Target declines a pending invite; the session is destroyed
    pub async fn decline(&self, user_id: UserId, session_id: &str) -> Result<(), TradeError> {
        let session = self.lock_session(session_id).await?;
        Self::require_target(&session, user_id)?;
        Self::require_status(&session, SessionStatus::Pending)?;

        let message = ServerMessage::InviteDeclined {
            session_id: session.id.clone(),
            reason: format!("{} declined your trade invite", session.target.display_name),
        };
        let initiator = session.initiator.user_id;
        self.close(session, CloseReason::Declined);
        self.registry.send(initiator, message);
        Ok(())
    }

    /// Add an item to the caller's side of the offer
    ///
    /// The ownership check here is advisory: it counts every line the caller
    /// already offers for the same item, but the inventory can still change
    /// before settlement re-checks it.
    pub async fn add_item(
        &self,
        user_id: UserId,
        session_id: &str,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<(), TradeError> {
        let mut session = self.lock_session(session_id).await?;
        let role = Self::require_participant(&session, user_id)?;
        Self::require_status(&session, SessionStatus::Active)?;

        if quantity <= 0 {
            return Err(TradeError::InvalidQuantity(quantity));
        }

        let merge = self.config.merge_duplicate_items;
        if session.needs_new_line(role, item_id, merge)
            && session.items(role).len() >= self.config.max_items_per_side
        {
            return Err(TradeError::OfferLimitReached(self.config.max_items_per_side));
        }

        let item = self
            .store
            .item(item_id)
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?
            .ok_or(TradeError::ItemNotFound(item_id))?;
        if !item.tradeable {
            return Err(TradeError::ItemNotTradeable(item_id));
        }

        let owned = self
            .store
            .quantity(user_id, item_id)
            .await
            .map_err(|e| TradeError::Storage(e.to_string()))?;
        let requested = session
            .offered_quantity(role, item_id)
            .checked_add(quantity)
            .ok_or(TradeError::InvalidQuantity(quantity))?;
        if owned < requested {
            return Err(TradeError::InsufficientQuantity {
                item_id,
                owned,
                requested,
            });
        }

        let line = OfferItem {
            item_id,
            display_name: item.name,
            quantity,
        };
        if !session.add_item(role, line, merge) {
            return Err(TradeError::InvalidQuantity(quantity));
        }
        debug!(session_id = %session.id, user_id, item_id, quantity, "Item added to offer");
        self.broadcast_update(&session);
        Ok(())
    }

    /// Remove the caller's first offer line for `item_id`
    pub async fn remove_item(
        &self,
        user_id: UserId,
        session_id: &str,
        item_id: ItemId,
    ) -> Result<(), TradeError> {
        let mut session = self.lock_session(session_id).await?;
        let role = Self::require_participant(&session, user_id)?;
        Self::require_status(&session, SessionStatus::Active)?;

        session
            .remove_item(role, item_id)
            .ok_or(TradeError::ItemNotOffered(item_id))?;
        debug!(session_id = %session.id, user_id, item_id, "Item removed from offer");
        self.broadcast_update(&session);
        Ok(())
    }

    /// Confirm the current offer; settles once both sides have confirmed
    ///
    /// A failed settlement is not an error for the caller: both participants
    /// receive `session_failed` and the session stays active, unconfirmed.
    pub async fn confirm(&self, user_id: UserId, session_id: &str) -> Result<(), TradeError> {
        let mut session = self.lock_session(session_id).await?;
        let role = Self::require_participant(&session, user_id)?;
        Self::require_status(&session, SessionStatus::Active)?;

        if !session.confirm(role) {
            self.broadcast_update(&session);
            return Ok(());
        }

        info!(session_id = %session.id, "Both sides confirmed, settling");
        match self.settlement.execute(&session).await {
            Ok(record) => {
                telemetry::record_settlement("completed");
                let message = ServerMessage::SessionCompleted {
                    session_id: session.id.clone(),
                    trade_id: record.id,
                };
                let users = [session.initiator.user_id, session.target.user_id];
                self.close(session, CloseReason::Completed);
                for user in users {
                    self.registry.send(user, message.clone());
                }
            }
            Err(e) => {
                telemetry::record_settlement("failed");
                session.reset_confirmations();
                session.touch();
                let message = ServerMessage::SessionFailed {
                    session_id: session.id.clone(),
                    reason: e.to_string(),
                };
                for user in [session.initiator.user_id, session.target.user_id] {
                    self.registry.send(user, message.clone());
                }
                self.broadcast_update(&session);
            }
        }
        Ok(())
    }

    /// Either participant abandons the session, pending or active
    pub async fn cancel(&self, user_id: UserId, session_id: &str) -> Result<(), TradeError> {
        let session = self.lock_session(session_id).await?;
        Self::require_participant(&session, user_id)?;
        self.cancel_locked(session, Some(user_id), CloseReason::Cancelled)
            .await;
        Ok(())
    }

    /// Cancel every session `user_id` takes part in, on their behalf
    ///
    /// Returns the number of sessions cancelled.
    pub async fn handle_disconnect(&self, user_id: UserId) -> usize {
        let mut cancelled = 0;
        for (id, handle) in self.sessions.sessions_for(user_id) {
            let session = handle.lock_owned().await;
            if session.status.is_terminal() {
                continue;
            }
            debug!(session_id = %id, user_id, "Cancelling session after disconnect");
            self.cancel_locked(session, Some(user_id), CloseReason::Disconnected)
                .await;
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(user_id, cancelled, "Cancelled sessions of disconnected user");
        }
        cancelled
    }

    /// Cancel pending invites older than the pending TTL and, when an active
    /// TTL is configured, active sessions idle for longer than it
    ///
    /// Returns the number of sessions evicted.
    pub async fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        // A TTL too large for chrono never expires.
        let pending_ttl = chrono::Duration::from_std(self.config.pending_ttl()).ok();
        let active_ttl = self
            .config
            .active_ttl()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok());

        let mut evicted = 0;
        for (_, handle) in self.sessions.all() {
            let session = handle.lock_owned().await;
            let stale = match session.status {
                SessionStatus::Pending => {
                    pending_ttl.is_some_and(|ttl| now - session.created_at >= ttl)
                }
                SessionStatus::Active => active_ttl.is_some_and(|ttl| now - session.updated_at >= ttl),
                _ => false,
            };
            if stale {
                debug!(session_id = %session.id, status = session.status.as_str(), "Evicting stale session");
                self.cancel_locked(session, None, CloseReason::Expired).await;
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "Evicted stale trade sessions");
        }
        evicted
    }

    async fn lock_session(&self, session_id: &str) -> Result<SessionGuard, TradeError> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| TradeError::SessionNotFound(session_id.to_string()))?;
        let session = handle.lock_owned().await;
        // A command queued behind the one that ended the session lands here.
        if session.status.is_terminal() {
            return Err(TradeError::SessionNotFound(session_id.to_string()));
        }
        Ok(session)
    }

    fn require_participant(session: &LiveTradeSession, user_id: UserId) -> Result<Role, TradeError> {
        session.role_of(user_id).ok_or(TradeError::NotParticipant)
    }

    fn require_target(session: &LiveTradeSession, user_id: UserId) -> Result<(), TradeError> {
        match session.role_of(user_id) {
            Some(Role::Target) => Ok(()),
            Some(Role::Initiator) => Err(TradeError::NotInviteTarget),
            None => Err(TradeError::NotParticipant),
        }
    }

    fn require_status(session: &LiveTradeSession, expected: SessionStatus) -> Result<(), TradeError> {
        if session.status == expected {
            Ok(())
        } else {
            Err(TradeError::InvalidState {
                expected: expected.as_str(),
                actual: session.status.as_str(),
            })
        }
    }

    async fn cancel_locked(
        &self,
        session: SessionGuard,
        by_user: Option<UserId>,
        reason: CloseReason,
    ) {
        let message = ServerMessage::SessionCancelled {
            session_id: session.id.clone(),
            by_user,
        };
        let participants = [session.initiator.clone(), session.target.clone()];
        self.close(session, reason);

        for participant in &participants {
            self.registry.send(participant.user_id, message.clone());
        }

        for (user, partner) in [
            (&participants[0], &participants[1]),
            (&participants[1], &participants[0]),
        ] {
            if by_user == Some(user.user_id) {
                continue;
            }
            self.notify(Notification::new(
                user.user_id,
                NotificationKind::TradeCancelled,
                format!("Your trade with {} was cancelled", partner.display_name),
            ))
            .await;
        }
    }

    /// Mark the session terminal and drop it from the table
    ///
    /// Commands already waiting on the session lock will see the terminal
    /// status and fail with `SessionNotFound`.
    fn close(&self, mut session: SessionGuard, reason: CloseReason) {
        session.status = match reason {
            CloseReason::Completed => SessionStatus::Completed,
            _ => SessionStatus::Cancelled,
        };
        self.sessions.remove(&session.id);
        telemetry::record_session_closed(reason.as_str());
        info!(session_id = %session.id, reason = reason.as_str(), "Trade session closed");
    }

    fn broadcast_update(&self, session: &LiveTradeSession) {
        for role in [Role::Initiator, Role::Target] {
            self.registry.send(
                session.participant(role).user_id,
                ServerMessage::SessionUpdate(session.view_for(role)),
            );
        }
    }

    async fn notify(&self, notification: Notification) {
        let user_id = notification.user_id;
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(user_id, error = %e, "Failed to deliver trade notification");
        }
    }
}
