//! Errors raised while negotiating or settling a live trade

use crate::storage::{ItemId, UserId};
use thiserror::Error;

/// A command was rejected before any session state changed
///
/// These are reported to the issuing client only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    #[error("Trade session not found: {0}")]
    SessionNotFound(String),

    #[error("You are not a participant in this trade")]
    NotParticipant,

    #[error("Only the invited user can respond to this invite")]
    NotInviteTarget,

    #[error("Trade session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("You cannot trade with yourself")]
    SelfTrade,

    #[error("User {0} is not online")]
    TargetOffline(UserId),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Item {0} does not exist")]
    ItemNotFound(ItemId),

    #[error("Item {0} cannot be traded")]
    ItemNotTradeable(ItemId),

    #[error("Insufficient quantity of item {item_id}: own {owned}, offered {requested}")]
    InsufficientQuantity {
        item_id: ItemId,
        owned: i64,
        requested: i64,
    },

    #[error("Item {0} is not in your offer")]
    ItemNotOffered(ItemId),

    #[error("Offer already holds the maximum of {0} items")]
    OfferLimitReached(usize),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TradeError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::SessionNotFound(_) => "session_not_found",
            TradeError::NotParticipant => "not_participant",
            TradeError::NotInviteTarget => "not_invite_target",
            TradeError::InvalidState { .. } => "invalid_state",
            TradeError::SelfTrade => "self_trade",
            TradeError::TargetOffline(_) => "target_offline",
            TradeError::InvalidQuantity(_) => "invalid_quantity",
            TradeError::ItemNotFound(_) => "item_not_found",
            TradeError::ItemNotTradeable(_) => "item_not_tradeable",
            TradeError::InsufficientQuantity { .. } => "insufficient_quantity",
            TradeError::ItemNotOffered(_) => "item_not_offered",
            TradeError::OfferLimitReached(_) => "offer_limit_reached",
            TradeError::Storage(_) => "storage",
        }
    }
}

/// Settlement aborted; no inventory rows were changed
///
/// These are reported to both participants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("User {user_id} no longer has enough of item {item_id} (owns {owned}, needs {requested})")]
    InsufficientQuantity {
        user_id: UserId,
        item_id: ItemId,
        owned: i64,
        requested: i64,
    },

    #[error("Item {0} can no longer be traded")]
    ItemNotTradeable(ItemId),

    #[error("Nothing to trade: both offers are empty")]
    EmptyTrade,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for SettlementError {
    fn from(err: rusqlite::Error) -> Self {
        SettlementError::Storage(err.to_string())
    }
}
