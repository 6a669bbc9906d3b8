use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database identifier of a user
pub type UserId = i64;

/// Database identifier of a catalog item
pub type ItemId = i64;

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: UserId,
    /// Display name
    pub username: String,
}

/// Catalog entry for an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Unique identifier
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Whether the item may change hands
    pub tradeable: bool,
}

/// One row of a user's inventory, joined with the item name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item_id: ItemId,
    pub name: String,
    pub quantity: i64,
}

/// Which party gave up the item in a trade line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    /// Offered by the trade's sender (the live-trade initiator)
    Sender,
    /// Offered by the trade's receiver (the live-trade target)
    Receiver,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Sender => "sender",
            TradeSide::Receiver => "receiver",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sender" => Some(TradeSide::Sender),
            "receiver" => Some(TradeSide::Receiver),
            _ => None,
        }
    }
}

/// Lifecycle status of a persisted trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Completed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Completed => "Completed",
        }
    }
}

/// A single item movement within a trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLine {
    pub side: TradeSide,
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Immutable record of a settled trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unique identifier
    pub id: i64,
    /// User who initiated the trade
    pub sender_id: UserId,
    /// User who received the invite
    pub receiver_id: UserId,
    /// Always `Completed` for live trades
    pub status: TradeStatus,
    /// Set for trades negotiated in a live session
    pub is_live_trade: bool,
    /// Items moved, tagged by the side that gave them up
    pub lines: Vec<TradeLine>,
    /// When the trade was committed
    pub created_at: DateTime<Utc>,
}

/// Transfer instructions handed to the store at settlement time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub lines: Vec<TradeLine>,
}

/// A notification persisted for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: i64,
    pub user_id: UserId,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
