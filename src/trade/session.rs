//! In-memory state of one live trade negotiation

use crate::storage::{ItemId, SettlementPlan, TradeLine, TradeSide, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session identifier handed to clients
pub type SessionId = String;

/// One of the two users bound to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
}

impl Participant {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// A line in one side's offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItem {
    pub item_id: ItemId,
    pub display_name: String,
    pub quantity: i64,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Invite sent, not yet accepted
    Pending,
    /// Both users negotiating
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

/// Which side of the session a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Target,
}

impl Role {
    pub fn other(&self) -> Role {
        match self {
            Role::Initiator => Role::Target,
            Role::Target => Role::Initiator,
        }
    }
}

/// The offer as seen by one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub your_items: Vec<OfferItem>,
    pub partner_items: Vec<OfferItem>,
    pub your_confirmed: bool,
    pub partner_confirmed: bool,
}

/// A two-party barter being negotiated
///
/// Every change to either item list clears both confirmation flags, so a
/// confirmation always refers to the offer exactly as it was displayed.
#[derive(Debug, Clone)]
pub struct LiveTradeSession {
    pub id: SessionId,
    pub initiator: Participant,
    pub target: Participant,
    pub initiator_items: Vec<OfferItem>,
    pub target_items: Vec<OfferItem>,
    pub initiator_confirmed: bool,
    pub target_confirmed: bool,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveTradeSession {
    /// Create a pending session with a fresh id
    pub fn new(initiator: Participant, target: Participant) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            initiator,
            target,
            initiator_items: Vec::new(),
            target_items: Vec::new(),
            initiator_confirmed: false,
            target_confirmed: false,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Role of `user_id`, or None for outsiders
    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        if self.initiator.user_id == user_id {
            Some(Role::Initiator)
        } else if self.target.user_id == user_id {
            Some(Role::Target)
        } else {
            None
        }
    }

    pub fn participant(&self, role: Role) -> &Participant {
        match role {
            Role::Initiator => &self.initiator,
            Role::Target => &self.target,
        }
    }

    pub fn items(&self, role: Role) -> &[OfferItem] {
        match role {
            Role::Initiator => &self.initiator_items,
            Role::Target => &self.target_items,
        }
    }

    fn items_mut(&mut self, role: Role) -> &mut Vec<OfferItem> {
        match role {
            Role::Initiator => &mut self.initiator_items,
            Role::Target => &mut self.target_items,
        }
    }

    pub fn is_confirmed(&self, role: Role) -> bool {
        match role {
            Role::Initiator => self.initiator_confirmed,
            Role::Target => self.target_confirmed,
        }
    }

    pub fn both_confirmed(&self) -> bool {
        self.initiator_confirmed && self.target_confirmed
    }

    /// Mark `role` as confirmed; returns true when both sides now are
    pub fn confirm(&mut self, role: Role) -> bool {
        match role {
            Role::Initiator => self.initiator_confirmed = true,
            Role::Target => self.target_confirmed = true,
        }
        self.touch();
        self.both_confirmed()
    }

    pub fn reset_confirmations(&mut self) {
        self.initiator_confirmed = false;
        self.target_confirmed = false;
    }

    /// Total quantity of `item_id` across all of `role`'s offer lines
    pub fn offered_quantity(&self, role: Role, item_id: ItemId) -> i64 {
        self.items(role)
            .iter()
            .filter(|i| i.item_id == item_id)
            .map(|i| i.quantity)
            .sum()
    }

    /// Whether adding `item_id` would create a new line
    pub fn needs_new_line(&self, role: Role, item_id: ItemId, merge: bool) -> bool {
        !merge || !self.items(role).iter().any(|i| i.item_id == item_id)
    }

    /// Add an offer line, or grow the existing one when `merge` is set
    ///
    /// Returns false, leaving the session untouched, if the merged quantity
    /// would overflow.
    pub fn add_item(&mut self, role: Role, item: OfferItem, merge: bool) -> bool {
        let items = self.items_mut(role);
        let existing = if merge {
            items.iter().position(|i| i.item_id == item.item_id)
        } else {
            None
        };
        match existing {
            Some(index) => match items[index].quantity.checked_add(item.quantity) {
                Some(total) => items[index].quantity = total,
                None => return false,
            },
            None => items.push(item),
        }
        self.reset_confirmations();
        self.touch();
        true
    }

    /// Remove the first line for `item_id` from `role`'s offer
    pub fn remove_item(&mut self, role: Role, item_id: ItemId) -> Option<OfferItem> {
        let items = self.items_mut(role);
        let index = items.iter().position(|i| i.item_id == item_id)?;
        let removed = items.remove(index);
        self.reset_confirmations();
        self.touch();
        Some(removed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Project the session from `role`'s perspective
    pub fn view_for(&self, role: Role) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            your_items: self.items(role).to_vec(),
            partner_items: self.items(role.other()).to_vec(),
            your_confirmed: self.is_confirmed(role),
            partner_confirmed: self.is_confirmed(role.other()),
        }
    }

    /// Transfer instructions: initiator lines first, then target lines
    pub fn settlement_plan(&self) -> SettlementPlan {
        let sender = self.initiator_items.iter().map(|i| TradeLine {
            side: TradeSide::Sender,
            item_id: i.item_id,
            quantity: i.quantity,
        });
        let receiver = self.target_items.iter().map(|i| TradeLine {
            side: TradeSide::Receiver,
            item_id: i.item_id,
            quantity: i.quantity,
        });

        SettlementPlan {
            sender_id: self.initiator.user_id,
            receiver_id: self.target.user_id,
            lines: sender.chain(receiver).collect(),
        }
    }
}
