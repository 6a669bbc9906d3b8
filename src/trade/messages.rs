//! Wire vocabulary exchanged with trade clients
//!
//! Both directions are JSON objects tagged by a `type` field, for example
//! `{"type": "add_item", "session_id": "...", "item_id": 3, "quantity": 2}`.

use crate::storage::{ItemId, UserId};
use crate::trade::session::{OfferItem, Participant, SessionId, SessionView};
use serde::{Deserialize, Serialize};

/// Commands sent by a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Invite {
        target_user_id: UserId,
    },
    Accept {
        session_id: SessionId,
    },
    Decline {
        session_id: SessionId,
    },
    AddItem {
        session_id: SessionId,
        item_id: ItemId,
        quantity: i64,
    },
    RemoveItem {
        session_id: SessionId,
        item_id: ItemId,
    },
    Confirm {
        session_id: SessionId,
    },
    Cancel {
        session_id: SessionId,
    },
}

impl ClientMessage {
    /// Message kind as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Invite { .. } => "invite",
            ClientMessage::Accept { .. } => "accept",
            ClientMessage::Decline { .. } => "decline",
            ClientMessage::AddItem { .. } => "add_item",
            ClientMessage::RemoveItem { .. } => "remove_item",
            ClientMessage::Confirm { .. } => "confirm",
            ClientMessage::Cancel { .. } => "cancel",
        }
    }
}

/// Events pushed to a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InviteReceived {
        session_id: SessionId,
        from_user: Participant,
    },
    InviteSent {
        session_id: SessionId,
        to_user: Participant,
    },
    InviteDeclined {
        session_id: SessionId,
        reason: String,
    },
    SessionStarted {
        session_id: SessionId,
        partner: Participant,
        is_initiator: bool,
        your_items: Vec<OfferItem>,
        partner_items: Vec<OfferItem>,
    },
    SessionUpdate(SessionView),
    SessionCompleted {
        session_id: SessionId,
        trade_id: i64,
    },
    SessionCancelled {
        session_id: SessionId,
        /// None when the server closed the session
        by_user: Option<UserId>,
    },
    SessionFailed {
        session_id: SessionId,
        reason: String,
    },
    Error {
        message: String,
    },
}
