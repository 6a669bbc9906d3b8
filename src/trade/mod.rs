//! Live trade negotiation
//!
//! Two online users negotiate an item swap inside a [`LiveTradeSession`]:
//! an invite is accepted, both sides edit their offers, and once both have
//! confirmed the current offers the [`SettlementExecutor`] moves the items in
//! one storage transaction.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod messages;
pub mod registry;
pub mod session;
pub mod settlement;
pub mod table;

pub use dispatch::Dispatcher;
pub use engine::NegotiationEngine;
pub use error::{SettlementError, TradeError};
pub use messages::{ClientMessage, ServerMessage};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use session::{
    LiveTradeSession, OfferItem, Participant, Role, SessionId, SessionStatus, SessionView,
};
pub use settlement::SettlementExecutor;
pub use table::SessionTable;
