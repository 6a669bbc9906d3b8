//! Maps authenticated users to their live connection

use crate::storage::UserId;
use crate::trade::messages::ServerMessage;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identifies one physical connection of a user
pub type ConnectionId = Uuid;

/// Outbound side of a user's connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub display_name: String,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver that drains it
    ///
    /// The transport owns the receiver and writes every message it yields to
    /// the client.
    pub fn new(display_name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                display_name: display_name.into(),
                sender,
            },
            receiver,
        )
    }

    /// Queue a message; false if the connection is gone
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// At most one live connection per user; the newest registration wins
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `user_id`, returning the connection it displaced
    ///
    /// The displaced connection is not closed here.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        let displaced = connections.insert(user_id, handle);
        if displaced.is_some() {
            debug!(user_id, "Replaced existing connection");
        }
        displaced
    }

    /// Remove whatever connection `user_id` has
    pub fn unregister(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id)
    }

    /// Remove `user_id`'s mapping only if it still points at `connection_id`
    ///
    /// Returns true when the mapping was removed.
    pub fn unregister_connection(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        match connections.get(&user_id) {
            Some(handle) if handle.id == connection_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub fn resolve(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.resolve(user_id).is_some_and(|h| !h.is_closed())
    }

    /// Best-effort delivery; returns false when the user is not reachable
    pub fn send(&self, user_id: UserId, message: ServerMessage) -> bool {
        match self.resolve(user_id) {
            Some(handle) => handle.send(message),
            None => {
                debug!(user_id, "Dropping message for offline user");
                false
            }
        }
    }

    pub fn online_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
