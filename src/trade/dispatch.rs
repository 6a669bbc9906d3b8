//! Routes decoded client commands to the negotiation engine

use crate::storage::UserId;
use crate::telemetry;
use crate::trade::engine::NegotiationEngine;
use crate::trade::error::TradeError;
use crate::trade::messages::{ClientMessage, ServerMessage};
use crate::trade::registry::{ConnectionHandle, ConnectionId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Transport-facing entry point
///
/// A transport calls [`Dispatcher::connect`] once a user is authenticated,
/// feeds every inbound frame to [`Dispatcher::handle_text`], forwards the
/// returned receiver's messages to the client, and calls
/// [`Dispatcher::disconnect`] when the connection ends.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<NegotiationEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<NegotiationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<NegotiationEngine> {
        &self.engine
    }

    /// Register a new connection for `user_id`
    ///
    /// A previous connection of the same user is displaced; its sessions stay
    /// alive and are now reachable through the new connection.
    pub fn connect(
        &self,
        user_id: UserId,
        display_name: impl Into<String>,
    ) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
        let (handle, receiver) = ConnectionHandle::new(display_name);
        let id = handle.id;
        if self.engine.registry().register(user_id, handle).is_some() {
            info!(user_id, "User reconnected, previous connection displaced");
        } else {
            info!(user_id, "User connected");
        }
        (id, receiver)
    }

    /// Tear down `connection_id` and cancel the user's sessions
    ///
    /// Does nothing if the user has since reconnected on another connection.
    pub async fn disconnect(&self, user_id: UserId, connection_id: ConnectionId) -> usize {
        if !self
            .engine
            .registry()
            .unregister_connection(user_id, connection_id)
        {
            debug!(user_id, "Stale connection closed, newer connection kept");
            return 0;
        }
        info!(user_id, "User disconnected");
        self.engine.handle_disconnect(user_id).await
    }

    /// Run one command on behalf of `user_id`
    pub async fn dispatch(&self, user_id: UserId, message: ClientMessage) -> Result<(), TradeError> {
        debug!(user_id, kind = message.kind(), "Dispatching trade command");
        match message {
            ClientMessage::Invite { target_user_id } => {
                self.engine.invite(user_id, target_user_id).await.map(|_| ())
            }
            ClientMessage::Accept { session_id } => self.engine.accept(user_id, &session_id).await,
            ClientMessage::Decline { session_id } => self.engine.decline(user_id, &session_id).await,
            ClientMessage::AddItem {
                session_id,
                item_id,
                quantity,
            } => {
                self.engine
                    .add_item(user_id, &session_id, item_id, quantity)
                    .await
            }
            ClientMessage::RemoveItem {
                session_id,
                item_id,
            } => self.engine.remove_item(user_id, &session_id, item_id).await,
            ClientMessage::Confirm { session_id } => self.engine.confirm(user_id, &session_id).await,
            ClientMessage::Cancel { session_id } => self.engine.cancel(user_id, &session_id).await,
        }
    }

    /// Run a command and report any rejection to the issuing user only
    pub async fn handle(&self, user_id: UserId, message: ClientMessage) {
        let kind = message.kind();
        if let Err(e) = self.dispatch(user_id, message).await {
            debug!(user_id, kind, error = %e, "Trade command rejected");
            telemetry::record_rejected(e.kind());
            self.reply_error(user_id, e.to_string());
        }
    }

    /// Decode a JSON frame and handle it
    pub async fn handle_text(&self, user_id: UserId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(user_id, message).await,
            Err(e) => {
                debug!(user_id, error = %e, "Malformed trade command");
                telemetry::record_rejected("malformed");
                self.reply_error(user_id, format!("Malformed message: {}", e));
            }
        }
    }

    fn reply_error(&self, user_id: UserId, message: String) {
        self.engine
            .registry()
            .send(user_id, ServerMessage::Error { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeConfig;
    use crate::notify::LogNotifier;
    use crate::storage::SqliteStorage;
    use crate::trade::registry::ConnectionRegistry;

    fn dispatcher() -> (Dispatcher, SqliteStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(dir.path().join("d.db")).unwrap();
        let engine = NegotiationEngine::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(storage.clone()),
            Arc::new(LogNotifier),
            TradeConfig::default(),
        );
        (Dispatcher::new(Arc::new(engine)), storage, dir)
    }

    #[tokio::test]
    async fn test_malformed_text_replies_error() {
        let (dispatcher, _storage, _dir) = dispatcher();
        let (_, mut rx) = dispatcher.connect(1, "alice");

        dispatcher.handle_text(1, "{not json").await;
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => assert!(message.starts_with("Malformed message")),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_goes_to_sender_only() {
        let (dispatcher, _storage, _dir) = dispatcher();
        let (_, mut alice_rx) = dispatcher.connect(1, "alice");
        let (_, mut bob_rx) = dispatcher.connect(2, "bob");

        dispatcher
            .handle_text(1, r#"{"type":"confirm","session_id":"nope"}"#)
            .await;
        assert!(matches!(
            alice_rx.try_recv().unwrap(),
            ServerMessage::Error { .. }
        ));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invite_offline_target() {
        let (dispatcher, _storage, _dir) = dispatcher();
        let (_, _rx) = dispatcher.connect(1, "alice");
        assert_eq!(
            dispatcher
                .dispatch(1, ClientMessage::Invite { target_user_id: 2 })
                .await,
            Err(TradeError::TargetOffline(2))
        );
        assert_eq!(dispatcher.engine().session_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_sessions() {
        let (dispatcher, _storage, _dir) = dispatcher();
        let (old_conn, _old_rx) = dispatcher.connect(1, "alice");
        let (new_conn, _new_rx) = dispatcher.connect(1, "alice");
        let (_, _bob_rx) = dispatcher.connect(2, "bob");

        dispatcher
            .dispatch(1, ClientMessage::Invite { target_user_id: 2 })
            .await
            .unwrap();

        assert_eq!(dispatcher.disconnect(1, old_conn).await, 0);
        assert_eq!(dispatcher.engine().session_count(), 1);

        assert_eq!(dispatcher.disconnect(1, new_conn).await, 1);
        assert_eq!(dispatcher.engine().session_count(), 0);
    }
}
