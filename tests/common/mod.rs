use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tradepost::config::TradeConfig;
use tradepost::storage::{ItemId, SqliteStorage, UserId};
use tradepost::trade::{
    ClientMessage, ConnectionId, ConnectionRegistry, Dispatcher, NegotiationEngine, ServerMessage,
    SessionId, SessionView,
};

/// A fake connected client: the dispatcher side of a socket
#[allow(dead_code)]
pub struct TestClient {
    pub user_id: UserId,
    pub connection: ConnectionId,
    rx: UnboundedReceiver<ServerMessage>,
}

#[allow(dead_code)]
impl TestClient {
    /// Every message queued for this client so far
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Most recent `session_update` among the queued messages
    pub fn last_update(&mut self) -> Option<SessionView> {
        self.drain().into_iter().rev().find_map(|m| match m {
            ServerMessage::SessionUpdate(view) => Some(view),
            _ => None,
        })
    }

    /// Session id of the first queued `invite_received`
    pub fn received_invite(&mut self) -> Option<SessionId> {
        self.drain().into_iter().find_map(|m| match m {
            ServerMessage::InviteReceived { session_id, .. } => Some(session_id),
            _ => None,
        })
    }
}

/// Engine, registry and SQLite storage wired together in a temp directory
#[allow(dead_code)]
pub struct TradeHarness {
    pub storage: SqliteStorage,
    pub dispatcher: Dispatcher,
    _tmp: TempDir,
}

#[allow(dead_code)]
impl TradeHarness {
    pub fn new() -> Self {
        Self::with_config(TradeConfig::default())
    }

    pub fn with_config(config: TradeConfig) -> Self {
        let tmp = TempDir::new().expect("failed to create tempdir");
        let storage = SqliteStorage::new_with_path(tmp.path().join("tradepost.db"))
            .expect("failed to create sqlite storage with path");
        let engine = NegotiationEngine::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            config,
        );
        Self {
            storage,
            dispatcher: Dispatcher::new(Arc::new(engine)),
            _tmp: tmp,
        }
    }

    pub fn engine(&self) -> &Arc<NegotiationEngine> {
        self.dispatcher.engine()
    }

    pub fn user(&self, name: &str) -> UserId {
        self.storage.create_user(name).expect("failed to create user")
    }

    pub fn item(&self, name: &str, tradeable: bool) -> ItemId {
        self.storage
            .create_item(name, tradeable)
            .expect("failed to create item")
    }

    pub fn grant(&self, user: UserId, item: ItemId, quantity: i64) {
        self.storage
            .grant_item(user, item, quantity)
            .expect("failed to grant item");
    }

    pub fn quantity(&self, user: UserId, item: ItemId) -> i64 {
        self.storage
            .item_quantity(user, item)
            .expect("failed to read quantity")
    }

    /// Create a user and connect them
    pub fn online_user(&self, name: &str) -> TestClient {
        let user_id = self.user(name);
        self.connect(user_id, name)
    }

    pub fn connect(&self, user_id: UserId, name: &str) -> TestClient {
        let (connection, rx) = self.dispatcher.connect(user_id, name);
        TestClient {
            user_id,
            connection,
            rx,
        }
    }

    pub async fn send(&self, client: &TestClient, message: ClientMessage) {
        self.dispatcher.handle(client.user_id, message).await;
    }

    /// Invite, accept, and clear both inboxes
    pub async fn open_session(&self, a: &mut TestClient, b: &mut TestClient) -> SessionId {
        self.send(
            a,
            ClientMessage::Invite {
                target_user_id: b.user_id,
            },
        )
        .await;
        let session_id = b.received_invite().expect("no invite received");
        self.send(
            b,
            ClientMessage::Accept {
                session_id: session_id.clone(),
            },
        )
        .await;
        a.drain();
        b.drain();
        session_id
    }

    pub async fn add(&self, client: &TestClient, session_id: &str, item_id: ItemId, quantity: i64) {
        self.send(
            client,
            ClientMessage::AddItem {
                session_id: session_id.to_string(),
                item_id,
                quantity,
            },
        )
        .await;
    }

    pub async fn confirm(&self, client: &TestClient, session_id: &str) {
        self.send(
            client,
            ClientMessage::Confirm {
                session_id: session_id.to_string(),
            },
        )
        .await;
    }
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// True if any message is an `error` frame
#[allow(dead_code)]
pub fn has_error(messages: &[ServerMessage]) -> bool {
    messages
        .iter()
        .any(|m| matches!(m, ServerMessage::Error { .. }))
}
