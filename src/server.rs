//! WebSocket transport for live trading
//!
//! `GET /ws?user_id=<id>[&username=<name>]` upgrades to a WebSocket carrying
//! JSON [`ClientMessage`](crate::trade::ClientMessage) frames in and
//! [`ServerMessage`](crate::trade::ServerMessage) frames out. `GET /health`
//! reports connection and session counts.

use crate::config::Config;
use crate::error::{Result, TradepostError};
use crate::storage::{SqliteStorage, UserId};
use crate::trade::{ConnectionRegistry, Dispatcher, NegotiationEngine};
use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub storage: SqliteStorage,
}

/// Query parameters of the WebSocket upgrade request
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: UserId,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub online_users: usize,
    pub active_sessions: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Run the server until Ctrl-C
///
/// # Errors
///
/// Returns an error if the bind address cannot be bound or the server fails.
pub async fn run(config: &Config, storage: SqliteStorage) -> Result<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(NegotiationEngine::new(
        registry,
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        config.trade.clone(),
    ));
    let sweeper = spawn_sweeper(engine.clone(), config.trade.sweep_interval());
    let app = router(AppState {
        dispatcher: Dispatcher::new(engine),
        storage,
    });

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))
        .map_err(|e| TradepostError::Transport(e.to_string()))?;
    info!(
        "Live trade server listening on ws://{}/ws",
        config.server.bind_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TradepostError::Transport(e.to_string()))?;

    sweeper.abort();
    info!("Live trade server stopped");
    Ok(())
}

/// Periodically evict stale sessions
pub fn spawn_sweeper(engine: Arc<NegotiationEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.evict_stale(Utc::now()).await;
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.dispatcher.engine();
    Json(HealthResponse {
        status: "ok".to_string(),
        online_users: engine.registry().online_count(),
        active_sessions: engine.session_count(),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let display_name = match display_name(&state.storage, &params).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, format!("Unknown user {}", params.user_id))
                .into_response()
        }
        Err(e) => {
            warn!(user_id = params.user_id, error = %e, "User lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let user_id = params.user_id;
    ws.on_upgrade(move |socket| handle_socket(socket, state.dispatcher, user_id, display_name))
}

/// Name shown to trade partners; None when the user does not exist
async fn display_name(storage: &SqliteStorage, params: &ConnectParams) -> Result<Option<String>> {
    let storage = storage.clone();
    let user_id = params.user_id;
    let user = tokio::task::spawn_blocking(move || storage.user(user_id)).await??;
    Ok(user.map(|u| params.username.clone().unwrap_or(u.username)))
}

async fn handle_socket(socket: WebSocket, dispatcher: Dispatcher, user_id: UserId, name: String) {
    let (connection_id, mut outbound) = dispatcher.connect(user_id, name);
    let (mut sink, mut stream) = socket.split();

    // Ends when the registry drops this connection's sender, which also
    // happens when a newer connection displaces it.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(user_id, error = %e, "Failed to encode server message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatcher.handle_text(user_id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(user_id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    dispatcher.disconnect(user_id, connection_id).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeConfig;
    use crate::notify::LogNotifier;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(dir.path().join("srv.db")).unwrap();
        let engine = NegotiationEngine::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(storage.clone()),
            Arc::new(LogNotifier),
            TradeConfig::default(),
        );
        let state = AppState {
            dispatcher: Dispatcher::new(Arc::new(engine)),
            storage,
        };
        (state, dir)
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let (state, _dir) = state();
        let (_, _rx) = state.dispatcher.connect(1, "alice");

        let response = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            health,
            HealthResponse {
                status: "ok".to_string(),
                online_users: 1,
                active_sessions: 0
            }
        );
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let (state, _dir) = state();
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/ws?user_id=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_display_name_prefers_query_username() {
        let (state, _dir) = state();
        let id = state.storage.create_user("alice").unwrap();

        let stored = ConnectParams {
            user_id: id,
            username: None,
        };
        assert_eq!(
            display_name(&state.storage, &stored).await.unwrap(),
            Some("alice".to_string())
        );

        let renamed = ConnectParams {
            user_id: id,
            username: Some("Alice the Bold".to_string()),
        };
        assert_eq!(
            display_name(&state.storage, &renamed).await.unwrap(),
            Some("Alice the Bold".to_string())
        );

        let unknown = ConnectParams {
            user_id: id + 100,
            username: Some("ghost".to_string()),
        };
        assert_eq!(display_name(&state.storage, &unknown).await.unwrap(), None);
    }
}
