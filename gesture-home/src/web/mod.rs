//! Web dashboard.
//!
//! Serves the dashboard and 3D room pages, JSON snapshots of the device
//! state, and a websocket that pushes every applied command.

pub mod hub;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

pub use hub::Hub;

const DASHBOARD_HTML: &str = include_str!("assets/dashboard.html");
const ROOM_HTML: &str = include_str!("assets/room.html");

/// Dashboard listen address.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl WebConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/3d-room", get(room_page))
        .route("/api/state", get(api_state))
        .route("/api/history", get(api_history))
        .route("/ws", get(ws_handler))
        .with_state(hub)
}

/// Serve the dashboard until ctrl-c or SIGTERM.
pub async fn serve(config: WebConfig, hub: Arc<Hub>) -> anyhow::Result<()> {
    let address = config.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind dashboard to {address}"))?;
    info!(%address, "dashboard listening");

    axum::serve(listener, router(hub))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("dashboard server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            debug!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                debug!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, stopping dashboard");
}

// ── Handlers ───────────────────────────────────────────────

async fn dashboard_page() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn room_page() -> Html<&'static str> {
    Html(ROOM_HTML)
}

async fn api_state(State(hub): State<Arc<Hub>>) -> Json<Value> {
    Json(hub.state_json())
}

async fn api_history(State(hub): State<Arc<Hub>>) -> Json<Value> {
    Json(hub.history_json())
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the greeting so no update falls in between.
    let mut updates = hub.subscribe();
    for message in hub.greeting() {
        if sender.send(Message::Text(message.into())).await.is_err() {
            debug!("dashboard client left during greeting");
            return;
        }
    }
    debug!("dashboard client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(message) => {
                    if sender.send(Message::Text(message.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "dashboard client lagging, skipped updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Clients only listen; drain their frames until they close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    // If either side finishes, stop the other.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    debug!("dashboard client disconnected");
}
