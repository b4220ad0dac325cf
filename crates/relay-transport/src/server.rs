//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket, the `connected` greeting, and the
//! per-connection read/write tasks. Inbound text frames are forwarded to the
//! relay's single processing loop over a bounded channel; outbound frames
//! arrive through the connection registry.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use relay_protocol::Outbound;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::registry::{ConnectionId, ConnectionRegistry};

/// One inbound text frame, tagged with its originating connection.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub conn: ConnectionId,
    pub text: String,
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS (dashboards served from another origin)
    pub enable_cors: bool,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_connections: Some(64),
        }
    }
}

/// Shared state for the transport server.
struct AppState {
    registry: Arc<ConnectionRegistry>,
    frames_tx: mpsc::Sender<InboundFrame>,
    config: TransportConfig,
}

/// The transport server — accepts WebSocket connections and moves frames.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server. Inbound text frames are pushed into
    /// `frames_tx`; the relay loop on the other end replies and broadcasts
    /// through `registry`.
    pub async fn start(
        config: TransportConfig,
        registry: Arc<ConnectionRegistry>,
        frames_tx: mpsc::Sender<InboundFrame>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            registry,
            frames_tx,
            config: config.clone(),
        });

        let mut app = Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        if config.enable_cors {
            app = app.layer(tower_http::cors::CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("fleet relay listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("fleet relay transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // Check connection limit
    if let Some(max) = state.config.max_connections {
        let current = state.registry.len();
        if current >= max {
            warn!("connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.registry.len(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    // Queue the greeting before registering so it is the first frame this
    // client receives, ahead of any in-flight broadcast.
    let greeting = Outbound::Connected {
        message: "connected to fleet relay".into(),
    };
    let _ = out_tx.send(Message::Text(greeting.to_frame().into()));

    let conn_id = state.registry.register(out_tx.clone());
    info!("client connected: {conn_id} (total: {})", state.registry.len());

    // Writer task — drains the outbound queue into the socket. Ends when
    // every sender (registry entry + the local pong handle) is gone.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame = InboundFrame {
                    conn: conn_id.clone(),
                    text: text.to_string(),
                };
                if state.frames_tx.send(frame).await.is_err() {
                    error!("relay loop is gone; closing {conn_id}");
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = out_tx.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                debug!("client closed: {conn_id}");
                break;
            }
            Err(e) => {
                warn!("websocket error for {conn_id}: {e}");
                break;
            }
            _ => {}
        }
    }

    state.registry.unregister(&conn_id);
    drop(out_tx);
    let _ = writer.await;
    info!("client disconnected: {conn_id} (total: {})", state.registry.len());
}
