//! Gateway process bootstrap: binds the combined WS+HTTP port and spawns the
//! upstream session task, grounded in the teacher's `gateway::daemon`
//! bind-with-fallback startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use super::protocol::InstanceInfo;
use super::routes::{health, send_message, supervisor_control};
use super::state::GatewayState;
use super::upstream::{self, EngineAuth};
use super::ws::ws_handler;

use crate::event_bus::EventBus;

pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub engine_ws_url: String,
    pub engine_auth: EngineAuth,
    pub project: String,
    pub session_prefix: String,
    pub instance: InstanceInfo,
}

/// Starts the Gateway: spawns the upstream session task and serves the
/// downstream WS+HTTP router until the listener is closed.
pub async fn run(config: GatewayConfig, events: Arc<dyn EventBus>) -> Result<(), String> {
    let (upstream_tx, upstream_rx) = mpsc::channel(64);
    let state = Arc::new(GatewayState::new(
        config.project,
        config.session_prefix,
        events,
        upstream_tx,
        config.instance,
    ));

    let upstream_state = Arc::clone(&state);
    tokio::spawn(upstream::run(upstream_state, config.engine_ws_url, config.engine_auth, upstream_rx));

    let app = Router::new()
        .route("/health", get(health))
        .route("/send-message", post(send_message))
        .route("/supervisor/control", post(supervisor_control))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| format!("gateway bind failed: {e}"))?;
    tracing::info!(addr = %config.bind_addr, "gateway listening");

    axum::serve(listener, app).await.map_err(|e| format!("gateway server error: {e}"))
}
