//! WorkerAgent: the HTTP+WS server that runs inside a dedicated compute
//! instance and drives the Sandbox on the control plane's behalf, grounded
//! in the teacher's `gateway::daemon` bind style and `gateway::auth`
//! bearer middleware.

pub mod auth;
pub mod health_wait;
pub mod heartbeat;
pub mod limits;
pub mod routes;
pub mod state;
pub mod workspace;

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

pub use state::WorkerState;

pub struct WorkerAgentConfig {
    pub bind_addr: SocketAddr,
}

pub async fn run(config: WorkerAgentConfig, state: WorkerState) -> Result<(), String> {
    tokio::spawn(heartbeat::run(state.clone()));

    let authed = Router::new()
        .route("/container/create", post(routes::container_create))
        .route("/container/restart", post(routes::container_restart))
        .route("/container/destroy", post(routes::container_destroy))
        .route("/exec", post(routes::exec))
        .route("/task", post(routes::task_write))
        .route("/memory", get(routes::memory))
        .route("/logs", get(routes::logs))
        .route("/supervisor/control", post(routes::supervisor_control))
        .route("/message", post(routes::message))
        .route("/gateway", get(routes::gateway_ws))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    let app = Router::new()
        .route("/health", get(routes::health))
        .merge(authed)
        .with_state(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| format!("worker agent bind failed: {e}"))?;
    tracing::info!(addr = %config.bind_addr, "worker agent listening");

    axum::serve(listener, app).await.map_err(|e| format!("worker agent server error: {e}"))
}
