//! ControlAPI (C9): the operator-facing HTTP+WS surface for project
//! lifecycle, secrets, task control, and the chat relay, grounded in the
//! teacher's `gateway::daemon` bind-and-serve shape.

pub mod auth;
pub mod routes;
pub mod state;
pub mod workspace;
pub mod ws;

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub use state::ControlApiState;

pub struct ControlApiConfig {
    pub bind_addr: SocketAddr,
}

pub async fn run(config: ControlApiConfig, state: ControlApiState) -> Result<(), String> {
    let authed = Router::new()
        .route("/api/projects", post(routes::create_project).get(routes::list_projects))
        .route("/api/projects/:name", get(routes::get_project).delete(routes::delete_project))
        .route("/api/projects/:name/restart", post(routes::restart_project))
        .route("/api/projects/:name/resize", post(routes::resize_project))
        .route("/api/projects/:name/exec", post(routes::exec_project))
        .route("/api/projects/:name/task", post(routes::write_task))
        .route("/api/projects/:name/task/:action", post(routes::task_control))
        .route("/api/projects/:name/secrets", post(routes::put_secret).get(routes::list_secrets))
        .route("/api/projects/:name/secrets/:key", delete(routes::delete_secret))
        .route("/api/projects/:name/supervisor", post(routes::supervisor_action))
        .route("/api/projects/:name/memory", get(routes::get_memory))
        .route("/api/projects/:name/logs", get(routes::get_logs))
        .route("/api/projects/:name/message", post(routes::send_message))
        .route(
            "/api/projects/:name/directives",
            get(routes::list_directives).post(routes::add_directive),
        )
        .route("/api/projects/:name/directives/:id", delete(routes::delete_directive))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/ws/projects/:name/chat", get(ws::chat_ws))
        // Worker heartbeats carry no operator bearer token, so this stays
        // outside `authed` — the instance/project pair is the credential.
        .route("/api/workers/:project/heartbeat", post(routes::worker_heartbeat))
        .merge(authed)
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| format!("control api bind failed: {e}"))?;
    tracing::info!(addr = %config.bind_addr, "control api listening");
    axum::serve(listener, app).await.map_err(|e| format!("control api server error: {e}"))
}
