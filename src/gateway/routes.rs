//! HTTP side-channels served on the same port as the WebSocket: health,
//! one-shot message delivery, and supervisor control passthrough.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::state::GatewayState;

pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "ocConnected": state.oc_connected(),
        "agentBusy": state.agent_busy(),
        "clients": state.client_count(),
        "humans": state.human_count(),
        "supervisorConnected": state.supervisor_connected(),
        "task": state.task_status().await,
        "instance": state.instance,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub delivered: bool,
}

pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    if !state.oc_connected() {
        return (StatusCode::OK, Json(SendMessageResponse { delivered: false }));
    }
    let nonce = Uuid::new_v4().to_string();
    let delivered = state.send_upstream(req.message, nonce).await.is_ok();
    if delivered {
        state.set_agent_busy(true);
    }
    (StatusCode::OK, Json(SendMessageResponse { delivered }))
}

#[derive(Debug, Deserialize)]
pub struct SupervisorControlRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct SupervisorControlResponse {
    pub found: bool,
}

pub async fn supervisor_control(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<SupervisorControlRequest>,
) -> impl IntoResponse {
    let found = state.notify_supervisor_control(&req.action);
    Json(SupervisorControlResponse { found })
}
