//! WorkerAgent HTTP+WS surface. Every route except `/health` runs behind
//! [`super::auth::auth_middleware`].

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::limits::clamp_resources;
use super::state::{WorkerState, GATEWAY_PORT};
use super::workspace;
use super::health_wait::wait_for_gateway_health;

const TASK_DOCUMENT_PATH: &str = "/workspace/.task.json";
const MEMORY_FILES: [&str; 3] = [
    "/workspace/SHORT_TERM_MEMORY.md",
    "/workspace/LONG_TERM_MEMORY.md",
    "/workspace/plan.md",
];
const SUPERVISOR_LOG_PATH: &str = "/workspace/.supervisor.log";

pub async fn health(State(state): State<WorkerState>) -> Json<Value> {
    let sandbox = state.sandbox().lock().await;
    let health = sandbox.health().await.ok();
    let running = health.as_ref().map(|h| h.running).unwrap_or(false);

    let gateway = if running {
        match sandbox.ip().await {
            Ok(Some(ip)) => {
                let url = format!("http://{ip}:{GATEWAY_PORT}/health");
                reqwest::get(&url).await.ok().and_then(|r| r.error_for_status().ok())
            }
            _ => None,
        }
    } else {
        None
    };

    let gateway_json = match gateway {
        Some(resp) => resp.json::<Value>().await.ok(),
        None => None,
    };

    Json(json!({
        "ok": true,
        "container_running": running,
        "gateway": gateway_json,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateContainerRequest {
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateContainerResponse {
    pub container_id: String,
}

pub async fn container_create(
    State(state): State<WorkerState>,
    Json(req): Json<CreateContainerRequest>,
) -> Result<Json<CreateContainerResponse>, (axum::http::StatusCode, String)> {
    let (cpus, memory_mb) = clamp_resources(
        req.cpus.unwrap_or(state.host_cpus),
        req.memory_mb.unwrap_or(state.host_memory_mb),
        state.host_cpus,
        state.host_memory_mb,
    );
    tracing::info!(cpus, memory_mb, "applying clamped resource limits");

    let mut sandbox = state.sandbox().lock().await;
    let container_id = sandbox
        .create(req.env, cpus, memory_mb)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if let Err(e) = wait_for_gateway_health(&sandbox).await {
        let _ = sandbox.destroy(false).await;
        return Err((axum::http::StatusCode::GATEWAY_TIMEOUT, e));
    }

    Ok(Json(CreateContainerResponse { container_id }))
}

pub async fn container_restart(
    State(state): State<WorkerState>,
    Json(req): Json<CreateContainerRequest>,
) -> Result<Json<CreateContainerResponse>, (axum::http::StatusCode, String)> {
    let (cpus, memory_mb) = clamp_resources(
        req.cpus.unwrap_or(state.host_cpus),
        req.memory_mb.unwrap_or(state.host_memory_mb),
        state.host_cpus,
        state.host_memory_mb,
    );

    let mut sandbox = state.sandbox().lock().await;
    sandbox
        .destroy(false)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let container_id = sandbox
        .create(req.env, cpus, memory_mb)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if let Err(e) = wait_for_gateway_health(&sandbox).await {
        let _ = sandbox.destroy(false).await;
        return Err((axum::http::StatusCode::GATEWAY_TIMEOUT, e));
    }

    Ok(Json(CreateContainerResponse { container_id }))
}

#[derive(Debug, Deserialize)]
pub struct DestroyContainerRequest {
    #[serde(default)]
    pub remove_volume: bool,
}

pub async fn container_destroy(
    State(state): State<WorkerState>,
    Json(req): Json<DestroyContainerRequest>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let mut sandbox = state.sandbox().lock().await;
    sandbox
        .destroy(req.remove_volume)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    #[serde(default = "default_exec_timeout")]
    pub timeout_secs: u64,
}

fn default_exec_timeout() -> u64 {
    30
}

pub async fn exec(
    State(state): State<WorkerState>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let sandbox = state.sandbox().lock().await;
    let out = sandbox
        .exec(&req.argv, req.timeout_secs)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({
        "exit_code": out.exit_code,
        "stdout": out.stdout,
        "stderr": out.stderr,
    })))
}

pub async fn task_write(
    State(state): State<WorkerState>,
    Json(task): Json<Value>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let sandbox = state.sandbox().lock().await;
    let body = serde_json::to_string(&task).map_err(|e| (axum::http::StatusCode::BAD_REQUEST, e.to_string()))?;
    workspace::write_file(&sandbox, TASK_DOCUMENT_PATH, &body)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({"ok": true})))
}

pub async fn memory(State(state): State<WorkerState>) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let sandbox = state.sandbox().lock().await;
    let mut files = serde_json::Map::new();
    for path in MEMORY_FILES {
        let content = workspace::read_file(&sandbox, path).await.unwrap_or_default();
        let name = path.rsplit('/').next().unwrap_or(path);
        files.insert(name.to_owned(), Value::String(content));
    }
    Ok(Json(Value::Object(files)))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_lines")]
    pub lines: u32,
}

fn default_log_lines() -> u32 {
    200
}

pub async fn logs(
    State(state): State<WorkerState>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let sandbox = state.sandbox().lock().await;
    let content = workspace::tail_file(&sandbox, SUPERVISOR_LOG_PATH, q.lines)
        .await
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({"lines": content})))
}

pub async fn supervisor_control(
    State(state): State<WorkerState>,
    Json(req): Json<Value>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let ip = {
        let sandbox = state.sandbox().lock().await;
        sandbox
            .ip()
            .await
            .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .ok_or((axum::http::StatusCode::SERVICE_UNAVAILABLE, "sandbox has no address yet".to_owned()))?
    };
    let url = format!("http://{ip}:{GATEWAY_PORT}/supervisor/control");
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .map_err(|e| (axum::http::StatusCode::BAD_GATEWAY, e.to_string()))?;
    let body: Value = resp.json().await.unwrap_or(json!({"found": false}));
    Ok(Json(body))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageRequest {
    pub content: String,
}

pub async fn message(
    State(state): State<WorkerState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let ip = {
        let sandbox = state.sandbox().lock().await;
        sandbox
            .ip()
            .await
            .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .ok_or((axum::http::StatusCode::SERVICE_UNAVAILABLE, "sandbox has no address yet".to_owned()))?
    };
    let url = format!("ws://{ip}:{GATEWAY_PORT}/ws");
    let (mut socket, _) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| (axum::http::StatusCode::BAD_GATEWAY, e.to_string()))?;

    let frame = json!({"type": "user_message", "content": req.content});
    socket
        .send(tokio_tungstenite::tungstenite::Message::Text(frame.to_string()))
        .await
        .map_err(|e| (axum::http::StatusCode::BAD_GATEWAY, e.to_string()))?;
    let _ = socket.close(None).await;

    Ok(Json(json!({"ok": true})))
}

pub async fn gateway_ws(State(state): State<WorkerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| relay_gateway(socket, state))
}

async fn relay_gateway(client_socket: WebSocket, state: WorkerState) {
    let ip = {
        let sandbox = state.sandbox().lock().await;
        match sandbox.ip().await {
            Ok(Some(ip)) => ip,
            _ => return,
        }
    };
    let url = format!("ws://{ip}:{GATEWAY_PORT}/ws");
    let Ok((upstream, _)) = tokio_tungstenite::connect_async(&url).await else {
        return;
    };

    use futures::{SinkExt, StreamExt};
    let (mut up_write, mut up_read) = upstream.split();
    let (mut down_write, mut down_read) = client_socket.split();

    let upstream_to_client = async {
        while let Some(Ok(msg)) = up_read.next().await {
            let forwarded = match msg {
                tokio_tungstenite::tungstenite::Message::Text(t) => Some(Message::Text(t)),
                tokio_tungstenite::tungstenite::Message::Binary(b) => Some(Message::Binary(b)),
                tokio_tungstenite::tungstenite::Message::Close(_) => None,
                _ => continue,
            };
            match forwarded {
                Some(m) => {
                    if down_write.send(m).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    };

    let client_to_upstream = async {
        while let Some(Ok(msg)) = down_read.next().await {
            let forwarded = match msg {
                Message::Text(t) => Some(tokio_tungstenite::tungstenite::Message::Text(t)),
                Message::Binary(b) => Some(tokio_tungstenite::tungstenite::Message::Binary(b)),
                Message::Close(_) => None,
                _ => continue,
            };
            match forwarded {
                Some(m) => {
                    if up_write.send(m).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    };

    tokio::select! {
        _ = upstream_to_client => {}
        _ = client_to_upstream => {}
    }
}
