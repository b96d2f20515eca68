//! ControlAPI HTTP surface: project lifecycle, secrets, task control, and
//! the workspace read-through endpoints (memory/logs/directives).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::models::{
    is_valid_project_name, is_valid_secret_key, NewProject, NewSecret, Project, ProjectData, Secret, Worker, WorkerData,
};
use crate::database::schema::{projects::dsl as p, secrets::dsl as s, workers::dsl as w};

use super::state::ControlApiState;
use super::workspace;

type ApiError = (StatusCode, Json<Value>);

fn err(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({"error": message.into()})))
}

fn internal(message: impl std::fmt::Display) -> ApiError {
    err(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

pub async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub extra_env: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub instance_type: Option<String>,
}

pub async fn create_project(State(state): State<ControlApiState>, Json(req): Json<CreateProjectRequest>) -> Result<(StatusCode, Json<ProjectData>), ApiError> {
    if !is_valid_project_name(&req.name) {
        return Err(err(StatusCode::BAD_REQUEST, "invalid project name"));
    }

    let llm_credential_ciphertext = state.secretbox.encrypt_str(&req.llm_api_key);
    let extra_env_json = serde_json::to_string(&req.extra_env).unwrap_or_else(|_| "{}".to_owned());
    let extra_env_ciphertext = state.secretbox.encrypt_str(&extra_env_json);

    let row = NewProject::new(&req.name, llm_credential_ciphertext, extra_env_ciphertext, &req.mcp_servers);

    let pool = state.pool.clone();
    let name_for_insert = req.name.clone();
    let inserted = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::insert_into(p::projects).values(&row).execute(&mut conn).map_err(|e| e.to_string())?;
        p::projects.filter(p::name.eq(&name_for_insert)).first::<Project>(&mut conn).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(|e| err(StatusCode::CONFLICT, e))?;

    if let Some(instance_type) = &req.instance_type {
        let provisioner = state.provisioner.clone();
        let containers = state.containers.clone();
        let pool = state.pool.clone();
        let project_name = req.name.clone();
        let instance_type = instance_type.clone();
        tokio::spawn(async move {
            match provisioner.provision(&project_name, &instance_type, String::new()).await {
                Ok((instance_id, _worker_token)) => {
                    let project_name_for_update = project_name.clone();
                    let instance_type_for_update = instance_type.clone();
                    let update_result = tokio::task::spawn_blocking(move || {
                        let mut conn = pool.get().map_err(|e| e.to_string())?;
                        diesel::update(p::projects.filter(p::name.eq(&project_name_for_update)))
                            .set((p::worker_id.eq(&instance_id), p::instance_type.eq(&instance_type_for_update)))
                            .execute(&mut conn)
                            .map_err(|e| e.to_string())?;
                        p::projects.filter(p::name.eq(&project_name_for_update)).first::<Project>(&mut conn).map_err(|e| e.to_string())
                    })
                    .await;
                    match update_result {
                        Ok(Ok(project)) => {
                            if let Err(e) = containers.create(&project).await {
                                tracing::warn!(project = %project_name, error = %e, "sandbox create on worker failed");
                            }
                        }
                        Ok(Err(e)) => tracing::warn!(project = %project_name, error = %e, "failed to persist worker assignment"),
                        Err(e) => tracing::warn!(project = %project_name, error = %e, "worker assignment task panicked"),
                    }
                }
                Err(e) => tracing::warn!(project = %project_name, error = %e, "provisioning failed"),
            }
        });
    } else {
        let containers = state.containers.clone();
        let project_for_create = inserted.clone();
        tokio::spawn(async move {
            if let Err(e) = containers.create(&project_for_create).await {
                tracing::warn!(project = %project_for_create.name, error = %e, "sandbox create failed");
            }
        });
    }

    Ok((StatusCode::CREATED, Json(ProjectData::from(inserted))))
}

pub async fn list_projects(State(state): State<ControlApiState>) -> Result<Json<Vec<ProjectData>>, ApiError> {
    let pool = state.pool.clone();
    let rows = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        p::projects.load::<Project>(&mut conn).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(internal)?;

    Ok(Json(rows.into_iter().map(ProjectData::from).collect()))
}

fn load_project_row(state: &ControlApiState, name: &str) -> Result<Project, ApiError> {
    let mut conn = state.pool.get().map_err(internal)?;
    p::projects
        .filter(p::name.eq(name))
        .first::<Project>(&mut conn)
        .optional()
        .map_err(internal)?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "project not found"))
}

fn load_worker_row(state: &ControlApiState, name: &str) -> Result<Option<Worker>, ApiError> {
    let mut conn = state.pool.get().map_err(internal)?;
    w::workers.filter(w::project_name.eq(name)).first::<Worker>(&mut conn).optional().map_err(internal)
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: ProjectData,
    pub worker: Option<WorkerData>,
    pub task: Option<Value>,
}

pub async fn get_project(State(state): State<ControlApiState>, Path(name): Path<String>) -> Result<Json<ProjectDetail>, ApiError> {
    let state2 = state.clone();
    let name2 = name.clone();
    let (project, worker) = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let project = load_project_row(&state2, &name2)?;
        let worker = load_worker_row(&state2, &name2)?;
        Ok((project, worker))
    })
    .await
    .map_err(|e| internal(e))??;

    let task = workspace::read_task(&state.containers, &name).await.ok().flatten();

    Ok(Json(ProjectDetail {
        project: ProjectData::from(project),
        worker: worker.map(WorkerData::from),
        task,
    }))
}

pub async fn delete_project(State(state): State<ControlApiState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let worker = load_worker_row(&state, &name)?;
    if state.containers.destroy(&name, true).await.is_err() {
        tracing::warn!(project = %name, "sandbox destroy failed during project deletion, continuing");
    }
    if let Some(worker) = worker {
        if let Err(e) = state.provisioner.terminate(&worker.instance_id).await {
            tracing::warn!(project = %name, error = %e, "worker terminate failed during project deletion, continuing");
        }
    }

    let pool = state.pool.clone();
    let name_for_delete = name.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::delete(p::projects.filter(p::name.eq(&name_for_delete))).execute(&mut conn).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(internal)?;

    Ok(Json(json!({"ok": true})))
}

pub async fn restart_project(State(state): State<ControlApiState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let project = load_project_row(&state, &name)?;
    state.containers.restart(&project).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub instance_type: String,
}

pub async fn resize_project(
    State(state): State<ControlApiState>,
    Path(name): Path<String>,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<Value>, ApiError> {
    let worker = load_worker_row(&state, &name)?.ok_or_else(|| err(StatusCode::BAD_REQUEST, "project has no worker to resize"))?;
    state
        .provisioner
        .resize(&worker.instance_id, &req.instance_type)
        .await
        .map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    #[serde(default = "default_exec_timeout")]
    pub timeout_secs: u64,
}

fn default_exec_timeout() -> u64 {
    30
}

pub async fn exec_project(
    State(state): State<ControlApiState>,
    Path(name): Path<String>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<Value>, ApiError> {
    let (exit_code, stdout, stderr) = state
        .containers
        .exec(&name, &req.cmd, req.timeout_secs)
        .await
        .map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"exit_code": exit_code, "stdout": stdout, "stderr": stderr})))
}

pub async fn write_task(State(state): State<ControlApiState>, Path(name): Path<String>, Json(mut task): Json<Value>) -> Result<Json<Value>, ApiError> {
    if let Some(obj) = task.as_object_mut() {
        obj.entry("limits").or_insert_with(|| json!({"maxIdleTurns": 20}));
        obj.entry("type").or_insert_with(|| json!("subjective"));
    }
    workspace::write_task(&state.containers, &name, &task).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct TaskControlRequest {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

/// `respond` writes an answer straight into the task document's matching
/// question (Supervisor picks it up on its next `load`); every other action
/// is a live control frame relayed through the project's Gateway.
pub async fn task_control(
    State(state): State<ControlApiState>,
    Path((name, action)): Path<(String, String)>,
    Json(req): Json<TaskControlRequest>,
) -> Result<Json<Value>, ApiError> {
    if action == "respond" {
        let (Some(question_id), Some(answer)) = (req.question_id, req.answer) else {
            return Err(err(StatusCode::BAD_REQUEST, "respond requires question_id and answer"));
        };
        let mut task = workspace::read_task(&state.containers, &name)
            .await
            .map_err(|e| err(StatusCode::BAD_GATEWAY, e))?
            .ok_or_else(|| err(StatusCode::NOT_FOUND, "no task document for project"))?;
        let found = task
            .get_mut("questions")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten()
            .find(|q| q.get("id").and_then(Value::as_str) == Some(question_id.as_str()))
            .map(|q| {
                q["answer"] = json!(answer);
                q["answeredAt"] = json!(chrono::Utc::now().to_rfc3339());
            })
            .is_some();
        if !found {
            return Err(err(StatusCode::NOT_FOUND, "no such question"));
        }
        workspace::write_task(&state.containers, &name, &task).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
        return Ok(Json(json!({"ok": true})));
    }

    if !matches!(action.as_str(), "pause" | "resume" | "stop" | "restart") {
        return Err(err(StatusCode::BAD_REQUEST, format!("unknown task action: {action}")));
    }
    let response = state
        .containers
        .supervisor_control(&name, json!({"action": action}))
        .await
        .map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SecretRequest {
    pub key: String,
    pub value: String,
}

pub async fn put_secret(
    State(state): State<ControlApiState>,
    Path(name): Path<String>,
    Json(req): Json<SecretRequest>,
) -> Result<Json<Value>, ApiError> {
    if !is_valid_secret_key(&req.key) {
        return Err(err(StatusCode::BAD_REQUEST, "invalid secret key"));
    }
    let value_ciphertext = state.secretbox.encrypt_str(&req.value);
    let row = NewSecret::new(&name, &req.key, value_ciphertext);

    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::insert_into(s::secrets)
            .values(&row)
            .on_conflict((s::project_name, s::key))
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(internal)?;

    Ok(Json(json!({"ok": true})))
}

pub async fn list_secrets(State(state): State<ControlApiState>, Path(name): Path<String>) -> Result<Json<Vec<String>>, ApiError> {
    let pool = state.pool.clone();
    let rows = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        s::secrets.filter(s::project_name.eq(&name)).load::<Secret>(&mut conn).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(internal)?;

    Ok(Json(rows.into_iter().map(|r| r.key).collect()))
}

pub async fn delete_secret(State(state): State<ControlApiState>, Path((name, key)): Path<(String, String)>) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::delete(s::secrets.filter(s::project_name.eq(&name).and(s::key.eq(&key)))).execute(&mut conn).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(internal)?;

    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct SupervisorActionRequest {
    pub action: String,
}

pub async fn supervisor_action(
    State(state): State<ControlApiState>,
    Path(name): Path<String>,
    Json(req): Json<SupervisorActionRequest>,
) -> Result<Json<Value>, ApiError> {
    if !matches!(req.action.as_str(), "pause" | "resume" | "stop" | "restart") {
        return Err(err(StatusCode::BAD_REQUEST, "unknown supervisor action"));
    }
    let response = state
        .containers
        .supervisor_control(&name, json!({"action": req.action}))
        .await
        .map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(response))
}

pub async fn get_memory(State(state): State<ControlApiState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let memory = workspace::read_memory(&state.containers, &name).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(memory))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_lines")]
    pub lines: u32,
}

fn default_log_lines() -> u32 {
    200
}

pub async fn get_logs(State(state): State<ControlApiState>, Path(name): Path<String>, Query(q): Query<LogsQuery>) -> Result<Json<Value>, ApiError> {
    let lines = workspace::read_logs(&state.containers, &name, q.lines).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"lines": lines})))
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

pub async fn send_message(
    State(state): State<ControlApiState>,
    Path(name): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<Value>, ApiError> {
    state.containers.send_message(&name, &req.message).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"ok": true})))
}

pub async fn list_directives(State(state): State<ControlApiState>, Path(name): Path<String>) -> Result<Json<Vec<Value>>, ApiError> {
    let directives = workspace::read_directives(&state.containers, &name).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(directives))
}

#[derive(Debug, Deserialize)]
pub struct DirectiveRequest {
    pub text: String,
}

pub async fn add_directive(
    State(state): State<ControlApiState>,
    Path(name): Path<String>,
    Json(req): Json<DirectiveRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut directives = workspace::read_directives(&state.containers, &name).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    let id = uuid::Uuid::new_v4().to_string();
    directives.push(json!({"id": id, "text": req.text, "createdAt": chrono::Utc::now().to_rfc3339()}));
    workspace::write_directives(&state.containers, &name, &directives).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"id": id})))
}

pub async fn delete_directive(
    State(state): State<ControlApiState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let mut directives = workspace::read_directives(&state.containers, &name).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    directives.retain(|d| d.get("id").and_then(|v| v.as_str()) != Some(id.as_str()));
    workspace::write_directives(&state.containers, &name, &directives).await.map_err(|e| err(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub instance_id: String,
}

pub async fn worker_heartbeat(
    State(state): State<ControlApiState>,
    Path(project): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::update(
            w::workers
                .filter(w::instance_id.eq(&req.instance_id))
                .filter(w::project_name.eq(&project)),
        )
        .set(w::last_heartbeat.eq(chrono::Utc::now().to_rfc3339()))
        .execute(&mut conn)
        .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal(e))?
    .map_err(internal)?;

    Ok(Json(json!({"ok": true})))
}
