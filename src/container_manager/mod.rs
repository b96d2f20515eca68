//! ContainerManager (C8): decides whether to drive a project's sandbox
//! in-process or through its WorkerAgent, and composes the env every
//! create/restart receives.

pub mod env;
pub mod routing;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use diesel::prelude::*;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::database::models::{Project, Secret, Worker};
use crate::database::schema::{secrets::dsl as s, workers::dsl as w};
use crate::database::DbPool;
use crate::sandbox::{ContainerRuntime, Sandbox};
use crate::secretbox::SecretBox;

pub use env::{compose_env, effective_resources, EffectiveResources};
pub use routing::{decide_mode, Mode};

const HEALTH_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_WAIT_INTERVAL: Duration = Duration::from_secs(2);
const WORKER_AGENT_PORT: u16 = 7800;

pub struct ContainerManagerConfig {
    pub default_cpus: u32,
    pub default_memory_mb: u64,
    pub workspace_path: String,
}

pub struct ContainerManager {
    pool: DbPool,
    secretbox: Arc<SecretBox>,
    runtime: Arc<dyn ContainerRuntime>,
    config: ContainerManagerConfig,
    local_sandboxes: Mutex<HashMap<String, Sandbox>>,
}

impl ContainerManager {
    pub fn new(pool: DbPool, secretbox: Arc<SecretBox>, runtime: Arc<dyn ContainerRuntime>, config: ContainerManagerConfig) -> Self {
        Self {
            pool,
            secretbox,
            runtime,
            config,
            local_sandboxes: Mutex::new(HashMap::new()),
        }
    }

    fn load_worker(&self, project_name: &str) -> Result<Option<Worker>, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;
        w::workers
            .filter(w::project_name.eq(project_name))
            .first::<Worker>(&mut conn)
            .optional()
            .map_err(|e| e.to_string())
    }

    fn load_secrets(&self, project_name: &str) -> Result<Vec<Secret>, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;
        s::secrets.filter(s::project_name.eq(project_name)).load::<Secret>(&mut conn).map_err(|e| e.to_string())
    }

    fn mark_project_error(&self, project_name: &str) {
        use crate::database::schema::projects::dsl as p;
        let Ok(mut conn) = self.pool.get() else { return };
        let _ = diesel::update(p::projects.filter(p::name.eq(project_name)))
            .set(p::status.eq("error"))
            .execute(&mut conn);
    }

    fn mark_project_running(&self, project_name: &str) {
        use crate::database::schema::projects::dsl as p;
        let Ok(mut conn) = self.pool.get() else { return };
        let _ = diesel::update(p::projects.filter(p::name.eq(project_name)))
            .set(p::status.eq("running"))
            .execute(&mut conn);
    }

    /// Creates (or reuses) the sandbox for `project`, composing its env
    /// deterministically and routing to local execution or the project's
    /// ready worker.
    pub async fn create(&self, project: &Project) -> Result<(), String> {
        let worker = self.load_worker(&project.name)?;
        let secrets = self.load_secrets(&project.name)?;
        let mode = decide_mode(worker.as_ref());

        let host_cpus = crate::hostinfo::num_cpus();
        let host_memory_mb = crate::hostinfo::total_memory_mb();
        let resources = effective_resources(
            worker.as_ref(),
            worker.as_ref().map(|_| host_cpus),
            worker.as_ref().map(|_| host_memory_mb),
            self.config.default_cpus as f64,
            self.config.default_memory_mb,
        );

        let env = compose_env(
            &self.secretbox,
            project,
            &secrets,
            &self.config.workspace_path,
            worker.as_ref(),
            host_cpus,
            host_memory_mb,
            resources,
        )?;

        let result = match &mode {
            Mode::Local => self.create_local(&project.name, env, resources).await,
            Mode::Remote { instance_id } => self.create_remote(instance_id, env).await,
        };

        match &result {
            Ok(()) => self.mark_project_running(&project.name),
            Err(_) => self.mark_project_error(&project.name),
        }
        result
    }

    async fn create_local(&self, project_name: &str, env: HashMap<String, String>, resources: EffectiveResources) -> Result<(), String> {
        let mut sandboxes = self.local_sandboxes.lock().await;
        let sandbox = sandboxes
            .entry(project_name.to_owned())
            .or_insert_with(|| Sandbox::new(Arc::clone(&self.runtime), project_name));
        sandbox.create(env, resources.cpus, resources.memory_mb).await.map_err(|e| e.to_string())?;
        wait_for_gateway_health(sandbox).await
    }

    async fn create_remote(&self, instance_id: &str, env: HashMap<String, String>) -> Result<(), String> {
        let worker = self
            .load_worker_by_instance(instance_id)?
            .ok_or_else(|| "worker not found".to_owned())?;
        let token = self.secretbox.decrypt_str(&worker.worker_token_ciphertext).map_err(|e| e.to_string())?;
        let ip = worker.private_ip.or(worker.public_ip).ok_or_else(|| "worker has no address".to_owned())?;

        let client = reqwest::Client::new();
        let url = format!("http://{ip}:{WORKER_AGENT_PORT}/container/create");
        let resp = client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({"env": env}))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("worker agent create failed: {}", resp.status()));
        }
        Ok(())
    }

    fn load_worker_by_instance(&self, instance_id: &str) -> Result<Option<Worker>, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;
        w::workers.filter(w::instance_id.eq(instance_id)).first::<Worker>(&mut conn).optional().map_err(|e| e.to_string())
    }

    pub async fn destroy(&self, project_name: &str, remove_volume: bool) -> Result<(), String> {
        let worker = self.load_worker(project_name)?;
        match decide_mode(worker.as_ref()) {
            Mode::Local => {
                let mut sandboxes = self.local_sandboxes.lock().await;
                if let Some(sandbox) = sandboxes.get_mut(project_name) {
                    sandbox.destroy(remove_volume).await.map_err(|e| e.to_string())?;
                }
                if remove_volume {
                    sandboxes.remove(project_name);
                }
                Ok(())
            }
            Mode::Remote { instance_id } => {
                let worker = self.load_worker_by_instance(&instance_id)?.ok_or_else(|| "worker not found".to_owned())?;
                let token = self.secretbox.decrypt_str(&worker.worker_token_ciphertext).map_err(|e| e.to_string())?;
                let ip = worker.private_ip.or(worker.public_ip).ok_or_else(|| "worker has no address".to_owned())?;
                let client = reqwest::Client::new();
                let url = format!("http://{ip}:{WORKER_AGENT_PORT}/container/destroy");
                client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&serde_json::json!({"remove_volume": remove_volume}))
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(())
            }
        }
    }

    /// Destroys the sandbox without its volume, then re-creates it.
    pub async fn restart(&self, project: &Project) -> Result<(), String> {
        self.destroy(&project.name, false).await?;
        self.create(project).await
    }

    /// Forwards an operator chat message to the project's in-sandbox
    /// Gateway: directly by IP when running locally, through WorkerAgent's
    /// own `/message` endpoint when the project has a ready worker.
    pub async fn send_message(&self, project_name: &str, content: &str) -> Result<(), String> {
        let worker = self.load_worker(project_name)?;
        match decide_mode(worker.as_ref()) {
            Mode::Local => {
                let ip = self.local_sandbox_ip(project_name).await?;
                let url = format!("ws://{ip}:7900/ws");
                let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.map_err(|e| e.to_string())?;
                let frame = serde_json::json!({"type": "user_message", "content": content});
                use futures::SinkExt;
                socket
                    .send(tokio_tungstenite::tungstenite::Message::Text(frame.to_string()))
                    .await
                    .map_err(|e| e.to_string())?;
                let _ = socket.close(None).await;
                Ok(())
            }
            Mode::Remote { instance_id } => {
                let (client, url, token) = self.remote_request(&instance_id, "/message")?;
                let resp = client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&serde_json::json!({"content": content}))
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if !resp.status().is_success() {
                    return Err(format!("worker agent message failed: {}", resp.status()));
                }
                Ok(())
            }
        }
    }

    /// Issues a supervisor control action (pause/resume/stop/restart, or a
    /// task respond carrying `question_id`/`answer`) against the project's
    /// Supervisor, same local/remote split as [`Self::send_message`].
    pub async fn supervisor_control(&self, project_name: &str, payload: Value) -> Result<Value, String> {
        let worker = self.load_worker(project_name)?;
        match decide_mode(worker.as_ref()) {
            Mode::Local => {
                let ip = self.local_sandbox_ip(project_name).await?;
                let url = format!("http://{ip}:7900/supervisor/control");
                let client = reqwest::Client::new();
                let resp = client.post(&url).json(&payload).send().await.map_err(|e| e.to_string())?;
                resp.json::<Value>().await.map_err(|e| e.to_string())
            }
            Mode::Remote { instance_id } => {
                let (client, url, token) = self.remote_request(&instance_id, "/supervisor/control")?;
                let resp = client.post(&url).bearer_auth(token).json(&payload).send().await.map_err(|e| e.to_string())?;
                resp.json::<Value>().await.map_err(|e| e.to_string())
            }
        }
    }

    /// Opens a WS connection to the project's Gateway for relaying operator
    /// chat traffic: directly to the sandbox when running locally, through
    /// WorkerAgent's own `/gateway` relay (bearer-authed) otherwise.
    pub async fn connect_gateway_ws(&self, project_name: &str) -> Result<GatewayWsStream, String> {
        let worker = self.load_worker(project_name)?;
        match decide_mode(worker.as_ref()) {
            Mode::Local => {
                let ip = self.local_sandbox_ip(project_name).await?;
                connect_with_bearer(&format!("ws://{ip}:7900/ws"), None).await
            }
            Mode::Remote { instance_id } => {
                let worker = self.load_worker_by_instance(&instance_id)?.ok_or_else(|| "worker not found".to_owned())?;
                let token = self.secretbox.decrypt_str(&worker.worker_token_ciphertext).map_err(|e| e.to_string())?;
                let ip = worker.private_ip.or(worker.public_ip).ok_or_else(|| "worker has no address".to_owned())?;
                connect_with_bearer(&format!("ws://{ip}:{WORKER_AGENT_PORT}/gateway"), Some(&token)).await
            }
        }
    }

    async fn local_sandbox_ip(&self, project_name: &str) -> Result<String, String> {
        let sandboxes = self.local_sandboxes.lock().await;
        let sandbox = sandboxes.get(project_name).ok_or_else(|| "sandbox not created".to_owned())?;
        sandbox
            .ip()
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "sandbox has no address yet".to_owned())
    }

    fn remote_request(&self, instance_id: &str, path: &str) -> Result<(reqwest::Client, String, String), String> {
        let worker = self.load_worker_by_instance(instance_id)?.ok_or_else(|| "worker not found".to_owned())?;
        let token = self.secretbox.decrypt_str(&worker.worker_token_ciphertext).map_err(|e| e.to_string())?;
        let ip = worker.private_ip.or(worker.public_ip).ok_or_else(|| "worker has no address".to_owned())?;
        Ok((reqwest::Client::new(), format!("http://{ip}:{WORKER_AGENT_PORT}{path}"), token))
    }

    pub async fn exec(&self, project_name: &str, argv: &[String], timeout_secs: u64) -> Result<(i32, String, String), String> {
        let worker = self.load_worker(project_name)?;
        match decide_mode(worker.as_ref()) {
            Mode::Local => {
                let sandboxes = self.local_sandboxes.lock().await;
                let sandbox = sandboxes.get(project_name).ok_or_else(|| "sandbox not created".to_owned())?;
                let out = sandbox.exec(argv, timeout_secs).await.map_err(|e| e.to_string())?;
                Ok((out.exit_code, out.stdout, out.stderr))
            }
            Mode::Remote { instance_id } => {
                let worker = self.load_worker_by_instance(&instance_id)?.ok_or_else(|| "worker not found".to_owned())?;
                let token = self.secretbox.decrypt_str(&worker.worker_token_ciphertext).map_err(|e| e.to_string())?;
                let ip = worker.private_ip.or(worker.public_ip).ok_or_else(|| "worker has no address".to_owned())?;
                let client = reqwest::Client::new();
                let url = format!("http://{ip}:{WORKER_AGENT_PORT}/exec");
                let resp = client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&serde_json::json!({"argv": argv, "timeout_secs": timeout_secs}))
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                let body: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
                Ok((
                    body["exit_code"].as_i64().unwrap_or(-1) as i32,
                    body["stdout"].as_str().unwrap_or_default().to_owned(),
                    body["stderr"].as_str().unwrap_or_default().to_owned(),
                ))
            }
        }
    }
}

async fn wait_for_gateway_health(sandbox: &Sandbox) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + HEALTH_WAIT_TIMEOUT;
    let client = reqwest::Client::builder().timeout(HEALTH_WAIT_INTERVAL).build().map_err(|e| e.to_string())?;
    loop {
        if let Ok(Some(ip)) = sandbox.ip().await {
            let url = format!("http://{ip}:7900/health");
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err("gateway health check timed out".to_owned());
        }
        tokio::time::sleep(HEALTH_WAIT_INTERVAL).await;
    }
}

pub type GatewayWsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_with_bearer(url: &str, token: Option<&str>) -> Result<GatewayWsStream, String> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    let mut request = url.into_client_request().map_err(|e| e.to_string())?;
    if let Some(t) = token {
        let value = tokio_tungstenite::tungstenite::http::HeaderValue::from_str(&format!("Bearer {t}")).map_err(|e| e.to_string())?;
        request.headers_mut().insert("Authorization", value);
    }
    let (stream, _) = tokio_tungstenite::connect_async(request).await.map_err(|e| e.to_string())?;
    Ok(stream)
}

