//! Shared WorkerAgent state: the sandbox handle, host capability, and the
//! worker's own identity.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::sandbox::Sandbox;

pub const GATEWAY_PORT: u16 = 7900;
pub const HEALTH_WAIT_TIMEOUT_SECS: u64 = 120;
pub const HEALTH_WAIT_INTERVAL_SECS: u64 = 2;

#[derive(Clone)]
pub struct WorkerState {
    pub worker_token: String,
    pub host_cpus: f64,
    pub host_memory_mb: u64,
    pub instance_type: String,
    pub control_plane_heartbeat_url: String,
    pub instance_id: String,
    sandbox: Arc<Mutex<Sandbox>>,
}

impl WorkerState {
    pub fn new(
        sandbox: Sandbox,
        worker_token: impl Into<String>,
        host_cpus: f64,
        host_memory_mb: u64,
        instance_type: impl Into<String>,
        instance_id: impl Into<String>,
        control_plane_heartbeat_url: impl Into<String>,
    ) -> Self {
        Self {
            worker_token: worker_token.into(),
            host_cpus,
            host_memory_mb,
            instance_type: instance_type.into(),
            control_plane_heartbeat_url: control_plane_heartbeat_url.into(),
            instance_id: instance_id.into(),
            sandbox: Arc::new(Mutex::new(sandbox)),
        }
    }

    pub fn sandbox(&self) -> &Mutex<Sandbox> {
        &self.sandbox
    }
}
