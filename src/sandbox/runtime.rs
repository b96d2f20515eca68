//! Low-level container-runtime abstraction: detached long-lived containers
//! addressed by name, not the single-shot `run` a tool-call sandbox would use.

use async_trait::async_trait;
use std::collections::HashMap;

/// Parameters for bringing up a sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub volume_name: String,
    pub mount_path: String,
    pub env: HashMap<String, String>,
    pub cpu_limit: f64,
    pub memory_limit_mb: u64,
}

/// Result of `exec`. `stdout` is populated even on non-zero exit so the
/// caller can inspect command failure output.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn binary_name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn pull_image(&self, image: &str) -> Result<(), String>;

    /// Start `spec` detached, creating its named volume if absent. Returns
    /// the runtime-assigned container id.
    async fn run_detached(&self, spec: &ContainerSpec) -> Result<String, String>;

    /// Run `argv` inside the already-running container `container_id`.
    async fn exec(
        &self,
        container_id: &str,
        argv: &[String],
        timeout_secs: u64,
    ) -> Result<ExecOutput, String>;

    /// Internal IP address of the running container, if inspectable.
    async fn inspect_ip(&self, container_id: &str) -> Result<Option<String>, String>;

    /// `true` if the container is running.
    async fn is_running(&self, container_id: &str) -> Result<bool, String>;

    /// Stop and remove the container. `remove_volume` additionally removes
    /// the named volume. Idempotent: missing container/volume is not an error.
    async fn teardown(&self, container_id: &str, volume_name: &str, remove_volume: bool) -> Result<(), String>;
}

/// Detect the best available container runtime: podman first (rootless),
/// then docker, else `None`.
pub fn detect_runtime() -> Option<std::sync::Arc<dyn ContainerRuntime>> {
    if let Ok(path) = which::which("podman") {
        let binary = path.to_string_lossy().into_owned();
        return Some(std::sync::Arc::new(super::podman::PodmanRuntime::new(binary)));
    }
    if let Ok(path) = which::which("docker") {
        let binary = path.to_string_lossy().into_owned();
        return Some(std::sync::Arc::new(super::docker::DockerRuntime::new(binary)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_runtime_does_not_panic() {
        let _ = detect_runtime();
    }
}
