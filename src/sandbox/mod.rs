//! Sandbox: the capability set WorkerAgent (and the control plane in local
//! mode) uses to bring up, drive, and tear down one project's container.
//!
//! Adapter-agnostic: the reference adapter wraps whichever `ContainerRuntime`
//! `detect_runtime` finds (podman preferred, rootless; docker fallback).

pub mod docker;
pub mod podman;
pub mod runtime;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use runtime::{detect_runtime, ContainerRuntime, ContainerSpec, ExecOutput};

const DEFAULT_IMAGE: &str = "mesoclaw/agent-runtime:latest";
const MOUNT_PATH: &str = "/workspace";

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("no container runtime available (install docker or podman)")]
    NoRuntime,
    #[error("sandbox not created")]
    NotCreated,
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Liveness probe result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub running: bool,
    pub container_id: Option<String>,
}

/// One project's sandbox: a named, persistent container plus its workspace
/// volume. The volume outlives the container across `destroy`/`create`
/// cycles unless `remove_volume` is requested.
pub struct Sandbox {
    runtime: Arc<dyn ContainerRuntime>,
    project: String,
    image: String,
    container_id: Option<String>,
}

impl Sandbox {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, project: impl Into<String>) -> Self {
        Self {
            runtime,
            project: project.into(),
            image: DEFAULT_IMAGE.to_owned(),
            container_id: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    fn container_name(&self) -> String {
        format!("mesoclaw-{}", self.project)
    }

    fn volume_name(&self) -> String {
        format!("mesoclaw-{}-workspace", self.project)
    }

    /// Bring the sandbox online, creating or reusing the project's named
    /// workspace volume. Returns the container id.
    pub async fn create(
        &mut self,
        env: HashMap<String, String>,
        cpu_limit: f64,
        mem_limit_mb: u64,
    ) -> Result<String, SandboxError> {
        self.runtime
            .pull_image(&self.image)
            .await
            .map_err(SandboxError::Runtime)?;

        let spec = ContainerSpec {
            image: self.image.clone(),
            name: self.container_name(),
            volume_name: self.volume_name(),
            mount_path: MOUNT_PATH.to_owned(),
            env,
            cpu_limit,
            memory_limit_mb: mem_limit_mb,
        };

        let id = self
            .runtime
            .run_detached(&spec)
            .await
            .map_err(SandboxError::Runtime)?;
        self.container_id = Some(id.clone());
        Ok(id)
    }

    /// Stop and remove the container. Idempotent. The workspace volume is
    /// preserved unless `remove_volume` is set.
    pub async fn destroy(&mut self, remove_volume: bool) -> Result<(), SandboxError> {
        let Some(id) = self.container_id.take() else {
            return Ok(());
        };
        self.runtime
            .teardown(&id, &self.volume_name(), remove_volume)
            .await
            .map_err(SandboxError::Runtime)
    }

    /// Run `argv` inside the sandbox, returning combined exit code/stdout/stderr.
    /// `stdout` is populated on both success and failure.
    pub async fn exec(&self, argv: &[String], timeout_secs: u64) -> Result<ExecOutput, SandboxError> {
        let id = self.container_id.as_ref().ok_or(SandboxError::NotCreated)?;
        self.runtime
            .exec(id, argv, timeout_secs)
            .await
            .map_err(SandboxError::Runtime)
    }

    /// Internal address for the in-sandbox gateway.
    pub async fn ip(&self) -> Result<Option<String>, SandboxError> {
        let id = self.container_id.as_ref().ok_or(SandboxError::NotCreated)?;
        self.runtime.inspect_ip(id).await.map_err(SandboxError::Runtime)
    }

    pub async fn health(&self) -> Result<HealthStatus, SandboxError> {
        let Some(id) = self.container_id.as_ref() else {
            return Ok(HealthStatus {
                running: false,
                container_id: None,
            });
        };
        let running = self.runtime.is_running(id).await.map_err(SandboxError::Runtime)?;
        Ok(HealthStatus {
            running,
            container_id: Some(id.clone()),
        })
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeRuntime {
        next_id: String,
        running: Mutex<bool>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        fn binary_name(&self) -> &str {
            "fake"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn pull_image(&self, _image: &str) -> Result<(), String> {
            Ok(())
        }
        async fn run_detached(&self, _spec: &ContainerSpec) -> Result<String, String> {
            *self.running.lock().unwrap() = true;
            Ok(self.next_id.clone())
        }
        async fn exec(&self, _id: &str, argv: &[String], _timeout: u64) -> Result<ExecOutput, String> {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: argv.join(" "),
                stderr: String::new(),
            })
        }
        async fn inspect_ip(&self, _id: &str) -> Result<Option<String>, String> {
            Ok(Some("10.0.0.5".to_owned()))
        }
        async fn is_running(&self, _id: &str) -> Result<bool, String> {
            Ok(*self.running.lock().unwrap())
        }
        async fn teardown(&self, _id: &str, _vol: &str, _remove_volume: bool) -> Result<(), String> {
            *self.running.lock().unwrap() = false;
            Ok(())
        }
    }

    fn fake_sandbox() -> Sandbox {
        let rt = Arc::new(FakeRuntime {
            next_id: "ctr-1".to_owned(),
            running: Mutex::new(false),
        });
        Sandbox::new(rt, "demo")
    }

    #[tokio::test]
    async fn create_then_exec_then_destroy() {
        let mut sb = fake_sandbox();
        let id = sb.create(HashMap::new(), 2.0, 4096).await.unwrap();
        assert_eq!(id, "ctr-1");

        let out = sb.exec(&["echo".to_string(), "hi".to_string()], 5).await.unwrap();
        assert_eq!(out.stdout, "echo hi");

        let health = sb.health().await.unwrap();
        assert!(health.running);

        sb.destroy(false).await.unwrap();
        let health = sb.health().await.unwrap();
        assert!(!health.running);
    }

    #[tokio::test]
    async fn exec_before_create_fails() {
        let sb = fake_sandbox();
        let err = sb.exec(&["echo".to_string()], 5).await.unwrap_err();
        assert!(matches!(err, SandboxError::NotCreated));
    }

    #[tokio::test]
    async fn destroy_without_create_is_idempotent() {
        let mut sb = fake_sandbox();
        sb.destroy(true).await.unwrap();
    }

    #[tokio::test]
    async fn ip_reports_inspected_address() {
        let mut sb = fake_sandbox();
        sb.create(HashMap::new(), 1.0, 1024).await.unwrap();
        assert_eq!(sb.ip().await.unwrap(), Some("10.0.0.5".to_owned()));
    }
}
