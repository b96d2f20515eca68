//! Docker container runtime implementation.
//!
//! Uses the Docker CLI rather than the daemon socket, which avoids a bollard
//! dependency and works in restricted environments where the socket may not
//! be reachable.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::runtime::{ContainerRuntime, ContainerSpec, ExecOutput};

pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new(binary: String) -> Self {
        Self { binary }
    }

    fn build_run_args(&self, spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--memory".to_string(),
            format!("{}m", spec.memory_limit_mb),
            "--cpus".to_string(),
            format!("{}", spec.cpu_limit),
            "-v".to_string(),
            format!("{}:{}", spec.volume_name, spec.mount_path),
        ];

        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{k}={v}"));
        }

        args.push(spec.image.clone());
        args.push("sleep".to_string());
        args.push("infinity".to_string());
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn binary_name(&self) -> &str {
        &self.binary
    }

    fn is_available(&self) -> bool {
        std::path::Path::new(&self.binary).is_file() || which::which(&self.binary).is_ok()
    }

    async fn pull_image(&self, image: &str) -> Result<(), String> {
        let status = Command::new(&self.binary)
            .args(["pull", image])
            .status()
            .await
            .map_err(|e| format!("docker pull failed to start: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("docker pull '{image}' exited with status {status}"))
        }
    }

    async fn run_detached(&self, spec: &ContainerSpec) -> Result<String, String> {
        let args = self.build_run_args(spec);
        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to spawn docker container: {e}"))?;

        if !output.status.success() {
            return Err(format!(
                "docker run failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    async fn exec(
        &self,
        container_id: &str,
        argv: &[String],
        timeout_secs: u64,
    ) -> Result<ExecOutput, String> {
        let mut args = vec!["exec".to_string(), container_id.to_string()];
        args.extend(argv.iter().cloned());

        let fut = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), fut)
            .await
            .map_err(|_| format!("exec timed out after {timeout_secs}s"))?
            .map_err(|e| format!("docker exec failed to start: {e}"))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn inspect_ip(&self, container_id: &str) -> Result<Option<String>, String> {
        let output = Command::new(&self.binary)
            .args([
                "inspect",
                "-f",
                "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}",
                container_id,
            ])
            .output()
            .await
            .map_err(|e| format!("docker inspect failed to start: {e}"))?;
        if !output.status.success() {
            return Ok(None);
        }
        let ip = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(if ip.is_empty() { None } else { Some(ip) })
    }

    async fn is_running(&self, container_id: &str) -> Result<bool, String> {
        let output = Command::new(&self.binary)
            .args(["inspect", "-f", "{{.State.Running}}", container_id])
            .output()
            .await
            .map_err(|e| format!("docker inspect failed to start: {e}"))?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn teardown(&self, container_id: &str, volume_name: &str, remove_volume: bool) -> Result<(), String> {
        let _ = Command::new(&self.binary)
            .args(["rm", "-f", container_id])
            .status()
            .await;

        if remove_volume {
            let _ = Command::new(&self.binary)
                .args(["volume", "rm", volume_name])
                .status()
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn binary_name_reports_configured_binary() {
        let rt = DockerRuntime::new("docker".to_string());
        assert_eq!(rt.binary_name(), "docker");
    }

    #[test]
    fn unavailable_for_fake_binary() {
        let rt = DockerRuntime::new("/nonexistent/docker-xyzzy-fake".to_string());
        assert!(!rt.is_available());
    }

    #[test]
    fn run_args_include_detached_and_volume() {
        let rt = DockerRuntime::new("docker".to_string());
        let spec = ContainerSpec {
            image: "alpine:3.20".to_string(),
            name: "mesoclaw-demo".to_string(),
            volume_name: "mesoclaw-demo-workspace".to_string(),
            mount_path: "/workspace".to_string(),
            env: HashMap::new(),
            cpu_limit: 2.0,
            memory_limit_mb: 4096,
        };
        let args = rt.build_run_args(&spec);
        assert!(args.contains(&"-d".to_string()));
        assert!(args.iter().any(|a| a == "--memory"));
        assert!(args.iter().any(|a| a == "4096m"));
        assert!(args.contains(&"mesoclaw-demo-workspace:/workspace".to_string()));
        assert!(args.contains(&"sleep".to_string()));
    }
}
