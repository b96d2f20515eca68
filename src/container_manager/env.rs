//! Deterministic sandbox environment composition.

use std::collections::HashMap;

use crate::database::models::{Project, Secret, Worker};
use crate::secretbox::SecretBox;

/// Resources actually applied to the sandbox, after the local/worker split
/// below.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveResources {
    pub cpus: f64,
    pub memory_mb: u64,
}

/// Local-mode defaults versus a worker's reported host capability: worker
/// mode always wins and applies the 10% memory headroom; local mode takes
/// the minimum of configured defaults and host capability.
pub fn effective_resources(
    worker: Option<&Worker>,
    host_cpus: Option<f64>,
    host_memory_mb: Option<u64>,
    default_cpus: f64,
    default_memory_mb: u64,
) -> EffectiveResources {
    match (worker, host_cpus, host_memory_mb) {
        (Some(_), Some(cpus), Some(memory_mb)) => EffectiveResources {
            cpus,
            memory_mb: (memory_mb as f64 * 0.9) as u64,
        },
        _ => EffectiveResources {
            cpus: default_cpus.min(host_cpus.unwrap_or(default_cpus)),
            memory_mb: default_memory_mb.min(host_memory_mb.unwrap_or(default_memory_mb)),
        },
    }
}

/// Builds the sandbox env map for `project`, decrypting its credential and
/// extra-env blobs and merging in per-project secrets and instance
/// awareness.
pub fn compose_env(
    secretbox: &SecretBox,
    project: &Project,
    secrets: &[Secret],
    workspace_path: &str,
    worker: Option<&Worker>,
    host_cpus: f64,
    host_memory_mb: u64,
    resources: EffectiveResources,
) -> Result<HashMap<String, String>, String> {
    let mut env = HashMap::new();

    env.insert("PROJECT_NAME".to_owned(), project.name.clone());

    let llm_api_key = secretbox.decrypt_str(&project.llm_credential_ciphertext).map_err(|e| e.to_string())?;
    env.insert("LLM_API_KEY".to_owned(), llm_api_key);

    env.insert("MCP_SERVERS".to_owned(), project.mcp_servers_json.clone());
    env.insert("WORKSPACE".to_owned(), workspace_path.to_owned());

    for secret in secrets {
        let value = secretbox.decrypt_str(&secret.value_ciphertext).map_err(|e| e.to_string())?;
        env.insert(secret.key.clone(), value);
    }

    let extra_env_json = secretbox.decrypt_str(&project.extra_env_ciphertext).unwrap_or_else(|_| "{}".to_owned());
    let extra_env: HashMap<String, String> = serde_json::from_str(&extra_env_json).unwrap_or_default();
    env.extend(extra_env);

    env.insert(
        "INSTANCE_TYPE".to_owned(),
        worker.map(|w| w.instance_type.clone()).unwrap_or_else(|| "local".to_owned()),
    );
    env.insert("INSTANCE_CPUS".to_owned(), resources.cpus.to_string());
    env.insert("INSTANCE_MEMORY_MB".to_owned(), resources.memory_mb.to_string());
    env.insert("HOST_CPUS".to_owned(), host_cpus.to_string());
    env.insert("HOST_MEMORY_MB".to_owned(), host_memory_mb.to_string());

    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> Project {
        let sb = SecretBox::new("test-master").unwrap();
        Project {
            name: "demo".to_owned(),
            status: "running".to_owned(),
            llm_credential_ciphertext: sb.encrypt_str("sk-ant-test"),
            extra_env_ciphertext: sb.encrypt_str(r#"{"EXTRA_ONE":"v1"}"#),
            mcp_servers_json: r#"["server-a"]"#.to_owned(),
            instance_type: None,
            worker_id: None,
            created_at: "now".to_owned(),
            updated_at: "now".to_owned(),
        }
    }

    #[test]
    fn composes_env_with_decrypted_values_and_instance_awareness() {
        let sb = SecretBox::new("test-master").unwrap();
        let project = sample_project();
        let resources = EffectiveResources { cpus: 2.0, memory_mb: 2048 };

        let env = compose_env(&sb, &project, &[], "/workspace", None, 4.0, 8192, resources).unwrap();

        assert_eq!(env.get("PROJECT_NAME").unwrap(), "demo");
        assert_eq!(env.get("LLM_API_KEY").unwrap(), "sk-ant-test");
        assert_eq!(env.get("MCP_SERVERS").unwrap(), r#"["server-a"]"#);
        assert_eq!(env.get("WORKSPACE").unwrap(), "/workspace");
        assert_eq!(env.get("EXTRA_ONE").unwrap(), "v1");
        assert_eq!(env.get("INSTANCE_TYPE").unwrap(), "local");
        assert_eq!(env.get("INSTANCE_CPUS").unwrap(), "2");
        assert_eq!(env.get("HOST_CPUS").unwrap(), "4");
    }

    #[test]
    fn worker_mode_applies_memory_headroom() {
        let resources = effective_resources(
            Some(&Worker {
                instance_id: "i-1".into(),
                project_name: "demo".into(),
                instance_type: "m5.large".into(),
                region: "us-east-1".into(),
                availability_zone: "us-east-1a".into(),
                private_ip: None,
                public_ip: None,
                status: "ready".into(),
                worker_token_ciphertext: "ciphertext".into(),
                created_at: "now".into(),
                last_heartbeat: None,
            }),
            Some(2.0),
            Some(8192),
            4.0,
            16384,
        );
        assert_eq!(resources.cpus, 2.0);
        assert_eq!(resources.memory_mb, 7372);
    }

    #[test]
    fn local_mode_takes_minimum_of_default_and_host() {
        let resources = effective_resources(None, Some(1.0), Some(1024), 4.0, 4096);
        assert_eq!(resources.cpus, 1.0);
        assert_eq!(resources.memory_mb, 1024);
    }
}
