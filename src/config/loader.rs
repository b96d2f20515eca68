//! TOML configuration loading and env-var overrides.
//!
//! # Loading order
//! 1. Parse the file at `MESOCLAW_CONFIG`, or the default path, if present.
//! 2. Apply `MESOCLAW_*` environment variable overrides.
//! 3. Fall back to [`FleetConfig::default()`] if the file is missing.

use std::{env, fs, path::Path, path::PathBuf};

use super::schema::FleetConfig;

/// Default config file path: `./mesoclaw.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("mesoclaw.toml")
}

/// Load [`FleetConfig`] from `path`, falling back to defaults if the file
/// does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<FleetConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<FleetConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FleetConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from `MESOCLAW_CONFIG` or the default path.
pub fn load_default_config() -> Result<FleetConfig, String> {
    let path = env::var("MESOCLAW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    load_config(&path)
}

/// Apply `MESOCLAW_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `MESOCLAW_STORE_PATH`      → `store.path`
/// - `MESOCLAW_CONTROL_API_BIND` → `control_api.bind`
/// - `MESOCLAW_WORKER_BIND`     → `worker_agent.bind`
/// - `MESOCLAW_CONTROL_PLANE_URL` → `worker_agent.control_plane_url`
/// - `MESOCLAW_GATEWAY_PORT`    → `gateway.bind` (port segment only)
/// - `MESOCLAW_ENGINE_PORT`    → `gateway.engine_port`
/// - `MESOCLAW_PROJECT`         → `supervisor.project`
fn apply_env_overrides(config: &mut FleetConfig) {
    if let Ok(v) = env::var("MESOCLAW_STORE_PATH") {
        config.store.path = v;
    }
    if let Ok(v) = env::var("MESOCLAW_CONTROL_API_BIND") {
        config.control_api.bind = v;
    }
    if let Ok(v) = env::var("MESOCLAW_WORKER_BIND") {
        config.worker_agent.bind = v;
    }
    if let Ok(v) = env::var("MESOCLAW_CONTROL_PLANE_URL") {
        config.worker_agent.control_plane_url = v;
    }
    if let Ok(v) = env::var("MESOCLAW_GATEWAY_PORT")
        && let Ok(port) = v.parse::<u16>()
        && let Some(colon) = config.gateway.bind.rfind(':')
    {
        config.gateway.bind = format!("{}:{port}", &config.gateway.bind[..colon]);
    }
    if let Ok(v) = env::var("MESOCLAW_ENGINE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        config.gateway.engine_port = port;
    }
    if let Ok(v) = env::var("MESOCLAW_PROJECT") {
        config.supervisor.project = v;
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("mesoclaw.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, FleetConfig::default());
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[store]
path = "/tmp/custom.db"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.store.path, "/tmp/custom.db");
        assert_eq!(config.store.pool_size, 10);
        assert_eq!(config.gateway.history_capacity, 50);
    }

    #[test]
    fn load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[store]
path = "fleet.db"
pool_size = 20

[control_api]
bind = "0.0.0.0:9000"

[gateway]
bind = "0.0.0.0:7000"
engine_port = 7001
history_capacity = 100
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.store.pool_size, 20);
        assert_eq!(config.control_api.bind, "0.0.0.0:9000");
        assert_eq!(config.gateway.engine_port, 7001);
        assert_eq!(config.gateway.history_capacity, 100);
    }

    #[test]
    fn env_override_store_path() {
        let key = "MESOCLAW_STORE_PATH";
        // SAFETY: single-threaded test context; no other threads read this var.
        unsafe {
            env::set_var(key, "/tmp/override.db");
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let config = load_config(&path).unwrap();
        // SAFETY: same as set_var above.
        unsafe {
            env::remove_var(key);
        }
        assert_eq!(config.store.path, "/tmp/override.db");
    }

    #[test]
    fn env_override_gateway_port() {
        let key = "MESOCLAW_GATEWAY_PORT";
        // SAFETY: single-threaded test context; no other threads read this var.
        unsafe {
            env::set_var(key, "7999");
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let config = load_config(&path).unwrap();
        // SAFETY: same as set_var above.
        unsafe {
            env::remove_var(key);
        }
        assert_eq!(config.gateway.bind, "127.0.0.1:7999");
    }

    #[test]
    fn env_override_engine_port() {
        let key = "MESOCLAW_ENGINE_PORT";
        // SAFETY: single-threaded test context; no other threads read this var.
        unsafe {
            env::set_var(key, "9999");
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let config = load_config(&path).unwrap();
        // SAFETY: same as set_var above.
        unsafe {
            env::remove_var(key);
        }
        assert_eq!(config.gateway.engine_port, 9999);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "this is not valid toml!!!");
        let result = load_config(&path);
        assert!(result.is_err(), "invalid TOML should return an error");
    }
}
