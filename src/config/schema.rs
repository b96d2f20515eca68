//! TOML configuration schema for the fleet binaries.
//!
//! All fields have `#[serde(default)]` so a partially-filled config file
//! works correctly. Missing sections fall back to their `Default` impl.
//!
//! Example `control-plane.toml`:
//! ```toml
//! [store]
//! path = "/var/lib/mesoclaw/fleet.db"
//!
//! [control_api]
//! bind = "0.0.0.0:8443"
//!
//! [secretbox]
//! # master secret is read from MESOCLAW_MASTER_SECRET, never from file
//! ```

use serde::{Deserialize, Serialize};

// ─── StoreConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Max size of the r2d2 connection pool.
    pub pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "mesoclaw-fleet.db".to_owned(),
            pool_size: 10,
        }
    }
}

// ─── ControlApiConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlApiConfig {
    /// Address the ControlAPI HTTP+WS server binds to.
    pub bind: String,
}

impl Default for ControlApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8443".to_owned(),
        }
    }
}

// ─── WorkerAgentConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerAgentConfig {
    /// Address the WorkerAgent HTTP+WS server binds to.
    pub bind: String,
    /// Control-plane base URL this worker heartbeats to.
    pub control_plane_url: String,
    /// Heartbeat cadence, seconds.
    pub heartbeat_interval_secs: u64,
    /// Delay before the first heartbeat, seconds.
    pub heartbeat_initial_delay_secs: u64,
    /// Fraction of host memory left as headroom (0.0-1.0).
    pub memory_headroom_fraction: f64,
}

impl Default for WorkerAgentConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7800".to_owned(),
            control_plane_url: "http://127.0.0.1:8443".to_owned(),
            heartbeat_interval_secs: 60,
            heartbeat_initial_delay_secs: 10,
            memory_headroom_fraction: 0.10,
        }
    }
}

// ─── GatewayConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the in-sandbox Gateway HTTP+WS server binds to.
    pub bind: String,
    /// Local port the upstream LLM engine listens on.
    pub engine_port: u16,
    /// Session-key prefix (configurable, not hard-coded per the original source ambiguity).
    pub session_prefix: String,
    /// Max size of the event history ring.
    pub history_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7900".to_owned(),
            engine_port: 7901,
            session_prefix: "synv2".to_owned(),
            history_capacity: 50,
        }
    }
}

// ─── SupervisorConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Project name, used in prompt assembly.
    pub project: String,
    /// Path to the workspace root inside the sandbox.
    pub workspace: String,
    /// Gateway WS URL this supervisor connects to as a client.
    pub gateway_url: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            project: "unnamed".to_owned(),
            workspace: "/workspace".to_owned(),
            gateway_url: "ws://127.0.0.1:7900/ws".to_owned(),
        }
    }
}

// ─── ProvisionerConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Poll interval while waiting for a worker to come up, seconds.
    pub wait_poll_interval_secs: u64,
    /// Max time to wait for a worker to become ready, seconds.
    pub wait_timeout_secs: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            wait_poll_interval_secs: 10,
            wait_timeout_secs: 300,
        }
    }
}

// ─── ContainerManagerConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContainerManagerConfig {
    /// Default CPU limit in local mode, when not overridden by instance capability.
    pub default_cpus: u32,
    /// Default memory limit (MB) in local mode.
    pub default_memory_mb: u64,
    /// Fixed workspace path injected into every sandbox env.
    pub workspace_path: String,
}

impl Default for ContainerManagerConfig {
    fn default() -> Self {
        Self {
            default_cpus: 2,
            default_memory_mb: 4096,
            workspace_path: "/workspace".to_owned(),
        }
    }
}

// ─── FleetConfig ──────────────────────────────────────────────────────────────

/// Top-level configuration, shared by all three binaries.
///
/// Each binary only reads the sections it needs; unused sections still
/// parse and default harmlessly so one config file can serve all three.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FleetConfig {
    pub store: StoreConfig,
    pub control_api: ControlApiConfig,
    pub worker_agent: WorkerAgentConfig,
    pub gateway: GatewayConfig,
    pub supervisor: SupervisorConfig,
    pub provisioner: ProvisionerConfig,
    pub container_manager: ContainerManagerConfig,
}
