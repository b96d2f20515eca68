//! WorkerAgent entry point: runs inside a provisioned compute instance and
//! exposes its one project's Sandbox over HTTP+WS to the control plane.
//!
//! Identity (`project`, `instance_id`, `worker_token`) is handed to the
//! instance at launch time via `LaunchSpec::user_data` and read back here
//! from the environment — the same contract `Provisioner::provision` writes
//! to when it calls `CloudProvider::launch`.

use std::path::PathBuf;

use clap::Parser;

use mesoclaw_fleet::config::loader::load_config;
use mesoclaw_fleet::hostinfo;
use mesoclaw_fleet::sandbox::{self, Sandbox};
use mesoclaw_fleet::worker_agent::{self, WorkerAgentConfig, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "worker-agent", about = "MesoClaw fleet worker agent")]
struct Args {
    /// Path to a TOML config file. Defaults to `MESOCLAW_CONFIG` or ./mesoclaw.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn env_var(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{name} is not set"))
}

#[tokio::main]
async fn main() -> Result<(), String> {
    mesoclaw_fleet::telemetry::init("worker-agent");
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(mesoclaw_fleet::config::loader::default_config_path);
    let config = load_config(&config_path)?;

    let project = env_var("MESOCLAW_PROJECT")?;
    let instance_id = env_var("MESOCLAW_INSTANCE_ID")?;
    let worker_token = env_var("MESOCLAW_WORKER_TOKEN")?;
    let instance_type = std::env::var("MESOCLAW_INSTANCE_TYPE").unwrap_or_else(|_| "unknown".to_owned());

    let runtime = sandbox::detect_runtime().ok_or_else(|| "no container runtime found (install docker or podman)".to_owned())?;
    let sandbox = Sandbox::new(runtime, &project);

    let heartbeat_url = format!("{}/api/workers/{project}/heartbeat", config.worker_agent.control_plane_url.trim_end_matches('/'));

    let state = WorkerState::new(
        sandbox,
        worker_token,
        hostinfo::num_cpus(),
        hostinfo::total_memory_mb(),
        instance_type,
        instance_id,
        heartbeat_url,
    );

    let bind_addr = config.worker_agent.bind.parse().map_err(|e| format!("invalid worker_agent.bind: {e}"))?;
    worker_agent::run(WorkerAgentConfig { bind_addr }, state).await
}
