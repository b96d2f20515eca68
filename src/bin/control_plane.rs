//! ControlPlane entry point: loads config, brings up the store, and serves
//! the operator-facing ControlAPI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use mesoclaw_fleet::config::loader::load_config;
use mesoclaw_fleet::container_manager::{ContainerManager, ContainerManagerConfig};
use mesoclaw_fleet::control_api::{self, ControlApiConfig, ControlApiState};
use mesoclaw_fleet::database;
use mesoclaw_fleet::provisioner::fake::InMemoryProvider;
use mesoclaw_fleet::provisioner::Provisioner;
use mesoclaw_fleet::sandbox;
use mesoclaw_fleet::secretbox::SecretBox;
use mesoclaw_fleet::telemetry;

/// No real cloud SDK lives in the dependency stack this binary was built
/// from, so the reference in-memory provider ships as the only
/// `CloudProvider` — see DESIGN.md.
const FAKE_PROVIDER_BOOT_DELAY: Duration = Duration::from_secs(20);

#[derive(Parser, Debug)]
#[command(name = "control-plane", about = "MesoClaw fleet control plane")]
struct Args {
    /// Path to a TOML config file. Defaults to `MESOCLAW_CONFIG` or ./mesoclaw.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    telemetry::init("control-plane");
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(mesoclaw_fleet::config::loader::default_config_path);
    let config = load_config(&config_path)?;

    let master_secret = std::env::var("MESOCLAW_MASTER_SECRET").map_err(|_| "MESOCLAW_MASTER_SECRET is not set".to_owned())?;
    let secretbox = Arc::new(SecretBox::new(&master_secret).map_err(|e| e.to_string())?);

    let pool = database::init(&config.store.path, config.store.pool_size).map_err(|e| e.to_string())?;

    let runtime = sandbox::detect_runtime().ok_or_else(|| "no container runtime found (install docker or podman)".to_owned())?;
    let containers = Arc::new(ContainerManager::new(
        pool.clone(),
        Arc::clone(&secretbox),
        runtime,
        ContainerManagerConfig {
            default_cpus: config.container_manager.default_cpus,
            default_memory_mb: config.container_manager.default_memory_mb,
            workspace_path: config.container_manager.workspace_path.clone(),
        },
    ));

    let region = std::env::var("MESOCLAW_REGION").unwrap_or_else(|_| "us-east-1".to_owned());
    let provider = Arc::new(InMemoryProvider::new(FAKE_PROVIDER_BOOT_DELAY));
    let provisioner = Arc::new(Provisioner::new(pool.clone(), provider, Arc::clone(&secretbox), region));

    let state = ControlApiState {
        pool,
        secretbox,
        containers,
        provisioner,
    };

    let bind_addr = config.control_api.bind.parse().map_err(|e| format!("invalid control_api.bind: {e}"))?;
    control_api::run(ControlApiConfig { bind_addr }, state).await
}
