//! AgentRuntime entry point: runs inside the sandbox container. Brings up
//! the Gateway (upstream multiplexer) and drives a Supervisor loop against
//! it as an ordinary WS client identifying itself as `supervisor`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use mesoclaw_fleet::config::loader::load_config;
use mesoclaw_fleet::event_bus::TokioBroadcastBus;
use mesoclaw_fleet::gateway::daemon::{self, GatewayConfig};
use mesoclaw_fleet::gateway::protocol::InstanceInfo;
use mesoclaw_fleet::gateway::upstream::EngineAuth;
use mesoclaw_fleet::supervisor::driver::SupervisorDriver;

mod runtime_client;
mod runtime_store;

use runtime_client::{RuntimeEvent, WsGatewayClient};
use runtime_store::FileTaskStore;

#[derive(Parser, Debug)]
#[command(name = "agent-runtime", about = "MesoClaw in-sandbox gateway + supervisor")]
struct Args {
    /// Path to a TOML config file. Defaults to `MESOCLAW_CONFIG` or ./mesoclaw.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn env_num<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), String> {
    mesoclaw_fleet::telemetry::init("agent-runtime");
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(mesoclaw_fleet::config::loader::default_config_path);
    let config = load_config(&config_path)?;

    // Instance capability is injected by ContainerManager::compose_env; see
    // container_manager::env::compose_env.
    let instance = InstanceInfo {
        instance_type: std::env::var("INSTANCE_TYPE").unwrap_or_else(|_| "local".to_owned()),
        cpus: env_num("INSTANCE_CPUS", 1.0),
        memory_mb: env_num("INSTANCE_MEMORY_MB", 1024),
        host_cpus: env_num("HOST_CPUS", 1.0),
        host_memory_mb: env_num("HOST_MEMORY_MB", 1024),
    };

    let gateway_bind: std::net::SocketAddr =
        config.gateway.bind.parse().map_err(|e| format!("invalid gateway.bind: {e}"))?;
    let engine_ws_url = format!("ws://127.0.0.1:{}/", config.gateway.engine_port);
    let engine_auth = EngineAuth {
        password: std::env::var("MESOCLAW_ENGINE_PASSWORD").ok(),
        token: std::env::var("MESOCLAW_ENGINE_TOKEN").ok(),
    };

    let events = Arc::new(TokioBroadcastBus::with_capacity(config.gateway.history_capacity.max(1)));
    let gateway_config = GatewayConfig {
        bind_addr: gateway_bind,
        engine_ws_url,
        engine_auth,
        project: config.supervisor.project.clone(),
        session_prefix: config.gateway.session_prefix.clone(),
        instance,
    };
    tokio::spawn(async move {
        if let Err(e) = daemon::run(gateway_config, events).await {
            tracing::error!(error = %e, "gateway exited");
        }
    });

    // Give the Gateway a moment to bind before Supervisor dials in as a client.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (runtime_tx, mut runtime_rx) = mpsc::unbounded_channel();
    let client = WsGatewayClient::connect(&config.supervisor.gateway_url, runtime_tx).await?;
    let store = FileTaskStore::new(&config.supervisor.workspace);
    let mut driver = SupervisorDriver::new(client, store, config.supervisor.project.clone());

    loop {
        tokio::select! {
            event = runtime_rx.recv() => {
                match event {
                    Some(RuntimeEvent::Control(action)) => {
                        if driver.handle_control(action) {
                            tracing::info!("supervisor received stop/restart, exiting");
                            return Ok(());
                        }
                    }
                    Some(RuntimeEvent::PresenceChanged(humans)) => driver.handle_presence_change(humans),
                    None => return Err("gateway client channel closed".to_owned()),
                }
            }
            step = driver.step() => {
                match step? {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => tokio::time::sleep(Duration::from_secs(5)).await,
                }
            }
        }
    }
}
