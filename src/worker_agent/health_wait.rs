//! Polls the in-sandbox Gateway's `/health` endpoint after create/restart,
//! the way `ContainerManager` does for its own create/restart retries
//! (same 120 s / 2 s cadence, different caller).

use std::time::Duration;

use crate::sandbox::Sandbox;

use super::state::{GATEWAY_PORT, HEALTH_WAIT_INTERVAL_SECS, HEALTH_WAIT_TIMEOUT_SECS};

pub async fn wait_for_gateway_health(sandbox: &Sandbox) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(HEALTH_WAIT_TIMEOUT_SECS);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HEALTH_WAIT_INTERVAL_SECS))
        .build()
        .map_err(|e| e.to_string())?;

    loop {
        if let Ok(Some(ip)) = sandbox.ip().await {
            let url = format!("http://{ip}:{GATEWAY_PORT}/health");
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err("gateway health check timed out".to_owned());
        }
        tokio::time::sleep(Duration::from_secs(HEALTH_WAIT_INTERVAL_SECS)).await;
    }
}
