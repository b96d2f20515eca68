//! Periodic heartbeat POST to the control plane, grounded in the teacher's
//! `gateway::daemon` background-task spawn style: an initial delay, then a
//! fixed-interval loop for the life of the process.

use std::time::Duration;

use serde::Serialize;

use super::state::WorkerState;

const INITIAL_DELAY_SECS: u64 = 10;
const INTERVAL_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct HeartbeatPayload<'a> {
    instance_id: &'a str,
}

pub async fn run(state: WorkerState) {
    tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;
    let client = reqwest::Client::new();
    loop {
        let payload = HeartbeatPayload { instance_id: &state.instance_id };
        if let Err(e) = client.post(&state.control_plane_heartbeat_url).json(&payload).send().await {
            tracing::warn!(error = %e, "heartbeat post failed");
        }
        tokio::time::sleep(Duration::from_secs(INTERVAL_SECS)).await;
    }
}
