//! WS client adapter: AgentRuntime dials its own sandbox's Gateway over
//! `/ws`, identifying as `supervisor`, and translates downstream frames into
//! the `GatewayClient` surface the turn driver expects — grounded in the
//! Gateway's own upstream session loop (`gateway::upstream::connect_and_drive`)
//! for the reconnect/backoff shape, here simplified to a fixed retry delay
//! since this is a loopback connection, not a flaky external one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use mesoclaw_fleet::event_bus::{ClientRole, GatewayEvent};
use mesoclaw_fleet::gateway::protocol::{ClientFrame, DownstreamFrame};
use mesoclaw_fleet::supervisor::driver::{GatewayClient, PresenceSnapshot};
use mesoclaw_fleet::supervisor::state::SupervisorControlAction;

const PRESENCE_SETTLE_DELAY: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Delivered to the driving loop as control/presence frames arrive off the
/// Gateway connection.
pub enum RuntimeEvent {
    Control(SupervisorControlAction),
    PresenceChanged(u32),
}

struct Shared {
    presence: Mutex<PresenceSnapshot>,
    events_tx: broadcast::Sender<GatewayEvent>,
}

pub struct WsGatewayClient {
    http_base: String,
    http: reqwest::Client,
    shared: Arc<Shared>,
}

impl WsGatewayClient {
    /// Connects to the Gateway's `/ws` and spawns a background task that
    /// keeps the connection alive, republishing events on an internal bus
    /// and forwarding control/presence changes through `runtime_tx`.
    pub async fn connect(gateway_ws_url: &str, runtime_tx: mpsc::UnboundedSender<RuntimeEvent>) -> Result<Self, String> {
        let http_base = http_base_from_ws(gateway_ws_url)?;
        let (events_tx, _rx) = broadcast::channel(256);
        let shared = Arc::new(Shared {
            presence: Mutex::new(PresenceSnapshot::default()),
            events_tx,
        });

        let url = gateway_ws_url.to_owned();
        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                if let Err(e) = run_once(&url, &task_shared, &runtime_tx).await {
                    tracing::warn!(error = %e, "supervisor lost connection to gateway, reconnecting");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        Ok(Self { http_base, http: reqwest::Client::new(), shared })
    }
}

#[async_trait]
impl GatewayClient for WsGatewayClient {
    async fn send_prompt(&self, prompt: &str) -> Result<(), String> {
        let resp = self
            .http
            .post(format!("{}/send-message", self.http_base))
            .json(&serde_json::json!({"message": prompt}))
            .send()
            .await
            .map_err(|e| format!("send-message request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("send-message returned {}", resp.status()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.shared.events_tx.subscribe()
    }

    async fn presence(&self) -> PresenceSnapshot {
        *self.shared.presence.lock().await
    }

    async fn run_command(&self, argv: &[String], timeout_secs: u64) -> Result<(i32, String), String> {
        let Some((program, rest)) = argv.split_first() else {
            return Err("run_command requires a non-empty argv".to_owned());
        };
        let fut = tokio::process::Command::new(program)
            .args(rest)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output();
        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), fut)
            .await
            .map_err(|_| format!("command timed out after {timeout_secs}s"))?
            .map_err(|e| format!("command failed to start: {e}"))?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok((output.status.code().unwrap_or(-1), combined))
    }
}

fn http_base_from_ws(ws_url: &str) -> Result<String, String> {
    let without_path = ws_url.trim_end_matches("/ws").trim_end_matches('/');
    if let Some(rest) = without_path.strip_prefix("ws://") {
        Ok(format!("http://{rest}"))
    } else if let Some(rest) = without_path.strip_prefix("wss://") {
        Ok(format!("https://{rest}"))
    } else {
        Err(format!("gateway_url must start with ws:// or wss://, got {ws_url}"))
    }
}

async fn run_once(url: &str, shared: &Arc<Shared>, runtime_tx: &mpsc::UnboundedSender<RuntimeEvent>) -> Result<(), String> {
    let (ws_stream, _resp) = tokio_tungstenite::connect_async(url).await.map_err(|e| format!("connect failed: {e}"))?;
    let (mut write, mut read) = ws_stream.split();

    let identify = ClientFrame::Identify { role: ClientRole::Supervisor };
    write
        .send(WsMessage::Text(serde_json::to_string(&identify).map_err(|e| e.to_string())?))
        .await
        .map_err(|e| format!("identify send failed: {e}"))?;

    let mut settle: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        match read.next().await {
            Some(Ok(WsMessage::Text(text))) => handle_incoming(&text, shared, runtime_tx, &mut settle).await,
            Some(Ok(WsMessage::Close(_))) | None => return Err("gateway closed the connection".to_owned()),
            Some(Err(e)) => return Err(format!("read error: {e}")),
            _ => {}
        }
    }
}

async fn handle_incoming(
    text: &str,
    shared: &Arc<Shared>,
    runtime_tx: &mpsc::UnboundedSender<RuntimeEvent>,
    settle: &mut Option<tokio::task::JoinHandle<()>>,
) {
    if let Ok(event) = serde_json::from_str::<GatewayEvent>(text) {
        let _ = shared.events_tx.send(event);
        return;
    }
    let Ok(frame) = serde_json::from_str::<DownstreamFrame>(text) else {
        tracing::warn!("supervisor received an unrecognized gateway frame, dropping");
        return;
    };
    match frame {
        DownstreamFrame::History { events } => {
            for event in events {
                let _ = shared.events_tx.send(event);
            }
        }
        DownstreamFrame::Status { agent_busy, human_count, oc_connected, .. } => {
            {
                let mut presence = shared.presence.lock().await;
                presence.agent_busy = agent_busy;
                presence.oc_connected = oc_connected;
                presence.human_count = human_count;
            }
            schedule_presence_update(human_count, runtime_tx, settle);
        }
        DownstreamFrame::ClientChange { humans, .. } => {
            shared.presence.lock().await.human_count = humans;
            schedule_presence_update(humans, runtime_tx, settle);
        }
        DownstreamFrame::SupervisorControl { action } => {
            if let Some(action) = parse_control_action(&action) {
                let _ = runtime_tx.send(RuntimeEvent::Control(action));
            } else {
                tracing::warn!(action = %action, "gateway forwarded an unrecognized supervisor control action");
            }
        }
        DownstreamFrame::TaskStatus { .. } | DownstreamFrame::Error { .. } => {}
    }
}

/// `humans > 0` is reported immediately, interrupting any pending resume;
/// `humans == 0` is debounced by [`PRESENCE_SETTLE_DELAY`] so a human
/// briefly reconnecting doesn't cause the turn loop to resume mid-handoff.
fn schedule_presence_update(humans: u32, runtime_tx: &mpsc::UnboundedSender<RuntimeEvent>, settle: &mut Option<tokio::task::JoinHandle<()>>) {
    if let Some(handle) = settle.take() {
        handle.abort();
    }
    if humans > 0 {
        let _ = runtime_tx.send(RuntimeEvent::PresenceChanged(humans));
        return;
    }
    let tx = runtime_tx.clone();
    *settle = Some(tokio::spawn(async move {
        tokio::time::sleep(PRESENCE_SETTLE_DELAY).await;
        let _ = tx.send(RuntimeEvent::PresenceChanged(0));
    }));
}

fn parse_control_action(action: &str) -> Option<SupervisorControlAction> {
    match action {
        "pause" => Some(SupervisorControlAction::Pause),
        "resume" => Some(SupervisorControlAction::Resume),
        "stop" => Some(SupervisorControlAction::Stop),
        "restart" => Some(SupervisorControlAction::Restart),
        _ => None,
    }
}
