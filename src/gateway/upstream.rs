//! The single persistent upstream WebSocket session to the local LLM engine,
//! with its own reconnect/backoff state machine — built in the idiom of the
//! teacher's `gateway::daemon` port-fallback retry loop, since the teacher
//! has no upstream-client precedent of its own.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::event_bus::GatewayEvent;

use super::state::{GatewayState, UpstreamSend};

const BACKOFF_MIN: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const PROTO_VERSION_MIN: u32 = 1;
const PROTO_VERSION_MAX: u32 = 1;

/// Auth material offered in the `connect` handshake. Password is preferred
/// when present; a bearer token is accepted as a fallback.
#[derive(Debug, Clone, Default)]
pub struct EngineAuth {
    pub password: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineMessage {
    #[serde(rename = "connect.challenge")]
    ConnectChallenge { nonce: String },
    Connected,
    #[serde(rename = "chat.delta")]
    ChatDelta { text: String },
    AgentEvent {
        phase: String,
        tool: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
        #[serde(default)]
        output: Option<String>,
    },
    #[serde(rename = "chat.final")]
    ChatFinal,
    #[serde(rename = "chat.error")]
    ChatError { message: String },
    #[serde(rename = "chat.aborted")]
    ChatAborted,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineRequest<'a> {
    Connect {
        session_key: &'a str,
        proto_version_min: u32,
        proto_version_max: u32,
        role: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<&'a str>,
        nonce: &'a str,
    },
    #[serde(rename = "chat.send")]
    ChatSend {
        session_key: &'a str,
        content: &'a str,
        nonce: &'a str,
    },
}

pub fn backoff_delay(attempt: u64) -> Duration {
    let scaled = BACKOFF_MIN.as_secs().saturating_mul(1u64 << attempt.min(16));
    Duration::from_secs(scaled.min(BACKOFF_MAX.as_secs())).max(BACKOFF_MIN)
}

/// Drives the upstream connection forever, reconnecting with backoff on
/// every disconnect. Returns only if `rx` closes (process shutdown).
pub async fn run(state: Arc<GatewayState>, engine_url: String, auth: EngineAuth, mut rx: mpsc::Receiver<UpstreamSend>) {
    loop {
        match connect_and_drive(&state, &engine_url, &auth, &mut rx).await {
            Ok(ShutdownReason::ChannelClosed) => return,
            Ok(ShutdownReason::Disconnected) | Err(_) => {
                state.set_oc_connected(false);
                state.set_agent_busy(false);
                let attempt = state.next_reconnect_attempt();
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
    }
}

enum ShutdownReason {
    Disconnected,
    ChannelClosed,
}

async fn connect_and_drive(
    state: &Arc<GatewayState>,
    engine_url: &str,
    auth: &EngineAuth,
    rx: &mut mpsc::Receiver<UpstreamSend>,
) -> Result<ShutdownReason, String> {
    let (ws_stream, _resp) = tokio_tungstenite::connect_async(engine_url)
        .await
        .map_err(|e| format!("upstream connect failed: {e}"))?;
    let (mut write, mut read) = ws_stream.split();

    let challenge = match read.next().await {
        Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<EngineMessage>(&text)
            .map_err(|e| format!("malformed challenge: {e}"))?,
        other => return Err(format!("expected connect.challenge, got {other:?}")),
    };
    let EngineMessage::ConnectChallenge { nonce } = challenge else {
        return Err("upstream did not open with connect.challenge".to_owned());
    };

    let session_key = state.session_key();
    let connect_req = EngineRequest::Connect {
        session_key: &session_key,
        proto_version_min: PROTO_VERSION_MIN,
        proto_version_max: PROTO_VERSION_MAX,
        role: "operator",
        password: auth.password.as_deref(),
        token: auth.token.as_deref(),
        nonce: &nonce,
    };
    write
        .send(WsMessage::Text(serde_json::to_string(&connect_req).map_err(|e| e.to_string())?))
        .await
        .map_err(|e| format!("failed to send connect: {e}"))?;

    match read.next().await {
        Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<EngineMessage>(&text) {
            Ok(EngineMessage::Connected) => {}
            Ok(_) | Err(_) => return Err("upstream rejected connect handshake".to_owned()),
        },
        other => return Err(format!("expected connected ack, got {other:?}")),
    }

    state.set_oc_connected(true);
    tracing::info!(session_key = %session_key, "upstream session established");

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => handle_engine_text(state, &text).await,
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(ShutdownReason::Disconnected),
                    Some(Err(e)) => return Err(format!("upstream read error: {e}")),
                    _ => {}
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(UpstreamSend { content, nonce }) => {
                        let req = EngineRequest::ChatSend { session_key: &session_key, content: &content, nonce: &nonce };
                        let payload = serde_json::to_string(&req).map_err(|e| e.to_string())?;
                        if write.send(WsMessage::Text(payload)).await.is_err() {
                            return Ok(ShutdownReason::Disconnected);
                        }
                        state.set_agent_busy(true);
                    }
                    None => return Ok(ShutdownReason::ChannelClosed),
                }
            }
        }
    }
}

async fn handle_engine_text(state: &Arc<GatewayState>, text: &str) {
    let Ok(msg) = serde_json::from_str::<EngineMessage>(text) else {
        tracing::warn!("upstream sent an unrecognized frame, dropping");
        return;
    };
    match msg {
        EngineMessage::ChatDelta { text } => state.push_event(GatewayEvent::TextDelta { text }).await,
        EngineMessage::AgentEvent { phase, tool, input, output } => {
            if phase == "start" {
                state.push_event(GatewayEvent::ToolStart { tool: tool.clone() }).await;
                state
                    .push_event(GatewayEvent::ToolUse { tool, input_json: input.unwrap_or(json!({})) })
                    .await;
            } else {
                state.push_event(GatewayEvent::ToolResult { tool, output: output.unwrap_or_default() }).await;
            }
        }
        EngineMessage::ChatFinal => {
            state.set_agent_busy(false);
            state.push_event(GatewayEvent::Done).await;
        }
        EngineMessage::ChatError { message } => {
            state.set_agent_busy(false);
            state.push_event(GatewayEvent::Error { message, code: None }).await;
        }
        EngineMessage::ChatAborted => {
            state.set_agent_busy(false);
        }
        EngineMessage::ConnectChallenge { .. } | EngineMessage::Connected => {
            tracing::warn!("unexpected handshake frame mid-session, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_30s() {
        assert_eq!(backoff_delay(0), Duration::from_secs(2));
        assert_eq!(backoff_delay(1), Duration::from_secs(4));
        assert_eq!(backoff_delay(2), Duration::from_secs(8));
        assert_eq!(backoff_delay(3), Duration::from_secs(16));
        assert_eq!(backoff_delay(4), Duration::from_secs(30));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn engine_message_tags_decode() {
        let m: EngineMessage = serde_json::from_str(r#"{"type":"chat.delta","text":"hi"}"#).unwrap();
        assert!(matches!(m, EngineMessage::ChatDelta { text } if text == "hi"));

        let m: EngineMessage = serde_json::from_str(r#"{"type":"connect.challenge","nonce":"abc"}"#).unwrap();
        assert!(matches!(m, EngineMessage::ConnectChallenge { nonce } if nonce == "abc"));
    }

    #[test]
    fn connect_request_serializes_with_tag() {
        let req = EngineRequest::Connect {
            session_key: "main:webchat:fleet-demo",
            proto_version_min: 1,
            proto_version_max: 1,
            role: "operator",
            password: Some("p"),
            token: None,
            nonce: "n",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "connect");
        assert_eq!(json["role"], "operator");
        assert!(json.get("token").is_none());
    }
}
