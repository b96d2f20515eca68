//! Downstream WebSocket handler: on connect replays history + status, then
//! relays every broadcast event/frame while accepting `identify` and
//! `user_message` frames from the client.
//!
//! Grounded in the teacher's `gateway::ws::handle_socket` (`tokio::select!`
//! between a bus-subscription forward loop and client-command dispatch).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::event_bus::GatewayEvent;

use super::protocol::{ClientFrame, DownstreamFrame};
use super::state::GatewayState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<GatewayState>) {
    let client_id = state.register_client();
    let (mut events, history) = state.subscribe_and_snapshot().await;
    let mut frames = state.subscribe_frames();

    if !send_frame(&mut socket, &DownstreamFrame::History { events: history }).await {
        state.unregister_client(client_id);
        return;
    }
    if !send_frame(&mut socket, &state.status_frame()).await {
        state.unregister_client(client_id);
        return;
    }
    if let Some(status) = state.task_status().await {
        let _ = send_frame(&mut socket, &DownstreamFrame::TaskStatus { status }).await;
    }

    loop {
        tokio::select! {
            incoming = events.recv() => {
                match incoming {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "gateway ws client lagged behind event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = frames.recv() => {
                match incoming {
                    Ok(frame) => {
                        if !send_frame(&mut socket, &frame).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_frame(&state, client_id, &text, &mut socket).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.unregister_client(client_id);
}

async fn handle_client_frame(state: &Arc<GatewayState>, client_id: Uuid, raw: &str, socket: &mut WebSocket) -> bool {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(f) => f,
        Err(e) => {
            let _ = send_frame(socket, &DownstreamFrame::Error { message: format!("invalid frame: {e}") }).await;
            return true;
        }
    };

    match frame {
        ClientFrame::Identify { role } => {
            state.set_client_role(client_id, role);
            true
        }
        ClientFrame::UserMessage { content } => {
            if !state.oc_connected() {
                let _ = send_frame(
                    socket,
                    &DownstreamFrame::Error { message: "engine not connected yet, please wait".to_owned() },
                )
                .await;
                return true;
            }
            let nonce = Uuid::new_v4().to_string();
            if let Err(e) = state.send_upstream(content, nonce).await {
                let _ = send_frame(socket, &DownstreamFrame::Error { message: e }).await;
            } else {
                state.set_agent_busy(true);
            }
            true
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &GatewayEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(payload) => socket.send(Message::Text(payload)).await.is_ok(),
        Err(_) => true,
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &DownstreamFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(payload) => socket.send(Message::Text(payload)).await.is_ok(),
        Err(_) => true,
    }
}
