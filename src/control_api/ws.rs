//! Operator chat relay: `/ws/projects/:name/chat?token=...`. Token is a
//! query parameter here rather than a header, since browsers cannot attach
//! custom headers to a WebSocket handshake.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::auth::token_exists;
use super::state::ControlApiState;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub token: String,
}

pub async fn chat_ws(
    State(state): State<ControlApiState>,
    Path(project_name): Path<String>,
    Query(q): Query<ChatQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, axum::http::StatusCode> {
    if !token_exists(&state, &q.token).await {
        return Err(axum::http::StatusCode::UNAUTHORIZED);
    }
    Ok(ws.on_upgrade(move |socket| relay(socket, state, project_name)))
}

/// A close code is relayed verbatim when it is `1000` or in the
/// application-reserved `3000..=4999` range; anything else (protocol
/// codes like `1006`/`1015` that must never be sent on the wire) becomes a
/// generic `1000`. Reasons are truncated to fit the close frame's 123-byte
/// control-frame payload limit alongside the 2-byte code.
fn sanitize_close(frame: Option<CloseFrame<'static>>) -> Option<CloseFrame<'static>> {
    let frame = frame?;
    let code = if frame.code == 1000 || (3000..=4999).contains(&frame.code) { frame.code } else { 1000 };
    let mut reason = frame.reason.to_string();
    if reason.len() > 123 {
        reason.truncate(floor_char_boundary(&reason, 123));
    }
    Some(CloseFrame { code, reason: reason.into() })
}

/// Largest index `<= max` that lands on a UTF-8 character boundary of `s`,
/// so truncating there never panics or splits a multi-byte character.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

async fn relay(client_socket: WebSocket, state: ControlApiState, project_name: String) {
    let upstream = match state.containers.connect_gateway_ws(&project_name).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(project = %project_name, error = %e, "chat relay: upstream connect failed");
            let mut socket = client_socket;
            let _ = socket
                .send(Message::Close(Some(CloseFrame { code: 1011, reason: "upstream unavailable".into() })))
                .await;
            return;
        }
    };

    let (mut up_write, mut up_read) = upstream.split();
    let (mut down_write, mut down_read) = client_socket.split();

    let upstream_to_client = async {
        while let Some(Ok(msg)) = up_read.next().await {
            match msg {
                tokio_tungstenite::tungstenite::Message::Text(t) => {
                    if down_write.send(Message::Text(t)).await.is_err() {
                        break;
                    }
                }
                tokio_tungstenite::tungstenite::Message::Binary(b) => {
                    if down_write.send(Message::Binary(b)).await.is_err() {
                        break;
                    }
                }
                tokio_tungstenite::tungstenite::Message::Close(frame) => {
                    let frame = frame.map(|f| CloseFrame { code: f.code.into(), reason: f.reason.to_string().into() });
                    let _ = down_write.send(Message::Close(sanitize_close(frame).or(Some(CloseFrame { code: 1011, reason: "upstream closed".into() })))).await;
                    break;
                }
                _ => continue,
            }
        }
    };

    let client_to_upstream = async {
        while let Some(Ok(msg)) = down_read.next().await {
            match msg {
                Message::Text(t) => {
                    if up_write.send(tokio_tungstenite::tungstenite::Message::Text(t)).await.is_err() {
                        break;
                    }
                }
                Message::Binary(b) => {
                    if up_write.send(tokio_tungstenite::tungstenite::Message::Binary(b)).await.is_err() {
                        break;
                    }
                }
                Message::Close(frame) => {
                    let frame = sanitize_close(frame).unwrap_or(CloseFrame { code: 1000, reason: "".into() });
                    let _ = up_write
                        .send(tokio_tungstenite::tungstenite::Message::Close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                            code: frame.code.into(),
                            reason: frame.reason.to_string().into(),
                        })))
                        .await;
                    break;
                }
                _ => continue,
            }
        }
    };

    tokio::select! {
        _ = upstream_to_client => {}
        _ = client_to_upstream => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_close_passes_through() {
        let frame = CloseFrame { code: 1000, reason: "bye".into() };
        let sanitized = sanitize_close(Some(frame)).unwrap();
        assert_eq!(sanitized.code, 1000);
    }

    #[test]
    fn application_range_passes_through() {
        let frame = CloseFrame { code: 3005, reason: "".into() };
        let sanitized = sanitize_close(Some(frame)).unwrap();
        assert_eq!(sanitized.code, 3005);
    }

    #[test]
    fn protocol_code_is_replaced() {
        let frame = CloseFrame { code: 1006, reason: "".into() };
        let sanitized = sanitize_close(Some(frame)).unwrap();
        assert_eq!(sanitized.code, 1000);
    }

    #[test]
    fn long_reason_is_truncated() {
        let frame = CloseFrame { code: 1000, reason: "x".repeat(200).into() };
        let sanitized = sanitize_close(Some(frame)).unwrap();
        assert_eq!(sanitized.reason.len(), 123);
    }

    #[test]
    fn long_multibyte_reason_truncates_on_a_char_boundary() {
        // each "é" is 2 bytes; 61 repetitions straddle the 123-byte cutoff.
        let frame = CloseFrame { code: 1000, reason: "é".repeat(61).into() };
        let sanitized = sanitize_close(Some(frame)).unwrap();
        assert!(sanitized.reason.len() <= 123);
        assert!(std::str::from_utf8(sanitized.reason.as_bytes()).is_ok());
    }
}
