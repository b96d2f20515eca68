//! Frame types exchanged with downstream clients that sit outside the
//! normalized [`GatewayEvent`](crate::event_bus::GatewayEvent) history ring:
//! presence, status snapshots, and control passthrough.

use serde::{Deserialize, Serialize};

use crate::event_bus::{ClientRole, GatewayEvent};

/// Sent by Gateway to every downstream client, never stored in the history
/// ring (the ring holds only [`GatewayEvent`](crate::event_bus::GatewayEvent)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownstreamFrame {
    History {
        events: Vec<GatewayEvent>,
    },
    Status {
        agent_busy: bool,
        human_count: u32,
        supervisor_connected: bool,
        oc_connected: bool,
    },
    ClientChange {
        humans: u32,
        supervisor_connected: bool,
    },
    TaskStatus {
        status: String,
    },
    SupervisorControl {
        action: String,
    },
    Error {
        message: String,
    },
}

/// Sent by a downstream client to Gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Identify { role: ClientRole },
    UserMessage { content: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    #[serde(rename = "type")]
    pub instance_type: String,
    pub cpus: f64,
    pub memory_mb: u64,
    pub host_cpus: f64,
    pub host_memory_mb: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_frame_decodes() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"identify","role":"supervisor"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Identify { role: ClientRole::Supervisor }));
    }

    #[test]
    fn user_message_frame_decodes() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"user_message","content":"hi"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::UserMessage { content } if content == "hi"));
    }

    #[test]
    fn status_frame_encodes_tagged() {
        let frame = DownstreamFrame::Status {
            agent_busy: true,
            human_count: 1,
            supervisor_connected: false,
            oc_connected: true,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["agent_busy"], true);
    }
}
