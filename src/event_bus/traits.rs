//! One Gateway-observable occurrence from the upstream LLM engine session,
//! and the broadcast abstraction that fans it out to downstream clients.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One observable occurrence from the upstream engine session. Produced only
/// by the Gateway; never by downstream clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    TextDelta { text: String },
    ToolStart { tool: String },
    ToolUse { tool: String, input_json: serde_json::Value },
    ToolResult { tool: String, output: String },
    Done,
    Error { message: String, code: Option<String> },
}

/// Role of a connected WebSocket client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    Supervisor,
    Human,
    Unknown,
}

pub trait EventBus: Send + Sync {
    /// Publish `event` to every current subscriber.
    fn publish(&self, event: GatewayEvent) -> Result<(), String>;

    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_event_tagged_serialization() {
        let event = GatewayEvent::TextDelta { text: "hi".to_owned() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn done_event_has_no_extra_fields() {
        let json = serde_json::to_value(GatewayEvent::Done).unwrap();
        assert_eq!(json, serde_json::json!({"type": "done"}));
    }
}
