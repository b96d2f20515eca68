use tokio::sync::broadcast;

use super::traits::{EventBus, GatewayEvent};

pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-backed [`EventBus`]. Lagging subscribers drop the oldest
/// buffered events rather than blocking the publisher.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl TokioBroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: GatewayEvent) -> Result<(), String> {
        // No subscribers is not an error: the bus may outlive any one client.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = TokioBroadcastBus::new();
        let mut rx = bus.subscribe();
        bus.publish(GatewayEvent::Done).unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, GatewayEvent::Done));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = TokioBroadcastBus::new();
        bus.publish(GatewayEvent::Done).unwrap();
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(GatewayEvent::TextDelta { text: "hi".into() }).unwrap();
        assert!(matches!(rx1.recv().await.unwrap(), GatewayEvent::TextDelta { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), GatewayEvent::TextDelta { .. }));
    }

    #[tokio::test]
    async fn lagged_receiver_reports_error() {
        let bus = TokioBroadcastBus::with_capacity(1);
        let mut rx = bus.subscribe();
        bus.publish(GatewayEvent::Done).unwrap();
        bus.publish(GatewayEvent::Done).unwrap();
        bus.publish(GatewayEvent::Done).unwrap();
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
