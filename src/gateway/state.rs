//! Shared Gateway state: the history ring, connected-client presence map,
//! and upstream session flags, as seen by both the WS/HTTP handlers and the
//! upstream session task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::event_bus::{ClientRole, EventBus, GatewayEvent};

use super::protocol::{DownstreamFrame, InstanceInfo};

pub const HISTORY_CAPACITY: usize = 50;

/// A message Gateway needs to forward to the upstream engine session.
#[derive(Debug, Clone)]
pub struct UpstreamSend {
    pub content: String,
    pub nonce: String,
}

pub struct GatewayState {
    pub project: String,
    pub prefix: String,
    clients: DashMap<Uuid, ClientRole>,
    history: Mutex<VecDeque<GatewayEvent>>,
    oc_connected: AtomicBool,
    agent_busy: AtomicBool,
    reconnect_attempts: AtomicU64,
    task_status: Mutex<Option<String>>,
    events: Arc<dyn EventBus>,
    frames_tx: broadcast::Sender<DownstreamFrame>,
    upstream_tx: mpsc::Sender<UpstreamSend>,
    pub instance: InstanceInfo,
}

impl GatewayState {
    pub fn new(
        project: impl Into<String>,
        prefix: impl Into<String>,
        events: Arc<dyn EventBus>,
        upstream_tx: mpsc::Sender<UpstreamSend>,
        instance: InstanceInfo,
    ) -> Self {
        let (frames_tx, _rx) = broadcast::channel(256);
        Self {
            project: project.into(),
            prefix: prefix.into(),
            clients: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            oc_connected: AtomicBool::new(false),
            agent_busy: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
            task_status: Mutex::new(None),
            events,
            frames_tx,
            upstream_tx,
            instance,
        }
    }

    /// The fixed session key used for the lifetime of the project.
    pub fn session_key(&self) -> String {
        format!("main:webchat:{}-{}", self.prefix, self.project)
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<DownstreamFrame> {
        self.frames_tx.subscribe()
    }

    pub async fn send_upstream(&self, content: String, nonce: String) -> Result<(), String> {
        self.upstream_tx
            .send(UpstreamSend { content, nonce })
            .await
            .map_err(|_| "upstream session task is not running".to_owned())
    }

    pub fn oc_connected(&self) -> bool {
        self.oc_connected.load(Ordering::SeqCst)
    }

    pub fn set_oc_connected(&self, connected: bool) {
        self.oc_connected.store(connected, Ordering::SeqCst);
        if connected {
            self.reconnect_attempts.store(0, Ordering::SeqCst);
        }
    }

    pub fn agent_busy(&self) -> bool {
        self.agent_busy.load(Ordering::SeqCst)
    }

    pub fn set_agent_busy(&self, busy: bool) {
        self.agent_busy.store(busy, Ordering::SeqCst);
    }

    pub fn next_reconnect_attempt(&self) -> u64 {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn task_status(&self) -> Option<String> {
        self.task_status.lock().await.clone()
    }

    pub async fn set_task_status(&self, status: Option<String>) {
        *self.task_status.lock().await = status;
    }

    pub fn human_count(&self) -> u32 {
        self.clients.iter().filter(|e| *e.value() == ClientRole::Human).count() as u32
    }

    pub fn supervisor_connected(&self) -> bool {
        self.clients.iter().any(|e| *e.value() == ClientRole::Supervisor)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Register a newly connected client with an initially unknown role.
    /// Returns its id.
    pub fn register_client(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(id, ClientRole::Unknown);
        id
    }

    /// Update a client's role, broadcasting `client_change` if the human or
    /// supervisor presence counts actually moved.
    pub fn set_client_role(&self, id: Uuid, role: ClientRole) {
        let before = (self.human_count(), self.supervisor_connected());
        self.clients.insert(id, role);
        let after = (self.human_count(), self.supervisor_connected());
        if before != after {
            self.broadcast_client_change();
        }
    }

    pub fn unregister_client(&self, id: Uuid) {
        let before = (self.human_count(), self.supervisor_connected());
        self.clients.remove(&id);
        let after = (self.human_count(), self.supervisor_connected());
        if before != after {
            self.broadcast_client_change();
        }
    }

    fn broadcast_client_change(&self) {
        let _ = self.frames_tx.send(DownstreamFrame::ClientChange {
            humans: self.human_count(),
            supervisor_connected: self.supervisor_connected(),
        });
    }

    pub fn status_frame(&self) -> DownstreamFrame {
        DownstreamFrame::Status {
            agent_busy: self.agent_busy(),
            human_count: self.human_count(),
            supervisor_connected: self.supervisor_connected(),
            oc_connected: self.oc_connected(),
        }
    }

    /// Append a normalized event to the history ring (evicting the oldest
    /// past [`HISTORY_CAPACITY`]) and broadcast it to every subscriber.
    ///
    /// The append and the publish happen under the same history lock that
    /// [`subscribe_and_snapshot`](Self::subscribe_and_snapshot) takes, so a
    /// newly connecting client's subscription and history read are never
    /// interleaved with this pair — the event lands in exactly one of
    /// "already in the snapshot" or "delivered live", never both.
    pub async fn push_event(&self, event: GatewayEvent) {
        let mut history = self.history.lock().await;
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(event.clone());
        let _ = self.events.publish(event);
    }

    pub async fn history_snapshot(&self) -> Vec<GatewayEvent> {
        self.history.lock().await.iter().cloned().collect()
    }

    /// Subscribe to live events and snapshot the current history atomically,
    /// under the same lock [`push_event`](Self::push_event) holds across its
    /// append+publish, so no event can be missing from both or present in
    /// both.
    pub async fn subscribe_and_snapshot(&self) -> (broadcast::Receiver<GatewayEvent>, Vec<GatewayEvent>) {
        let history = self.history.lock().await;
        let rx = self.events.subscribe();
        let snapshot = history.iter().cloned().collect();
        (rx, snapshot)
    }

    /// Forward a `supervisor_control` frame to every client currently
    /// identified as `supervisor`. Returns whether one was found — the
    /// frame itself fans out over the shared broadcast channel, so
    /// downstream handlers must filter by their own role before acting.
    pub fn notify_supervisor_control(&self, action: &str) -> bool {
        let found = self.supervisor_connected();
        if found {
            let _ = self.frames_tx.send(DownstreamFrame::SupervisorControl { action: action.to_owned() });
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::TokioBroadcastBus;

    fn fixture() -> (Arc<GatewayState>, mpsc::Receiver<UpstreamSend>) {
        let (tx, rx) = mpsc::channel(8);
        let events: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
        let instance = InstanceInfo {
            instance_type: "local".into(),
            cpus: 2.0,
            memory_mb: 4096,
            host_cpus: 8.0,
            host_memory_mb: 16384,
        };
        (Arc::new(GatewayState::new("demo", "fleet", events, tx, instance)), rx)
    }

    #[test]
    fn session_key_uses_fixed_pattern() {
        let (state, _rx) = fixture();
        assert_eq!(state.session_key(), "main:webchat:fleet-demo");
    }

    #[tokio::test]
    async fn history_ring_evicts_oldest_past_capacity() {
        let (state, _rx) = fixture();
        for i in 0..(HISTORY_CAPACITY + 5) {
            state.push_event(GatewayEvent::TextDelta { text: i.to_string() }).await;
        }
        let snapshot = state.history_snapshot().await;
        assert_eq!(snapshot.len(), HISTORY_CAPACITY);
        assert!(matches!(&snapshot[0], GatewayEvent::TextDelta { text } if text == "5"));
    }

    #[tokio::test]
    async fn subscribe_and_snapshot_never_duplicates_an_event() {
        let (state, _rx) = fixture();
        state.push_event(GatewayEvent::TextDelta { text: "before".into() }).await;

        let (mut events, history) = state.subscribe_and_snapshot().await;
        assert_eq!(history.len(), 1);

        state.push_event(GatewayEvent::TextDelta { text: "after".into() }).await;
        let live = events.recv().await.unwrap();
        assert!(matches!(live, GatewayEvent::TextDelta { text } if text == "after"));
        // "after" must not also be sitting in a history snapshot taken at
        // subscription time.
        assert!(!history.iter().any(|e| matches!(e, GatewayEvent::TextDelta { text } if text == "after")));
    }

    #[test]
    fn client_role_change_triggers_client_change_broadcast() {
        let (state, _rx) = fixture();
        let mut frames = state.subscribe_frames();
        let id = state.register_client();
        state.set_client_role(id, ClientRole::Human);
        let frame = frames.try_recv().unwrap();
        assert!(matches!(frame, DownstreamFrame::ClientChange { humans: 1, .. }));
    }

    #[test]
    fn unregistering_unknown_client_does_not_broadcast() {
        let (state, _rx) = fixture();
        let mut frames = state.subscribe_frames();
        let id = state.register_client();
        state.unregister_client(id);
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn reconnect_attempts_reset_on_success() {
        let (state, _rx) = fixture();
        assert_eq!(state.next_reconnect_attempt(), 0);
        assert_eq!(state.next_reconnect_attempt(), 1);
        state.set_oc_connected(true);
        assert_eq!(state.next_reconnect_attempt(), 0);
    }
}
