//! In-process pub-sub for ephemeral UI updates. Domain events are delivered
//! reliably by pulling `EventLog::read_all`; this bus is the lossy
//! complement for streaming agent output and liveness pings.

use std::collections::HashMap;

use parking_lot::RwLock;
use seed_domain::audit::AuditEntry;
use seed_domain::task::TaskStatus;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutputKind {
    Text,
    Reasoning,
    ToolCall,
    ToolResult,
    Verbose,
    Error,
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    AuditEntry(AuditEntry),
    AgentOutput { task_id: String, kind: AgentOutputKind, text: String },
    TaskUpdated { task_id: String, status: TaskStatus },
}

impl UiEvent {
    fn task_id(&self) -> &str {
        match self {
            UiEvent::AuditEntry(e) => &e.payload.task_id,
            UiEvent::AgentOutput { task_id, .. } => task_id,
            UiEvent::TaskUpdated { task_id, .. } => task_id,
        }
    }
}

/// One lazily-created broadcast channel per task. A full channel never
/// blocks the publisher: `tokio::sync::broadcast` already drops the oldest
/// unread message for slow subscribers, which is exactly the drop-oldest
/// policy this bus needs, so no bespoke ring buffer is built here.
pub struct UiBus {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<UiEvent>>>,
}

impl UiBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, task_id: &str) -> broadcast::Receiver<UiEvent> {
        self.sender_for(task_id).subscribe()
    }

    /// Best-effort: publishing with zero subscribers is a normal, silent
    /// no-op, not an error.
    pub fn publish(&self, event: UiEvent) {
        let tx = self.sender_for(event.task_id());
        let _ = tx.send(event);
    }

    fn sender_for(&self, task_id: &str) -> broadcast::Sender<UiEvent> {
        if let Some(tx) = self.channels.read().get(task_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write();
        channels
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = UiBus::new(16);
        bus.publish(UiEvent::TaskUpdated {
            task_id: "T1".into(),
            status: TaskStatus::InProgress,
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = UiBus::new(16);
        let mut rx = bus.subscribe("T1");
        bus.publish(UiEvent::AgentOutput {
            task_id: "T1".into(),
            kind: AgentOutputKind::Text,
            text: "hello".into(),
        });
        let got = rx.recv().await.unwrap();
        match got {
            UiEvent::AgentOutput { text, .. } => assert_eq!(text, "hello"),
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn channels_are_scoped_per_task() {
        let bus = UiBus::new(16);
        let mut rx_a = bus.subscribe("A");
        let mut rx_b = bus.subscribe("B");
        bus.publish(UiEvent::TaskUpdated {
            task_id: "A".into(),
            status: TaskStatus::Done,
        });
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
