//! ---
//! oms_section: "06-status-synchronization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Connection registry and cross-observer status synchronization."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Logical channel names shared by all observers.
pub mod topics {
    /// System-scope progress messages.
    pub const PROGRESS_SYSTEM: &str = "progress-system";
    /// Camera-scope progress messages.
    pub const PROGRESS_CAMERA: &str = "progress-camera";
    /// Fleet connect summaries.
    pub const CONNECT_SUMMARY: &str = "connect-summary";
    /// Full status snapshots.
    pub const SNAPSHOT: &str = "snapshot";
}

/// One message on the observer bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Logical channel the message was published on.
    pub topic: String,
    /// JSON payload.
    pub payload: Value,
}

/// Outbound half of the cross-observer messaging seam. The in-process
/// implementation is [`ChannelBus`]; a deployment embedding real
/// cross-process primitives substitutes its own.
pub trait Publisher: Send + Sync {
    /// Publish a payload on a topic. Publishing is fire-and-forget;
    /// having no subscribers is not an error.
    fn publish(&self, topic: &str, payload: Value);
}

/// In-process bus backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    tx: broadcast::Sender<BusMessage>,
}

impl ChannelBus {
    /// Create a bus retaining up to `capacity` undelivered messages per
    /// subscriber before older ones lag out.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every topic; callers filter on [`BusMessage::topic`].
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Publisher for ChannelBus {
    fn publish(&self, topic: &str, payload: Value) {
        trace!(topic, "bus publish");
        let _ = self.tx.send(BusMessage {
            topic: topic.to_owned(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let bus = ChannelBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(topics::SNAPSHOT, json!({"updated_at": 1}));
        let message = rx.recv().await.unwrap();
        assert_eq!(message.topic, topics::SNAPSHOT);
        assert_eq!(message.payload["updated_at"], 1);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let bus = ChannelBus::new(8);
        bus.publish(topics::PROGRESS_SYSTEM, json!("no one listening"));
    }
}
