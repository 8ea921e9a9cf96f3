//! ---
//! oms_section: "06-status-synchronization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Connection registry and cross-observer status synchronization."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use r_oms_persistence::SnapshotMirror;
use r_oms_transport::StateClient;

use crate::bus::{topics, ChannelBus, Publisher};
use crate::registry::ConnectionRegistry;
use crate::snapshot::StatusSnapshot;

/// Publishes the observer's fleet view and merges views published by
/// siblings.
///
/// Every write fans out to three sinks, all best-effort: the durable
/// local mirror, the server's shared-state endpoint, and the snapshot
/// topic of the observer bus. A failure in any sink is logged and never
/// fails the originating operation.
pub struct SnapshotSync {
    registry: Arc<ConnectionRegistry>,
    mirror: SnapshotMirror,
    server: Option<StateClient>,
    bus: Arc<ChannelBus>,
    view: Mutex<StatusSnapshot>,
}

impl SnapshotSync {
    /// Wire the synchronizer; the mirror is consulted for a resume view.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        mirror: SnapshotMirror,
        server: Option<StateClient>,
        bus: Arc<ChannelBus>,
    ) -> Self {
        let view = mirror
            .load()
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_value::<StatusSnapshot>(raw).ok())
            .unwrap_or_default();
        if view.updated_at > 0 {
            debug!(updated_at = view.updated_at, "resumed view from mirror");
            registry.apply_snapshot(&view.connect_tokens, &view.latched);
        }
        Self {
            registry,
            mirror,
            server,
            bus,
            view: Mutex::new(view),
        }
    }

    /// Current local view.
    pub fn view(&self) -> StatusSnapshot {
        self.view.lock().clone()
    }

    /// Publish a new view built by the caller. The registry's token and
    /// latch sets are folded in, the timestamp is stamped monotonically,
    /// and the result fans out to every sink.
    pub async fn publish(&self, mut snapshot: StatusSnapshot) -> StatusSnapshot {
        snapshot.connect_tokens = self.registry.tokens();
        snapshot.latched = self.registry.latched();

        let previous = self.view.lock().updated_at;
        let snapshot = snapshot.stamped_after(previous);
        *self.view.lock() = snapshot.clone();

        let raw = match serde_json::to_value(&snapshot) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "snapshot serialization failed; nothing published");
                return snapshot;
            }
        };
        if let Err(err) = self.mirror.save(&raw) {
            warn!(error = %err, "mirror save failed");
        }
        if let Some(server) = &self.server {
            if let Err(err) = server.save(&raw).await {
                warn!(error = %err, "server state save failed");
            }
        }
        self.bus.publish(topics::SNAPSHOT, raw);
        snapshot
    }

    /// Merge a snapshot published by a sibling observer. The whole local
    /// view is replaced when the incoming timestamp is newer; re-applying
    /// the same snapshot is a no-op. Returns whether the view changed.
    pub fn merge_incoming(&self, incoming: StatusSnapshot) -> bool {
        let mut view = self.view.lock();
        if !incoming.is_newer_than(&view) {
            return false;
        }
        self.registry
            .apply_snapshot(&incoming.connect_tokens, &incoming.latched);
        *view = incoming;
        if let Ok(raw) = serde_json::to_value(&*view) {
            if let Err(err) = self.mirror.save(&raw) {
                warn!(error = %err, "mirror save failed on merge");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sync_fixture(dir: &std::path::Path) -> SnapshotSync {
        let registry = Arc::new(ConnectionRegistry::new(2));
        SnapshotSync::new(
            registry,
            SnapshotMirror::new(dir.join("snapshot.json")),
            None,
            Arc::new(ChannelBus::new(8)),
        )
    }

    #[tokio::test]
    async fn publish_folds_registry_state_and_mirrors() {
        let dir = tempdir().unwrap();
        let sync = sync_fixture(dir.path());
        sync.registry.record_connect_success("10.0.2.1", "seq-1");

        let mut snapshot = StatusSnapshot::default();
        snapshot.status.insert("10.0.2.1".into(), "connected".into());
        let published = sync.publish(snapshot).await;

        assert!(published.connect_tokens.contains_key("10.0.2.1"));
        assert!(published.updated_at > 0);
        assert!(sync.mirror.verify());
    }

    #[tokio::test]
    async fn merge_is_last_write_wins_and_idempotent() {
        let dir = tempdir().unwrap();
        let sync = sync_fixture(dir.path());

        let mut incoming = StatusSnapshot::default();
        incoming.status.insert("10.0.2.1".into(), "on".into());
        incoming
            .connect_tokens
            .insert("10.0.2.1".into(), "seq-9".into());
        incoming.updated_at = 100;

        assert!(sync.merge_incoming(incoming.clone()));
        let after_first = sync.view();
        // applying the identical snapshot again changes nothing
        assert!(!sync.merge_incoming(incoming.clone()));
        assert_eq!(sync.view(), after_first);

        // an older snapshot never wins
        let mut stale = incoming.clone();
        stale.updated_at = 50;
        stale.status.insert("10.0.2.1".into(), "off".into());
        assert!(!sync.merge_incoming(stale));
        assert_eq!(sync.view().status["10.0.2.1"], "on");
    }

    #[tokio::test]
    async fn merge_replaces_registry_tokens_wholesale() {
        let dir = tempdir().unwrap();
        let sync = sync_fixture(dir.path());
        sync.registry.record_connect_success("10.0.2.5", "seq-1");

        let mut incoming = StatusSnapshot::default();
        incoming
            .connect_tokens
            .insert("10.0.2.1".into(), "seq-2".into());
        incoming.latched.push("10.0.2.9".into());
        incoming.updated_at = 100;
        sync.merge_incoming(incoming);

        let tokens = sync.registry.tokens();
        assert!(!tokens.contains_key("10.0.2.5"));
        assert!(tokens.contains_key("10.0.2.1"));
        assert_eq!(sync.registry.latched(), vec!["10.0.2.9".to_owned()]);
    }
}
