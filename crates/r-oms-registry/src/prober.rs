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
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use crate::registry::{ConnectionRegistry, ConnectionState, Liveness};

/// Seam for the actual reachability check. Probe errors never escape: an
/// implementation maps anything it cannot classify to
/// [`Liveness::Indeterminate`].
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe one address.
    async fn probe(&self, ip: &str) -> Liveness;
}

/// Status transition produced by the liveness watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// Affected address.
    pub ip: String,
    /// Newly computed state.
    pub state: ConnectionState,
}

/// Spawn the periodic liveness watch over every address the registry
/// knows. Each probe result is fed into the registry; transitions are
/// forwarded on the returned channel for the synchronizer to publish.
/// The task ends when the receiver is dropped.
pub fn spawn_liveness_watch(
    registry: Arc<ConnectionRegistry>,
    prober: Arc<dyn Prober>,
    probe_interval: Duration,
) -> (JoinHandle<()>, mpsc::Receiver<StatusChange>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move {
        let mut ticker = interval(probe_interval);
        loop {
            ticker.tick().await;
            for ip in registry.known_ips() {
                let outcome = prober.probe(&ip).await;
                if registry.observe_probe(&ip, outcome) {
                    let change = StatusChange {
                        state: registry.status(&ip),
                        ip,
                    };
                    if tx.send(change).await.is_err() {
                        debug!("liveness watch receiver dropped; stopping");
                        return;
                    }
                }
            }
        }
    });
    (handle, rx)
}
