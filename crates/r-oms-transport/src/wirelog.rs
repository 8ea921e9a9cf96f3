//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Entries retained in the diagnostics ring; older entries are dropped.
pub const WIRE_LOG_CAPACITY: usize = 200;

/// Direction of a wire log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireDirection {
    /// Outbound relay request.
    Send,
    /// Inbound relay reply.
    Recv,
    /// Failed exchange.
    Error,
}

/// One captured send/receive pair half.
#[derive(Debug, Clone, Serialize)]
pub struct WireLogEntry {
    /// Capture timestamp.
    pub ts: DateTime<Utc>,
    /// Entry direction.
    pub dir: WireDirection,
    /// Relay target host.
    pub host: String,
    /// Relay target port.
    pub port: u16,
    /// Request payload, reply body, or error description.
    pub detail: Value,
}

/// Bounded ring of the most recent relay exchanges, kept for diagnostics.
/// Recording is infallible and must never influence the outcome of the
/// operation being logged.
#[derive(Debug, Clone, Default)]
pub struct WireLog {
    entries: Arc<Mutex<VecDeque<WireLogEntry>>>,
}

impl WireLog {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, evicting the oldest beyond capacity.
    pub fn record(&self, dir: WireDirection, host: &str, port: u16, detail: Value) {
        let mut entries = self.entries.lock();
        if entries.len() >= WIRE_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(WireLogEntry {
            ts: Utc::now(),
            dir,
            host: host.to_owned(),
            port,
            detail,
        });
    }

    /// Copy of the current ring contents, oldest first.
    pub fn snapshot(&self) -> Vec<WireLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
