//! ---
//! oms_section: "06-status-synchronization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Connection registry and cross-observer status synchronization."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Structured progress events.
//!
//! Observers react to tagged `{scope, mode, phase}` events instead of
//! pattern-matching human-readable text, so phase detection cannot be
//! broken by a reworded message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::{topics, Publisher};

/// What part of the fleet an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Daemon fleet operations.
    System,
    /// Camera bring-up operations.
    Camera,
}

/// What kind of operation produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Restart lifecycle.
    Restart,
    /// Connect lifecycle.
    Connect,
}

/// Lifecycle phase of the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Inputs are being gathered and validated.
    Preparing,
    /// The operation is underway.
    Running,
    /// A bounded retry of failed units is underway.
    Retrying,
    /// The operation completed.
    Finished,
    /// The operation failed terminally.
    Failed,
    /// The operation was aborted by the operator.
    Aborted,
}

/// One structured progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Fleet area.
    pub scope: Scope,
    /// Operation kind.
    pub mode: Mode,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Free-form detail for operators; never parsed.
    pub detail: String,
}

impl ProgressEvent {
    /// Construct an event.
    pub fn new(scope: Scope, mode: Mode, phase: Phase, detail: impl Into<String>) -> Self {
        Self {
            scope,
            mode,
            phase,
            detail: detail.into(),
        }
    }

    fn scope_label(&self) -> &'static str {
        match self.scope {
            Scope::System => "system",
            Scope::Camera => "camera",
        }
    }

    fn mode_label(&self) -> &'static str {
        match self.mode {
            Mode::Restart => "restart",
            Mode::Connect => "connect",
        }
    }

    /// Render the operator-facing line, e.g. `[system][connect] Running…`.
    pub fn render(&self) -> String {
        format!(
            "[{}][{}] {}",
            self.scope_label(),
            self.mode_label(),
            self.detail
        )
    }
}

/// Progress payload published on the bus alongside the structured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    /// Scope label (`system`/`camera`).
    pub scope: String,
    /// Rendered operator-facing text.
    pub text: String,
    /// Display priority.
    pub prio: u32,
    /// Epoch milliseconds of emission.
    pub ts: i64,
    /// Stable identifier of the emitting observer.
    pub origin: String,
    /// Per-origin sequence number.
    pub seq: u64,
    /// Structured event the message was rendered from.
    pub event: ProgressEvent,
}

/// Emitter minting origin/sequence metadata for one observer.
#[derive(Clone)]
pub struct ProgressReporter {
    publisher: Arc<dyn Publisher>,
    origin: String,
    seq: Arc<AtomicU64>,
}

impl ProgressReporter {
    /// Create a reporter publishing through the given bus.
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            origin: Uuid::new_v4().simple().to_string(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stable origin id of this reporter.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Emit an event with default priority.
    pub fn emit(&self, event: ProgressEvent) {
        self.emit_with_priority(event, 1);
    }

    /// Emit an event with an explicit display priority.
    pub fn emit_with_priority(&self, event: ProgressEvent, prio: u32) {
        let topic = match event.scope {
            Scope::System => topics::PROGRESS_SYSTEM,
            Scope::Camera => topics::PROGRESS_CAMERA,
        };
        let message = ProgressMessage {
            scope: event.scope_label().to_owned(),
            text: event.render(),
            prio,
            ts: Utc::now().timestamp_millis(),
            origin: self.origin.clone(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            event,
        };
        match serde_json::to_value(&message) {
            Ok(payload) => self.publisher.publish(topic, payload),
            Err(err) => tracing::warn!(error = %err, "progress message serialization failed"),
        }
    }
}
