//! ---
//! oms_section: "06-status-synchronization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Connection registry and cross-observer status synchronization."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Per-observer belief about the fleet's connection state, and the
//! machinery that keeps independent observers in agreement.
//!
//! Each observer owns one [`ConnectionRegistry`]: connect tokens issued by
//! successful sequence steps, a tri-state liveness map fed by periodic
//! probing, and the off-latch that keeps a unit from being reported
//! connected on stale evidence. Status is computed, never stored. The
//! synchronizer publishes whole snapshots to the local mirror, the shared
//! server state, and sibling observers over the broadcast bus;
//! last-write-wins by embedded timestamp.

pub mod bus;
pub mod prober;
pub mod progress;
pub mod registry;
pub mod snapshot;
pub mod sync;

pub use bus::{topics, BusMessage, ChannelBus, Publisher};
pub use prober::{spawn_liveness_watch, Prober, StatusChange};
pub use progress::{Mode, Phase, ProgressEvent, ProgressMessage, ProgressReporter, Scope};
pub use registry::{ConnectionRegistry, ConnectionState, Liveness};
pub use snapshot::StatusSnapshot;
pub use sync::SnapshotSync;
