//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Wire envelope schema for the R-OMS daemon protocol.
//!
//! Everything in this crate is pure data: envelope builders for each
//! operation the orchestrator performs, the daemon map sanitizer, reply
//! extractors, and the topology/camera response parsers. No I/O happens
//! here; the transport crate owns the relay round trip.

pub mod camera;
pub mod daemon_map;
pub mod envelope;
pub mod reply;
pub mod token;
pub mod topology;

pub use camera::{parse_camera_info, parse_video_format, CameraInfo, VideoFormat};
pub use daemon_map::{canonical_unit, legacy_unit, sanitize_daemon_map, DaemonMap};
pub use envelope::{
    Action, CameraSpec, CamerasField, Envelope, Expect, SendState, SwitchRef, CAMERA_UNIT,
    DIRECTORY_UNIT, GROUPING_UNIT, OBSERVER_NAME, RELAY_UNIT, RESULT_OK, SUB_UNIT, SWITCH_UNIT,
};
pub use token::make_token;
pub use topology::{parse_topology, CameraRecord, SubUnitGroup, Topology};
