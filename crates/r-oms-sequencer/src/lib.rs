//! ---
//! oms_section: "04-sequencing-orchestration"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Ordered fleet connect sequencing."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Fleet bring-up sequencing.
//!
//! The connect sequencer drives a daemon fleet from unconfigured to
//! connected-and-versioned in five strictly ordered steps: primary unit
//! connect, fleet connect, topology discovery, batched sub-unit connect,
//! and version collection. Step one is fatal; everything after downgrades
//! to partial results that are persisted incrementally, so a crash mid
//! sequence never loses earlier steps.

pub mod camera;
pub mod retry;
pub mod sequence;
pub mod state;

/// Shared result type for sequencing operations.
pub type Result<T> = std::result::Result<T, SequenceError>;

/// Error taxonomy of the sequencer.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// Bad inputs caught before any network call.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A step's semantic result code indicated failure.
    #[error("step {step} ({name}) failed: {message}")]
    Step {
        /// Step index, 1-based.
        step: u8,
        /// Step name.
        name: &'static str,
        /// Failure description.
        message: String,
    },
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] r_oms_transport::TransportError),
}

pub use camera::{CameraBringUp, CameraReport};
pub use retry::with_retry;
pub use sequence::{
    AbortHandle, ConnectSequencer, SequenceReport, SequenceRequest, SequenceStatus, StepOutcome,
    StepRecord,
};
pub use state::{HttpStateSink, NullStateSink, StatePatch, StateSink};
