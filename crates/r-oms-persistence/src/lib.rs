//! ---
//! oms_section: "03-persistence-logging"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Persistence abstractions and the local snapshot mirror."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Durable local mirror for status snapshots.
//!
//! Each observer keeps the latest snapshot under one well-known path so a
//! restart resumes from the last known fleet view without waiting for the
//! server. The on-disk form is a versioned envelope with an integrity
//! hash; a tampered or truncated file reads back as absent rather than as
//! corrupt state.

pub mod mirror;

/// Shared result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors raised by the snapshot mirror.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The stored payload does not match its recorded hash.
    #[error("mirror hash mismatch")]
    HashMismatch,
}

pub use mirror::{SnapshotMirror, MIRROR_VERSION};
