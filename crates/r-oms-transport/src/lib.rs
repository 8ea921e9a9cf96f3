//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Networking edge of the R-OMS workspace.
//!
//! The relay endpoint is the single HTTP door every daemon operation goes
//! through: the orchestrator POSTs an envelope plus connection parameters,
//! the relay performs the daemon-protocol round trip, and the matching
//! reply (or the relay's own failure) comes back correlated by token.
//! Batch collection, the shared-state client, the aggregate health client,
//! and the SSE state-stream subscriber all live here too.

pub mod batch;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod sse;
pub mod state;
pub mod wirelog;

/// Shared result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Error taxonomy of the networking edge. Callers decide retry policy;
/// nothing in this crate retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Non-2xx response from the OMS service, carrying the relay's message.
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Error body reported by the service, or the raw body text.
        message: String,
    },
    /// The relay answered 2xx but reported a daemon-side failure.
    #[error("relay error: {0}")]
    Relay(String),
    /// No reply within the per-call deadline.
    #[error("request timed out after {0} s")]
    Timeout(u64),
    /// Underlying HTTP client failure.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    /// Serialization or deserialization problem.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use batch::{collect_versions, fetch_version_single, BatchError, BatchOutcome};
pub use health::{ExecutableStatus, HealthClient, NodeStatus, StatusReport};
pub use relay::{Relay, RelayClient};
pub use sse::subscribe_state_stream;
pub use state::StateClient;
pub use wirelog::{WireDirection, WireLog, WireLogEntry};
