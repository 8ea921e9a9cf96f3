//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Shared primitives and utilities for the R-OMS runtime."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Core shared primitives for the R-OMS orchestrator workspace.
//! This crate exposes configuration loading and logging utilities
//! consumed across the workspace.

pub mod config;
pub mod logging;
pub mod net;

pub use config::{
    ApiConfig, AppConfig, LivenessConfig, LoggingConfig, MirrorConfig, RelayConfig,
    StabilizerConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use net::{is_valid_ipv4, is_valid_port};
