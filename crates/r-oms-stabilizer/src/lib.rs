//! ---
//! oms_section: "07-resilience-fault-tolerance"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Restart stabilization watchdog."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Restart stabilization watchdog.
//!
//! After an operation that transiently disrupts connectivity (a fleet
//! restart, most commonly), the stabilizer polls the aggregate health
//! endpoint and declares the fleet stable only once a configured number
//! of consecutive polls report every selected process healthy. A single
//! bad or failed poll resets the count; only the hard wall-clock timeout
//! ends the watch without stability.

pub mod watch;

pub use watch::{HealthPoller, RestartStabilizer, StableReason, WatchOutcome};
