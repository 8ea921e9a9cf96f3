//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Process-wide counters for the networking edge.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};

/// Total relay round trips that completed with a reply.
pub static RELAY_SENDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "oms_relay_sends_total",
        "Total relay round trips that returned a reply"
    )
    .expect("metric registration to succeed")
});

/// Total relay round trips that failed at the HTTP or relay layer.
pub static RELAY_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "oms_relay_errors_total",
        "Total relay round trips that failed"
    )
    .expect("metric registration to succeed")
});

/// Total shared-state saves that reached the server.
pub static STATE_SAVES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "oms_state_saves_total",
        "Total snapshot saves accepted by the shared-state endpoint"
    )
    .expect("metric registration to succeed")
});
