//! ---
//! oms_section: "06-status-synchronization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Connection registry and cross-observer status synchronization."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Computed connection state of one unit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No evidence either way.
    Unknown,
    /// Liveness says the unit is down.
    Off,
    /// Liveness says the unit is up, but no connect step has claimed it.
    On,
    /// A connect step succeeded and no latch suppresses it.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Off => "off",
            ConnectionState::On => "on",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Tri-state liveness evidence from periodic probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// The probe reached the unit.
    Alive,
    /// The probe got a definitive failure.
    Dead,
    /// The probe could not decide (network exception, partial reply).
    Indeterminate,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// Connect token per address: which sequence run claimed the unit.
    tokens: BTreeMap<String, String>,
    liveness: BTreeMap<String, Liveness>,
    latched: BTreeSet<String>,
    indeterminate_streak: BTreeMap<String, u32>,
}

impl RegistryInner {
    fn status(&self, ip: &str) -> ConnectionState {
        if self.tokens.contains_key(ip) && !self.latched.contains(ip) {
            return ConnectionState::Connected;
        }
        match self.liveness.get(ip) {
            Some(Liveness::Alive) => ConnectionState::On,
            Some(Liveness::Dead) => ConnectionState::Off,
            Some(Liveness::Indeterminate) | None => ConnectionState::Unknown,
        }
    }
}

/// Explicit, owned registry of per-unit connection evidence.
///
/// One instance per observer process; the sequencer, the liveness watcher,
/// and the synchronizer all hold references to the same registry instead
/// of touching ambient state.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// Consecutive indeterminate probes tolerated before latching.
    /// Explicit dead results latch immediately regardless.
    indeterminate_debounce: u32,
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create a registry with the given indeterminate debounce threshold.
    pub fn new(indeterminate_debounce: u32) -> Self {
        Self {
            indeterminate_debounce: indeterminate_debounce.max(1),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Start tracking an address so the liveness watcher probes it even
    /// before any connect step or probe result has touched it.
    pub fn track(&self, ip: &str) {
        let mut inner = self.inner.lock();
        inner
            .liveness
            .entry(ip.to_owned())
            .or_insert(Liveness::Indeterminate);
    }

    /// Every address the registry has evidence about.
    pub fn known_ips(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut ips: BTreeSet<String> = inner.liveness.keys().cloned().collect();
        ips.extend(inner.tokens.keys().cloned());
        ips.extend(inner.latched.iter().cloned());
        ips.into_iter().collect()
    }

    /// Computed state of one address.
    pub fn status(&self, ip: &str) -> ConnectionState {
        self.inner.lock().status(ip)
    }

    /// Computed state of every known address.
    pub fn statuses(&self) -> BTreeMap<String, ConnectionState> {
        let inner = self.inner.lock();
        let mut ips: BTreeSet<&String> = inner.liveness.keys().collect();
        ips.extend(inner.tokens.keys());
        ips.extend(inner.latched.iter());
        ips.into_iter()
            .map(|ip| (ip.clone(), inner.status(ip)))
            .collect()
    }

    /// Record an explicit per-address success from a connect/info/video
    /// step. This is the only path that clears the off-latch.
    pub fn record_connect_success(&self, ip: &str, sequence_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.status(ip);
        inner.tokens.insert(ip.to_owned(), sequence_id.to_owned());
        if inner.latched.remove(ip) {
            info!(ip, sequence_id, "off-latch cleared by explicit connect success");
        }
        inner.indeterminate_streak.remove(ip);
        let after = inner.status(ip);
        before != after
    }

    /// Feed one probe result into the registry. Returns whether the
    /// computed state of the address changed.
    ///
    /// Explicit dead results clear the connect token and latch at once; an
    /// indeterminate result only does so after the configured number of
    /// consecutive occurrences, and a lone alive observation never clears
    /// a latch.
    pub fn observe_probe(&self, ip: &str, outcome: Liveness) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.status(ip);
        match outcome {
            Liveness::Alive => {
                inner.liveness.insert(ip.to_owned(), Liveness::Alive);
                inner.indeterminate_streak.remove(ip);
            }
            Liveness::Dead => {
                inner.liveness.insert(ip.to_owned(), Liveness::Dead);
                inner.indeterminate_streak.remove(ip);
                if inner.tokens.remove(ip).is_some() {
                    debug!(ip, "connect token cleared by dead probe");
                }
                inner.latched.insert(ip.to_owned());
            }
            Liveness::Indeterminate => {
                inner
                    .liveness
                    .insert(ip.to_owned(), Liveness::Indeterminate);
                let streak = *inner
                    .indeterminate_streak
                    .entry(ip.to_owned())
                    .and_modify(|count| *count += 1)
                    .or_insert(1);
                if streak >= self.indeterminate_debounce {
                    if inner.tokens.remove(ip).is_some() {
                        debug!(ip, "connect token cleared by indeterminate streak");
                    }
                    inner.latched.insert(ip.to_owned());
                }
            }
        }
        let after = inner.status(ip);
        before != after
    }

    /// Current connect token set.
    pub fn tokens(&self) -> BTreeMap<String, String> {
        self.inner.lock().tokens.clone()
    }

    /// Current latch set.
    pub fn latched(&self) -> Vec<String> {
        self.inner.lock().latched.iter().cloned().collect()
    }

    /// Replace token and latch sets wholesale from an incoming snapshot.
    /// Liveness stays local: sibling observers probe on their own.
    pub fn apply_snapshot(&self, tokens: &BTreeMap<String, String>, latched: &[String]) {
        let mut inner = self.inner.lock();
        inner.tokens = tokens.clone();
        inner.latched = latched.iter().cloned().collect();
    }
}
