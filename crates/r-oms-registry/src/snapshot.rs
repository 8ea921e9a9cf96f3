//! ---
//! oms_section: "06-status-synchronization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Connection registry and cross-observer status synchronization."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use r_oms_msg::{CameraInfo, CameraRecord, VideoFormat};

/// Full serializable fleet view shared across observers.
///
/// Snapshots are always published and applied whole; there is no
/// field-level merge. Writers bump `updated_at` monotonically and readers
/// keep whichever document carries the newest timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Discovered cameras.
    #[serde(default)]
    pub cameras: Vec<CameraRecord>,
    /// Per-address status labels as shown to operators.
    #[serde(default)]
    pub status: BTreeMap<String, String>,
    /// Camera metadata rows.
    #[serde(default)]
    pub camera_info: Vec<CameraInfo>,
    /// Video format rows.
    #[serde(default)]
    pub video_formats: Vec<VideoFormat>,
    /// Connect token per address.
    #[serde(default)]
    pub connect_tokens: BTreeMap<String, String>,
    /// Latched addresses.
    #[serde(default)]
    pub latched: Vec<String>,
    /// Epoch milliseconds of the write that produced this snapshot.
    #[serde(default)]
    pub updated_at: i64,
}

impl StatusSnapshot {
    /// Stamp the snapshot with a timestamp strictly newer than `previous`,
    /// so last-write-wins ordering holds even for writes within the same
    /// millisecond.
    pub fn stamped_after(mut self, previous: i64) -> Self {
        self.updated_at = Utc::now().timestamp_millis().max(previous + 1);
        self
    }

    /// Whether this snapshot supersedes `other` under last-write-wins.
    pub fn is_newer_than(&self, other: &StatusSnapshot) -> bool {
        self.updated_at > other.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamping_is_strictly_monotonic() {
        let first = StatusSnapshot::default().stamped_after(0);
        let second = StatusSnapshot::default().stamped_after(first.updated_at);
        assert!(second.is_newer_than(&first));
        // even a stamp far in the future is superseded
        let third = StatusSnapshot::default().stamped_after(i64::MAX - 1);
        assert_eq!(third.updated_at, i64::MAX);
    }

    #[test]
    fn roundtrips_through_json() {
        let mut snapshot = StatusSnapshot::default();
        snapshot.status.insert("10.0.2.1".into(), "connected".into());
        snapshot
            .connect_tokens
            .insert("10.0.2.1".into(), "seq-1".into());
        snapshot.latched.push("10.0.2.9".into());
        snapshot.updated_at = 42;

        let json = serde_json::to_value(&snapshot).unwrap();
        let back: StatusSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn missing_fields_default_cleanly() {
        let back: StatusSnapshot = serde_json::from_str("{}").unwrap();
        assert!(back.cameras.is_empty());
        assert_eq!(back.updated_at, 0);
    }
}
