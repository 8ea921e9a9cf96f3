//! ---
//! oms_section: "04-sequencing-orchestration"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Ordered fleet connect sequencing."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use r_oms_msg::reply::VersionReport;
use r_oms_msg::{CameraRecord, DaemonMap, SubUnitGroup};
use r_oms_transport::StateClient;

/// Partial snapshot pushed after each sequence step. Field names are the
/// server's state-document keys; only populated fields go on the wire and
/// the server owns the merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatePatch {
    /// Management IP the fleet resolves against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmpdip: Option<String>,
    /// Per-unit connect flags, plus the `MMcs: "ALL"` bulk hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_daemons: Option<BTreeMap<String, Value>>,
    /// Relay host the sequence ran against.
    #[serde(rename = "mtd_host", skip_serializing_if = "Option::is_none")]
    pub relay_host: Option<String>,
    /// Relay port the sequence ran against.
    #[serde(rename = "mtd_port", skip_serializing_if = "Option::is_none")]
    pub relay_port: Option<u16>,
    /// Daemon map as sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_map: Option<DaemonMap>,
    /// Discovered cameras.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cameras: Option<Vec<CameraRecord>>,
    /// Discovered sub-unit groups.
    #[serde(rename = "presd", skip_serializing_if = "Option::is_none")]
    pub sub_units: Option<Vec<SubUnitGroup>>,
    /// Discovered switch addresses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_ips: Option<Vec<String>>,
    /// Switch model strings keyed by address.
    #[serde(rename = "switches", skip_serializing_if = "Option::is_none")]
    pub switch_models: Option<BTreeMap<String, String>>,
    /// Sub-unit addresses that confirmed the batched connect.
    #[serde(rename = "presd_ips", skip_serializing_if = "Option::is_none")]
    pub sub_unit_ips: Option<Vec<String>>,
    /// Version table keyed by surfaced (legacy) unit name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<BTreeMap<String, VersionReport>>,
    /// Sub-unit version table keyed by address.
    #[serde(rename = "presd_versions", skip_serializing_if = "Option::is_none")]
    pub sub_unit_versions: Option<BTreeMap<String, VersionReport>>,
}

/// Seam for persisting incremental sequence progress. Persistence is
/// best-effort by contract: implementations log failures and never
/// surface them to the sequence.
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Push one partial snapshot.
    async fn upsert(&self, patch: StatePatch);
}

/// Sink writing to the server's incremental-state endpoint.
pub struct HttpStateSink {
    client: StateClient,
}

impl HttpStateSink {
    /// Wrap a state client.
    pub fn new(client: StateClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StateSink for HttpStateSink {
    async fn upsert(&self, patch: StatePatch) {
        let payload = match serde_json::to_value(&patch) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "state patch serialization failed");
                return;
            }
        };
        if let Err(err) = self.client.upsert(&payload).await {
            warn!(error = %err, "state upsert failed");
        }
    }
}

/// Sink that drops every patch; used by dry runs and tests.
pub struct NullStateSink;

#[async_trait]
impl StateSink for NullStateSink {
    async fn upsert(&self, _patch: StatePatch) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_populated_fields_serialize() {
        let patch = StatePatch {
            dmpdip: Some("10.0.0.1".into()),
            relay_host: Some("10.0.0.2".into()),
            ..StatePatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["dmpdip"], "10.0.0.1");
        assert_eq!(json["mtd_host"], "10.0.0.2");
        assert!(json.get("connected_daemons").is_none());
        assert!(json.get("presd").is_none());
    }

    #[test]
    fn wire_key_renames_hold() {
        let mut versions = BTreeMap::new();
        versions.insert("10.0.3.1".to_owned(), VersionReport::default());
        let patch = StatePatch {
            sub_unit_ips: Some(vec!["10.0.3.1".into()]),
            sub_unit_versions: Some(versions),
            ..StatePatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert!(json.get("presd_ips").is_some());
        assert!(json.get("presd_versions").is_some());
        assert!(json.get("sub_unit_ips").is_none());
    }
}
