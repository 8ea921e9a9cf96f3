//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default operating mode assigned to discovered sub-unit groups.
const DEFAULT_SUB_UNIT_MODE: &str = "replay";

/// One discovered camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    /// Fleet-assigned camera index.
    #[serde(rename = "Index")]
    pub index: i64,
    /// Camera address.
    #[serde(rename = "IP")]
    pub ip: String,
    /// Camera model string; empty when the directory does not know it.
    #[serde(rename = "CameraModel", default)]
    pub model: String,
}

/// Cameras grouped under one owning sub-unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubUnitGroup {
    /// Sub-unit address.
    #[serde(rename = "IP")]
    pub ip: String,
    /// Operating mode for the group.
    #[serde(rename = "Mode")]
    pub mode: String,
    /// Cameras owned by the sub-unit.
    #[serde(rename = "Cameras", default)]
    pub cameras: Vec<CameraRecord>,
}

/// Normalized topology extracted from a directory select reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    /// Every camera known to the directory.
    pub cameras: Vec<CameraRecord>,
    /// Cameras grouped by owning sub-unit, in discovery order.
    pub sub_units: Vec<SubUnitGroup>,
    /// Switch addresses discovered as a side channel of the flat shape.
    pub switch_ips: Vec<String>,
}

fn str_field<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .filter(|value| !value.is_empty())
}

fn int_field(row: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| row.get(*key).and_then(Value::as_i64))
}

fn flat_camera(row: &Value) -> Option<CameraRecord> {
    let ip = str_field(row, &["ip"])?;
    Some(CameraRecord {
        index: int_field(row, &["cam_idx", "id"]).unwrap_or_default(),
        ip: ip.to_owned(),
        model: str_field(row, &["model"]).unwrap_or_default().to_owned(),
    })
}

fn legacy_camera(row: &Value) -> Option<CameraRecord> {
    let ip = str_field(row, &["IP", "IPAddress"])?;
    Some(CameraRecord {
        index: int_field(row, &["Index"]).unwrap_or_default(),
        ip: ip.to_owned(),
        model: str_field(row, &["CameraModel", "Model"])
            .unwrap_or_default()
            .to_owned(),
    })
}

/// Parse a directory select reply into the normalized topology model.
///
/// Two response shapes exist in the fleet: the current flat `ResultArray`
/// keyed by per-camera fields (with the owning sub-unit id and an optional
/// switch id on every row), and the legacy nested shape with explicit
/// camera and sub-unit lists. Both normalize to the same model; rows
/// without an address are discarded.
pub fn parse_topology(resp: &Value) -> Topology {
    if let Some(rows) = resp.get("ResultArray").and_then(Value::as_array) {
        if !rows.is_empty() {
            let cameras: Vec<CameraRecord> = rows.iter().filter_map(flat_camera).collect();

            let mut grouped: IndexMap<String, SubUnitGroup> = IndexMap::new();
            let mut switches: IndexSet<String> = IndexSet::new();
            for row in rows {
                if let Some(switch_id) = str_field(row, &["SCd_id"]) {
                    switches.insert(switch_id.to_owned());
                }
                let Some(owner) = str_field(row, &["PreSd_id", "presd_id", "PreSd"]) else {
                    continue;
                };
                let group = grouped.entry(owner.to_owned()).or_insert_with(|| SubUnitGroup {
                    ip: owner.to_owned(),
                    mode: DEFAULT_SUB_UNIT_MODE.to_owned(),
                    cameras: Vec::new(),
                });
                if let Some(camera) = flat_camera(row) {
                    group.cameras.push(camera);
                }
            }

            return Topology {
                cameras,
                sub_units: grouped.into_values().collect(),
                switch_ips: switches.into_iter().collect(),
            };
        }
    }

    // legacy nested shape
    let camera_rows = ["Cameras", "CameraList", "CameraInfo"]
        .iter()
        .find_map(|key| resp.get(*key).and_then(Value::as_array));
    let cameras = camera_rows
        .map(|rows| rows.iter().filter_map(legacy_camera).collect())
        .unwrap_or_default();

    let group_rows = ["PreSd", "PreSdList"]
        .iter()
        .find_map(|key| resp.get(*key).and_then(Value::as_array));
    let mut sub_units = Vec::new();
    for row in group_rows.into_iter().flatten() {
        let Some(ip) = str_field(row, &["IP"]) else {
            continue;
        };
        let cameras = row
            .get("Cameras")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(legacy_camera).collect())
            .unwrap_or_default();
        sub_units.push(SubUnitGroup {
            ip: ip.to_owned(),
            mode: str_field(row, &["Mode"])
                .unwrap_or(DEFAULT_SUB_UNIT_MODE)
                .to_owned(),
            cameras,
        });
    }

    Topology {
        cameras,
        sub_units,
        switch_ips: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_shape_groups_by_sub_unit_and_collects_switches() {
        let resp = json!({
            "ResultArray": [
                {"id": 1, "cam_idx": 11, "ip": "10.0.2.1", "model": "BGH1", "PreSd_id": "10.0.3.1", "SCd_id": "10.0.4.1"},
                {"id": 2, "cam_idx": 12, "ip": "10.0.2.2", "model": "BGH1", "PreSd_id": "10.0.3.1", "SCd_id": "10.0.4.1"},
                {"id": 3, "ip": "10.0.2.3", "presd_id": "10.0.3.2", "SCd_id": "10.0.4.2"},
                {"id": 4, "ip": ""}
            ]
        });
        let topology = parse_topology(&resp);
        assert_eq!(topology.cameras.len(), 3);
        assert_eq!(topology.cameras[0].index, 11);
        // row 3 has no cam_idx, so the id stands in
        assert_eq!(topology.cameras[2].index, 3);
        assert_eq!(topology.sub_units.len(), 2);
        assert_eq!(topology.sub_units[0].ip, "10.0.3.1");
        assert_eq!(topology.sub_units[0].mode, "replay");
        assert_eq!(topology.sub_units[0].cameras.len(), 2);
        assert_eq!(topology.switch_ips, vec!["10.0.4.1", "10.0.4.2"]);
    }

    #[test]
    fn legacy_shape_normalizes_to_same_model() {
        let resp = json!({
            "CameraList": [
                {"Index": 1, "IPAddress": "10.0.2.1", "Model": "BGH1"},
                {"Index": 2, "IP": "10.0.2.2"}
            ],
            "PreSdList": [
                {"IP": "10.0.3.1", "Mode": "live", "Cameras": [
                    {"Index": 1, "IP": "10.0.2.1", "CameraModel": "BGH1"}
                ]},
                {"Mode": "replay"}
            ]
        });
        let topology = parse_topology(&resp);
        assert_eq!(topology.cameras.len(), 2);
        assert_eq!(topology.cameras[0].model, "BGH1");
        assert_eq!(topology.sub_units.len(), 1);
        assert_eq!(topology.sub_units[0].mode, "live");
        assert!(topology.switch_ips.is_empty());
    }

    #[test]
    fn empty_reply_yields_empty_topology() {
        let topology = parse_topology(&json!({}));
        assert!(topology.cameras.is_empty());
        assert!(topology.sub_units.is_empty());
        assert!(topology.switch_ips.is_empty());
    }
}
