//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Extractors over raw daemon replies.
//!
//! Replies arrive as loosely shaped JSON; the daemons disagree on casing
//! and on whether numeric codes are numbers or strings, so everything here
//! is tolerant by construction and returns options or defaults instead of
//! failing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::RESULT_OK;

/// Placeholder used where a daemon did not report a value.
pub const UNKNOWN: &str = "-";

/// Per-unit outcome row in a fleet connect reply.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitStatus {
    /// Raw status string, `OK`/`NOK` in practice.
    pub status: String,
    /// Address echoed back by the relay, when present.
    pub ip: Option<String>,
}

impl UnitStatus {
    /// Case-insensitive success check.
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("OK")
    }
}

/// Version string and build date reported by a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionReport {
    /// Reported version, `-` when unknown.
    #[serde(default = "unknown_string")]
    pub version: String,
    /// Reported build date, `-` when unknown.
    #[serde(default = "unknown_string")]
    pub date: String,
}

fn unknown_string() -> String {
    UNKNOWN.to_owned()
}

impl Default for VersionReport {
    fn default() -> Self {
        Self {
            version: unknown_string(),
            date: unknown_string(),
        }
    }
}

impl VersionReport {
    /// Whether the unit actually reported a version.
    pub fn is_resolved(&self) -> bool {
        self.version != UNKNOWN
    }
}

/// Per-group outcome row in a batched sub-unit connect reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SubUnitResult {
    /// Sub-unit address.
    pub ip: String,
    /// Result code for that group.
    pub code: i64,
}

/// Read the reply's result code, accepting both numeric and string forms.
pub fn result_code(resp: &Value) -> Option<i64> {
    match resp.get("ResultCode") {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(raw)) => raw.parse().ok(),
        _ => None,
    }
}

/// Whether the reply carries the semantic success code.
pub fn is_ok(resp: &Value) -> bool {
    result_code(resp) == Some(RESULT_OK)
}

/// Relay-level error string, when the reply carries one.
pub fn error_message(resp: &Value) -> Option<String> {
    resp.get("ErrorMsg")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Per-unit outcomes of a fleet connect reply, keyed by wire unit name.
pub fn daemon_results(resp: &Value) -> BTreeMap<String, UnitStatus> {
    let mut out = BTreeMap::new();
    let Some(list) = resp.get("DaemonList").and_then(Value::as_object) else {
        return out;
    };
    for (name, entry) in list {
        let status = entry
            .get("Status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let ip = entry.get("IP").and_then(Value::as_str).map(str::to_owned);
        out.insert(name.clone(), UnitStatus { status, ip });
    }
    out
}

/// Version table entry for one unit in a version reply.
pub fn version_of(resp: &Value, unit: &str) -> VersionReport {
    resp.get("Version")
        .and_then(|versions| versions.get(unit))
        .and_then(|entry| serde_json::from_value(entry.clone()).ok())
        .unwrap_or_default()
}

/// Address of the unit that produced a batched reply.
pub fn sender_ip(resp: &Value) -> Option<&str> {
    resp.get("SenderIP").and_then(Value::as_str)
}

/// Correlation token echoed by the reply.
pub fn token(resp: &Value) -> Option<&str> {
    resp.get("Token").and_then(Value::as_str)
}

/// Logical unit the reply originates from.
pub fn from_unit(resp: &Value) -> Option<&str> {
    resp.get("From").and_then(Value::as_str)
}

/// Per-group outcomes of a batched sub-unit connect reply.
pub fn sub_unit_results(resp: &Value) -> Vec<SubUnitResult> {
    let Some(rows) = resp.get("PreSd").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let ip = row.get("IP").and_then(Value::as_str)?;
            Some(SubUnitResult {
                ip: ip.to_owned(),
                code: result_code(row).unwrap_or_default(),
            })
        })
        .collect()
}

/// Per-camera status rows of a camera connect reply: `(ip, status)`.
pub fn camera_statuses(resp: &Value) -> Vec<(String, String)> {
    let Some(rows) = resp.get("Cameras").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let ip = ["IPAddress", "IP", "ip"]
                .iter()
                .find_map(|key| row.get(*key).and_then(Value::as_str))?;
            let status = row
                .get("Status")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some((ip.to_owned(), status.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_code_accepts_number_and_string() {
        assert_eq!(result_code(&json!({"ResultCode": 1000})), Some(1000));
        assert_eq!(result_code(&json!({"ResultCode": "1000"})), Some(1000));
        assert_eq!(result_code(&json!({})), None);
        assert!(is_ok(&json!({"ResultCode": 1000})));
        assert!(!is_ok(&json!({"ResultCode": 1401})));
    }

    #[test]
    fn daemon_results_extracts_status_rows() {
        let resp = json!({"DaemonList": {
            "EMd": {"Status": "OK", "IP": "10.0.0.5"},
            "SPd": {"Status": "NOK"}
        }});
        let results = daemon_results(&resp);
        assert!(results["EMd"].is_ok());
        assert_eq!(results["EMd"].ip.as_deref(), Some("10.0.0.5"));
        assert!(!results["SPd"].is_ok());
    }

    #[test]
    fn version_of_defaults_when_absent() {
        let resp = json!({"Version": {"EMd": {"version": "5.1.2", "date": "2025-11-20"}}});
        let report = version_of(&resp, "EMd");
        assert_eq!(report.version, "5.1.2");
        assert!(report.is_resolved());
        let missing = version_of(&resp, "CCd");
        assert_eq!(missing.version, UNKNOWN);
        assert!(!missing.is_resolved());
    }

    #[test]
    fn sub_unit_results_reads_group_rows() {
        let resp = json!({"PreSd": [
            {"IP": "10.0.3.1", "ResultCode": 1000},
            {"IP": "10.0.3.2", "ResultCode": 1401},
            {"ResultCode": 1000}
        ]});
        let rows = sub_unit_results(&resp);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, 1000);
        assert_eq!(rows[1].ip, "10.0.3.2");
    }

    #[test]
    fn camera_statuses_tolerates_key_variants() {
        let resp = json!({"Cameras": [
            {"IPAddress": "10.0.2.1", "Status": "OK"},
            {"ip": "10.0.2.2", "Status": "TimedOut"}
        ]});
        let rows = camera_statuses(&resp);
        assert_eq!(rows[0], ("10.0.2.1".to_owned(), "OK".to_owned()));
        assert_eq!(rows[1].1, "TimedOut");
    }
}
