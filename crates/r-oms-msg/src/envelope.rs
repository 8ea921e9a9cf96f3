//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::daemon_map::{sanitize_daemon_map, DaemonMap};
use crate::token::make_token;
use crate::topology::{CameraRecord, SubUnitGroup};

/// Semantic success code shared by every daemon reply.
pub const RESULT_OK: i64 = 1000;

/// Logical sender name carried in the `From` field of every request.
pub const OBSERVER_NAME: &str = "OMS";

/// Relay/management daemon: target of fleet connect runs, versioned
/// unconditionally in step 5.
pub const RELAY_UNIT: &str = "MTd";
/// Directory/event manager daemon queried for the live topology.
pub const DIRECTORY_UNIT: &str = "EMd";
/// Grouping daemon that receives the batched sub-unit connect.
pub const GROUPING_UNIT: &str = "PCd";
/// Camera controller daemon.
pub const CAMERA_UNIT: &str = "CCd";
/// Switch controller daemon.
pub const SWITCH_UNIT: &str = "SCd";
/// Pre-processing sub-unit daemon; replies are keyed by sender IP.
pub const SUB_UNIT: &str = "PreSd";

/// Operation verb of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Read-only query.
    Get,
    /// State-changing write.
    Set,
    /// Imperative command.
    Run,
}

/// Direction marker of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    /// Outbound request.
    Request,
    /// Inbound reply.
    Response,
}

/// Batch-collection directive: how many asynchronous responders share the
/// request's token and how long the relay should hold the fan-out open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expect {
    /// Responder addresses expected to answer.
    pub ips: Vec<String>,
    /// Number of replies the relay should wait for inline.
    pub count: usize,
    /// Seconds the relay holds the collection window open.
    pub wait_sec: u64,
}

/// Camera row carried by the AddCamera operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    /// Camera address.
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    /// Camera model string; empty when unknown.
    #[serde(rename = "Model", default)]
    pub model: String,
}

/// Switch row carried by the switch model query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRef {
    /// Switch address.
    pub ip: String,
}

/// The `Cameras` field appears in two shapes on the wire: full rows for
/// AddCamera and bare address lists for the info/video queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CamerasField {
    /// Address-only list (GetCameraInfo / GetVideoFormat).
    Ips(Vec<String>),
    /// Full camera rows (AddCamera).
    Specs(Vec<CameraSpec>),
}

/// Wire message sent through the relay for every daemon operation.
///
/// Field names are the wire protocol's own; the daemons are case-sensitive
/// about them, so the serde renames below are load-bearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Category path, outermost segment.
    #[serde(rename = "Section1")]
    pub section1: String,
    /// Category path, middle segment.
    #[serde(rename = "Section2")]
    pub section2: String,
    /// Category path, innermost segment; frequently empty.
    #[serde(rename = "Section3", default)]
    pub section3: String,
    /// Direction marker.
    #[serde(rename = "SendState")]
    pub send_state: SendState,
    /// Logical sender name.
    #[serde(rename = "From")]
    pub from: String,
    /// Logical target unit.
    #[serde(rename = "To")]
    pub to: String,
    /// Correlation id shared by a request and its replies.
    #[serde(rename = "Token")]
    pub token: String,
    /// Operation verb.
    #[serde(rename = "Action")]
    pub action: Action,
    /// Management IP every unit resolves relative to.
    #[serde(rename = "DMPDIP")]
    pub dmpdip: String,
    /// Batch-collection directive, present only for fan-out queries.
    #[serde(rename = "Expect", default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Expect>,
    /// Sanitized unit map for fleet connect runs.
    #[serde(rename = "DaemonList", default, skip_serializing_if = "Option::is_none")]
    pub daemon_list: Option<DaemonMap>,
    /// Pre-processing groups for the batched sub-unit connect.
    #[serde(rename = "PreSd", default, skip_serializing_if = "Option::is_none")]
    pub pre_sd: Option<Vec<SubUnitGroup>>,
    /// Post-processing groups; always sent (possibly empty) alongside `PreSd`.
    #[serde(rename = "PostSd", default, skip_serializing_if = "Option::is_none")]
    pub post_sd: Option<Vec<SubUnitGroup>>,
    /// Video-processing groups; always sent (possibly empty) alongside `PreSd`.
    #[serde(rename = "VPd", default, skip_serializing_if = "Option::is_none")]
    pub vpd: Option<Vec<SubUnitGroup>>,
    /// Camera payload for the camera bring-up operations.
    #[serde(rename = "Cameras", default, skip_serializing_if = "Option::is_none")]
    pub cameras: Option<CamerasField>,
    /// Switch payload for the model query.
    #[serde(rename = "Switches", default, skip_serializing_if = "Option::is_none")]
    pub switches: Option<Vec<SwitchRef>>,
}

impl Envelope {
    fn base(
        sections: (&str, &str, &str),
        to: &str,
        action: Action,
        dmpdip: &str,
    ) -> Self {
        Self {
            section1: sections.0.to_owned(),
            section2: sections.1.to_owned(),
            section3: sections.2.to_owned(),
            send_state: SendState::Request,
            from: OBSERVER_NAME.to_owned(),
            to: to.to_owned(),
            token: make_token(),
            action,
            dmpdip: dmpdip.to_owned(),
            expect: None,
            daemon_list: None,
            pre_sd: None,
            post_sd: None,
            vpd: None,
            cameras: None,
            switches: None,
        }
    }

    /// Fleet connect run towards the relay. The supplied map is sanitized
    /// (disallowed units dropped, legacy alias rewritten) before it is
    /// embedded.
    pub fn fleet_connect(dmpdip: &str, daemon_map: &DaemonMap) -> Self {
        let mut envelope = Self::base(("mtd", "connect", ""), RELAY_UNIT, Action::Run, dmpdip);
        envelope.daemon_list = Some(sanitize_daemon_map(daemon_map));
        envelope
    }

    /// Topology select query towards the directory unit.
    pub fn topology_select(dmpdip: &str) -> Self {
        Self::base(("CCd", "Select", ""), DIRECTORY_UNIT, Action::Get, dmpdip)
    }

    /// One batched sub-unit connect carrying every discovered group. The
    /// protocol requires the sibling group fields to be present even when
    /// empty.
    pub fn sub_unit_connect(dmpdip: &str, groups: &[SubUnitGroup]) -> Self {
        let mut envelope = Self::base(
            ("pcd", "daemonlist", "connect"),
            GROUPING_UNIT,
            Action::Set,
            dmpdip,
        );
        envelope.pre_sd = Some(groups.to_vec());
        envelope.post_sd = Some(Vec::new());
        envelope.vpd = Some(Vec::new());
        envelope
    }

    /// Version query towards a single unit.
    pub fn version_query(dmpdip: &str, to: &str) -> Self {
        Self::base(
            ("Daemon", "Information", "Version"),
            to,
            Action::Set,
            dmpdip,
        )
    }

    /// AddCamera towards the camera controller.
    pub fn camera_add(dmpdip: &str, cameras: &[CameraRecord]) -> Self {
        let mut envelope = Self::base(
            ("Camera", "Information", "AddCamera"),
            CAMERA_UNIT,
            Action::Set,
            dmpdip,
        );
        envelope.cameras = Some(CamerasField::Specs(
            cameras
                .iter()
                .map(|camera| CameraSpec {
                    ip_address: camera.ip.clone(),
                    model: camera.model.clone(),
                })
                .collect(),
        ));
        envelope
    }

    /// Camera connect run towards the camera controller.
    pub fn camera_connect(dmpdip: &str) -> Self {
        Self::base(
            ("Camera", "Operation", "Connect"),
            CAMERA_UNIT,
            Action::Run,
            dmpdip,
        )
    }

    /// Per-camera metadata query.
    pub fn camera_info(dmpdip: &str, ips: &[String]) -> Self {
        let mut envelope = Self::base(
            ("Camera", "Information", "GetCameraInfo"),
            CAMERA_UNIT,
            Action::Get,
            dmpdip,
        );
        envelope.cameras = Some(CamerasField::Ips(ips.to_vec()));
        envelope
    }

    /// Per-camera video format query.
    pub fn video_format(dmpdip: &str, ips: &[String]) -> Self {
        let mut envelope = Self::base(
            ("Camera", "Information", "GetVideoFormat"),
            CAMERA_UNIT,
            Action::Get,
            dmpdip,
        );
        envelope.cameras = Some(CamerasField::Ips(ips.to_vec()));
        envelope
    }

    /// Switch model query for several switches in one envelope.
    pub fn switch_model(dmpdip: &str, switch_ips: &[String]) -> Self {
        let mut envelope = Self::base(
            ("Switch", "Information", "Model"),
            SWITCH_UNIT,
            Action::Get,
            dmpdip,
        );
        envelope.switches = Some(
            switch_ips
                .iter()
                .filter(|ip| !ip.is_empty())
                .map(|ip| SwitchRef { ip: ip.clone() })
                .collect(),
        );
        envelope
    }

    /// Pin the correlation token, keeping a poll sequence correlated to one
    /// logical batch.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_owned();
        self
    }

    /// Attach a batch-collection directive.
    pub fn with_expect(mut self, ips: Vec<String>, count: usize, wait_sec: u64) -> Self {
        self.expect = Some(Expect {
            ips,
            count,
            wait_sec,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon_map::DaemonMap;

    fn sample_map() -> DaemonMap {
        let mut map = DaemonMap::new();
        map.insert("EMd".into(), "10.0.0.5".into());
        map.insert("MMd".into(), "10.0.0.6".into());
        map.insert("MMc".into(), "10.0.0.7".into());
        map
    }

    #[test]
    fn fleet_connect_embeds_sanitized_map() {
        let envelope = Envelope::fleet_connect("10.0.0.1", &sample_map());
        let list = envelope.daemon_list.expect("daemon list present");
        assert_eq!(list.get("SPd").map(String::as_str), Some("10.0.0.6"));
        assert!(!list.contains_key("MMd"));
        assert!(!list.contains_key("MMc"));
        assert_eq!(envelope.to, RELAY_UNIT);
        assert_eq!(envelope.action, Action::Run);
    }

    #[test]
    fn wire_field_names_are_protocol_cased() {
        let envelope = Envelope::topology_select("10.0.0.1");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["Section1"], "CCd");
        assert_eq!(json["SendState"], "request");
        assert_eq!(json["Action"], "get");
        assert_eq!(json["DMPDIP"], "10.0.0.1");
        assert_eq!(json["From"], OBSERVER_NAME);
        // optional payloads stay off the wire entirely
        assert!(json.get("DaemonList").is_none());
        assert!(json.get("Expect").is_none());
    }

    #[test]
    fn sub_unit_connect_always_carries_sibling_groups() {
        let envelope = Envelope::sub_unit_connect("10.0.0.1", &[]);
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json["PreSd"].as_array().unwrap().is_empty());
        assert!(json["PostSd"].as_array().unwrap().is_empty());
        assert!(json["VPd"].as_array().unwrap().is_empty());
    }

    #[test]
    fn pinned_token_survives_expect() {
        let envelope = Envelope::version_query("10.0.0.1", SUB_UNIT)
            .with_token("0912_1700000000000_abc")
            .with_expect(vec!["10.0.1.1".into()], 1, 5);
        assert_eq!(envelope.token, "0912_1700000000000_abc");
        assert_eq!(envelope.expect.unwrap().count, 1);
    }
}
