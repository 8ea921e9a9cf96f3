//! ---
//! oms_section: "04-sequencing-orchestration"
//! oms_subsection: "tests"
//! oms_type: "source"
//! oms_scope: "test"
//! oms_description: "Connect sequencer behavior tests against a scripted relay."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use r_oms_msg::{DaemonMap, Envelope};
use r_oms_registry::{ConnectionRegistry, ConnectionState};
use r_oms_sequencer::{
    ConnectSequencer, NullStateSink, SequenceError, SequenceRequest, SequenceStatus, StatePatch,
    StateSink,
};
use r_oms_transport::Relay;

/// Relay double dispatching on the envelope's category path, with a call
/// log for step-ordering assertions.
struct ScriptedRelay {
    calls: Mutex<Vec<Envelope>>,
    handler: Box<dyn Fn(&Envelope, usize) -> r_oms_transport::Result<Value> + Send + Sync>,
}

impl ScriptedRelay {
    fn new(
        handler: impl Fn(&Envelope, usize) -> r_oms_transport::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    fn calls(&self) -> Vec<Envelope> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Relay for ScriptedRelay {
    async fn send(
        &self,
        _host: &str,
        _port: u16,
        envelope: &Envelope,
        _timeout_secs: u64,
    ) -> r_oms_transport::Result<Value> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(envelope.clone());
            calls.len() - 1
        };
        (self.handler)(envelope, index)
    }
}

/// Sink capturing every patch for persistence assertions.
#[derive(Default)]
struct CapturingSink {
    patches: Mutex<Vec<Value>>,
}

#[async_trait]
impl StateSink for CapturingSink {
    async fn upsert(&self, patch: StatePatch) {
        self.patches
            .lock()
            .push(serde_json::to_value(&patch).unwrap());
    }
}

fn request() -> SequenceRequest {
    let mut daemon_map = DaemonMap::new();
    daemon_map.insert("EMd".into(), "10.0.0.5".into());
    daemon_map.insert("MMd".into(), "10.0.0.6".into());
    daemon_map.insert("CCd".into(), "10.0.0.7".into());
    SequenceRequest {
        relay_host: "10.0.0.2".into(),
        relay_port: 19765,
        dmpdip: "10.0.0.2".into(),
        daemon_map,
    }
}

fn fleet_reply(entries: &[(&str, &str, &str)]) -> Value {
    let mut list = serde_json::Map::new();
    for (name, status, ip) in entries {
        list.insert(
            (*name).to_owned(),
            json!({"Status": status, "IP": ip}),
        );
    }
    json!({"ResultCode": 1000, "DaemonList": Value::Object(list)})
}

fn version_reply(envelope: &Envelope, unit: &str, version: &str) -> Value {
    json!({
        "ResultCode": 1000,
        "From": unit,
        "Token": envelope.token,
        "Version": {unit: {"version": version, "date": "2025-11-20"}}
    })
}

/// Happy-path handler: every step answers, one fleet unit needs the
/// retry, one sub-unit version arrives only through the fallback.
fn full_fleet_handler() -> impl Fn(&Envelope, usize) -> r_oms_transport::Result<Value> + Send + Sync
{
    let fleet_attempts = Mutex::new(0usize);
    move |envelope, _| {
        match (envelope.section1.as_str(), envelope.section2.as_str()) {
            ("mtd", "connect") => {
                let list = envelope.daemon_list.as_ref().unwrap();
                if list.len() == 1 {
                    // step 1: primary only
                    return Ok(json!({"ResultCode": 1000}));
                }
                let mut attempts = fleet_attempts.lock();
                *attempts += 1;
                if *attempts == 1 {
                    Ok(fleet_reply(&[
                        ("EMd", "OK", "10.0.0.5"),
                        ("SPd", "OK", "10.0.0.6"),
                        ("CCd", "NOK", "10.0.0.7"),
                    ]))
                } else {
                    // the retry payload must be restricted to failed units
                    assert_eq!(list.len(), 1);
                    assert!(list.contains_key("CCd"));
                    Ok(fleet_reply(&[("CCd", "OK", "10.0.0.7")]))
                }
            }
            ("CCd", "Select") => Ok(json!({"ResultArray": [
                {"id": 1, "cam_idx": 11, "ip": "10.0.2.1", "model": "BGH1",
                 "PreSd_id": "10.0.3.1", "SCd_id": "10.0.4.1"},
                {"id": 2, "cam_idx": 12, "ip": "10.0.2.2", "model": "BGH1",
                 "PreSd_id": "10.0.3.2"}
            ]})),
            ("Switch", "Information") => Ok(json!({"ResultCode": 1000, "Switches": [
                {"ip": "10.0.4.1", "Model": "XS716T"}
            ]})),
            ("pcd", "daemonlist") => Ok(json!({"ResultCode": 1000, "PreSd": [
                {"IP": "10.0.3.1", "ResultCode": 1000},
                {"IP": "10.0.3.2", "ResultCode": 1000}
            ]})),
            ("Daemon", "Information") => {
                let unit = envelope.to.clone();
                if unit != "PreSd" {
                    return Ok(version_reply(envelope, &unit, "5.1.2"));
                }
                match &envelope.expect {
                    // broadcast answers inline for the first sub-unit only
                    Some(expect) if expect.ips.len() > 1 => Ok(json!({
                        "ResultCode": 1000,
                        "From": "PreSd",
                        "Token": envelope.token,
                        "SenderIP": "10.0.3.1",
                        "Version": {"PreSd": {"version": "3.2.0", "date": "2025-10-01"}}
                    })),
                    // the per-address fallback resolves the straggler
                    Some(expect) => {
                        assert_eq!(expect.count, 1);
                        Ok(json!({
                            "ResultCode": 1000,
                            "From": "PreSd",
                            "Token": envelope.token,
                            "SenderIP": expect.ips[0],
                            "Version": {"PreSd": {"version": "3.1.9", "date": "2025-09-14"}}
                        }))
                    }
                    // token polls yield nothing new in this script
                    None => Ok(json!({"ResultCode": 1000})),
                }
            }
            _ => panic!("unexpected envelope: {:?}", envelope),
        }
    }
}

#[tokio::test]
async fn step_one_failure_aborts_without_further_calls() {
    let relay = Arc::new(ScriptedRelay::new(|_, _| {
        Ok(json!({"ResultCode": 1401, "ErrorMsg": "no route to EMd"}))
    }));
    let registry = Arc::new(ConnectionRegistry::new(2));
    let sequencer = ConnectSequencer::new(relay.clone(), Arc::new(NullStateSink), registry);

    let report = sequencer.run(&request()).await.unwrap();
    assert_eq!(report.status, SequenceStatus::Failed);
    assert_eq!(relay.calls().len(), 1);
    assert!(report.topology.cameras.is_empty());
    assert!(report.versions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_sequence_reaches_done_with_retry_and_fallback() {
    let relay = Arc::new(ScriptedRelay::new(full_fleet_handler()));
    let registry = Arc::new(ConnectionRegistry::new(2));
    let sink = Arc::new(CapturingSink::default());
    let sequencer =
        ConnectSequencer::new(relay.clone(), sink.clone(), registry.clone());

    let report = sequencer.run(&request()).await.unwrap();
    assert_eq!(report.status, SequenceStatus::Done);

    // the legacy alias result surfaces under its legacy name
    assert_eq!(report.connected.get("MMd"), Some(&true));
    assert_eq!(report.connected.get("EMd"), Some(&true));
    // the NOK unit was retried once and recovered
    assert_eq!(report.retried, vec!["CCd".to_owned()]);
    assert_eq!(report.connected.get("CCd"), Some(&true));

    assert_eq!(report.topology.cameras.len(), 2);
    assert_eq!(report.topology.sub_units.len(), 2);
    assert_eq!(report.switch_models.get("10.0.4.1").map(String::as_str), Some("XS716T"));

    // versions: fleet units under legacy names, relay queried always
    assert_eq!(report.versions["MMd"].version, "5.1.2");
    assert!(report.versions.contains_key("MTd"));
    // batch resolved one sub-unit inline, fallback got the other
    assert_eq!(report.sub_unit_versions["10.0.3.1"].version, "3.2.0");
    assert_eq!(report.sub_unit_versions["10.0.3.2"].version, "3.1.9");
    assert!(report.sub_unit_pending.is_empty());

    // the per-address fallback for the straggler ran exactly once
    let fallbacks: Vec<_> = relay
        .calls()
        .iter()
        .filter(|envelope| {
            envelope.to == "PreSd"
                && envelope
                    .expect
                    .as_ref()
                    .map(|expect| expect.ips == vec!["10.0.3.2".to_owned()])
                    .unwrap_or(false)
        })
        .cloned()
        .collect();
    assert_eq!(fallbacks.len(), 1);

    // connected units earned registry tokens
    assert_eq!(registry.status("10.0.0.6"), ConnectionState::Connected);
    assert_eq!(registry.status("10.0.3.2"), ConnectionState::Connected);

    // incremental persistence happened step by step, legacy keys intact
    let patches = sink.patches.lock().clone();
    assert!(patches.len() >= 5);
    assert!(patches.iter().any(|patch| patch
        .get("connected_daemons")
        .map(|flags| flags.get("MMd") == Some(&json!(true))
            && flags.get("MMcs") == Some(&json!("ALL")))
        .unwrap_or(false)));
    assert!(patches.iter().any(|patch| patch.get("presd_ips").is_some()));
    assert!(patches
        .iter()
        .any(|patch| patch.get("presd_versions").is_some()));
}

#[tokio::test]
async fn partial_step_failures_still_reach_done() {
    // step 1 succeeds; steps 2-5 all hit transport failures
    let relay = Arc::new(ScriptedRelay::new(|envelope: &Envelope, _| {
        if envelope.section1 == "mtd"
            && envelope.daemon_list.as_ref().map(BTreeMap::len) == Some(1)
        {
            Ok(json!({"ResultCode": 1000}))
        } else {
            Err(r_oms_transport::TransportError::Relay(
                "daemon unreachable".into(),
            ))
        }
    }));
    let registry = Arc::new(ConnectionRegistry::new(2));
    let sequencer = ConnectSequencer::new(relay, Arc::new(NullStateSink), registry);

    let report = sequencer.run(&request()).await.unwrap();
    assert_eq!(report.status, SequenceStatus::Done);
    // only the step-1 facts survived
    assert_eq!(report.connected.get("MTd"), Some(&true));
    assert!(report.topology.cameras.is_empty());
    assert!(report.sub_unit_ips.is_empty());
    assert!(report.versions.is_empty());
    let failed_steps: Vec<u8> = report
        .steps
        .iter()
        .filter(|step| step.outcome == r_oms_sequencer::StepOutcome::Failed)
        .map(|step| step.step)
        .collect();
    assert!(failed_steps.contains(&2));
    assert!(failed_steps.contains(&3));
}

#[tokio::test]
async fn validation_rejects_bad_inputs_before_any_send() {
    let relay = Arc::new(ScriptedRelay::new(|_, _| panic!("must not be called")));
    let registry = Arc::new(ConnectionRegistry::new(2));
    let sequencer = ConnectSequencer::new(relay.clone(), Arc::new(NullStateSink), registry);

    let mut bad_port = request();
    bad_port.relay_port = 0;
    assert!(matches!(
        sequencer.run(&bad_port).await,
        Err(SequenceError::Validation(_))
    ));

    let mut bad_dmpdip = request();
    bad_dmpdip.dmpdip = "not-an-ip".into();
    assert!(matches!(
        sequencer.run(&bad_dmpdip).await,
        Err(SequenceError::Validation(_))
    ));

    let mut missing_primary = request();
    missing_primary.daemon_map.remove("EMd");
    assert!(matches!(
        sequencer.run(&missing_primary).await,
        Err(SequenceError::Validation(_))
    ));

    assert!(relay.calls().is_empty());
}

#[tokio::test]
async fn abort_between_steps_returns_aborted() {
    let relay = Arc::new(ScriptedRelay::new(|_, _| Ok(json!({"ResultCode": 1000}))));
    let registry = Arc::new(ConnectionRegistry::new(2));
    let sequencer = ConnectSequencer::new(relay.clone(), Arc::new(NullStateSink), registry);
    sequencer.abort_handle().abort();

    let report = sequencer.run(&request()).await.unwrap();
    assert_eq!(report.status, SequenceStatus::Aborted);
    assert!(relay.calls().is_empty());
}
