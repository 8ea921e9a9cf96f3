//! ---
//! oms_section: "15-testing-qa-runbook"
//! oms_subsection: "tests"
//! oms_type: "source"
//! oms_scope: "test"
//! oms_description: "Liveness, latch, and cross-observer synchronization tests."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use r_oms_msg::{CameraRecord, Envelope};
use r_oms_registry::{
    spawn_liveness_watch, ConnectionRegistry, ConnectionState, Liveness, Prober,
};
use r_oms_sequencer::CameraBringUp;
use r_oms_transport::Relay;

/// Prober replaying a fixed script per address; the last entry repeats.
struct ScriptedProber {
    script: Mutex<Vec<Liveness>>,
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _ip: &str) -> Liveness {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0]
        }
    }
}

#[tokio::test]
async fn alive_alive_dead_yields_on_on_off_and_latches_on_dead_only() {
    let registry = Arc::new(ConnectionRegistry::new(2));
    registry.track("10.0.0.9");
    let prober = Arc::new(ScriptedProber {
        script: Mutex::new(vec![Liveness::Alive, Liveness::Alive, Liveness::Dead]),
    });

    let (_handle, mut changes) =
        spawn_liveness_watch(registry.clone(), prober, Duration::from_millis(5));

    let first = changes.recv().await.unwrap();
    assert_eq!(first.state, ConnectionState::On);
    // the second alive observation is not a transition; the next change is
    // the hard failure, which latches immediately with no debounce
    let second = changes.recv().await.unwrap();
    assert_eq!(second.state, ConnectionState::Off);
    assert_eq!(registry.latched(), vec!["10.0.0.9".to_owned()]);
}

#[tokio::test]
async fn indeterminate_needs_two_consecutive_probes_to_clear_a_token() {
    let registry = ConnectionRegistry::new(2);
    registry.record_connect_success("10.0.0.9", "seq-1");

    registry.observe_probe("10.0.0.9", Liveness::Indeterminate);
    assert_eq!(registry.status("10.0.0.9"), ConnectionState::Connected);

    registry.observe_probe("10.0.0.9", Liveness::Indeterminate);
    assert_ne!(registry.status("10.0.0.9"), ConnectionState::Connected);
    assert!(registry.tokens().is_empty());
}

/// Relay double for the camera bring-up: add/connect/info/video all
/// answer per camera.
struct CameraRelay;

#[async_trait]
impl Relay for CameraRelay {
    async fn send(
        &self,
        _host: &str,
        _port: u16,
        envelope: &Envelope,
        _timeout_secs: u64,
    ) -> r_oms_transport::Result<Value> {
        match envelope.section3.as_str() {
            "AddCamera" => Ok(json!({"ResultCode": 1000})),
            "Connect" => Ok(json!({"ResultCode": 1000, "Cameras": [
                {"IPAddress": "10.0.2.1", "Status": "OK"}
            ]})),
            "GetCameraInfo" => Ok(json!({"ResultCode": 1000, "Cameras": [
                {"IPAddress": "10.0.2.1", "ModelName": "BGH1", "FirmwareVersion": "2.0"}
            ]})),
            "GetVideoFormat" => Ok(json!({"ResultCode": 1000, "Cameras": [
                {"IPAddress": "10.0.2.1", "VideoFormatMain": "3840x2160p60", "Codec": "H.265"}
            ]})),
            _ => Ok(json!({"ResultCode": 1000})),
        }
    }
}

#[tokio::test]
async fn latched_camera_recovers_only_through_an_explicit_success() {
    let registry = Arc::new(ConnectionRegistry::new(2));
    registry.record_connect_success("10.0.2.1", "seq-1");
    registry.observe_probe("10.0.2.1", Liveness::Dead);
    assert_eq!(registry.status("10.0.2.1"), ConnectionState::Off);

    // a transient successful ping alone must not flip it back
    registry.observe_probe("10.0.2.1", Liveness::Alive);
    assert_eq!(registry.status("10.0.2.1"), ConnectionState::On);

    // a fresh camera bring-up reports per-address success and clears the latch
    let bring_up = CameraBringUp::new(Arc::new(CameraRelay), registry.clone());
    let cameras = vec![CameraRecord {
        index: 1,
        ip: "10.0.2.1".into(),
        model: "BGH1".into(),
    }];
    let report = bring_up
        .run("10.0.0.2", 19765, "10.0.0.2", &cameras)
        .await;

    assert!(report.failed_step.is_none());
    assert_eq!(
        report.statuses.get("10.0.2.1").map(String::as_str),
        Some("video ok")
    );
    assert_eq!(report.info.len(), 1);
    assert_eq!(report.video.len(), 1);
    assert_eq!(registry.status("10.0.2.1"), ConnectionState::Connected);
    assert!(registry.latched().is_empty());
}
