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
use std::sync::Arc;

use tracing::warn;

use r_oms_msg::reply;
use r_oms_msg::{
    make_token, parse_camera_info, parse_video_format, CameraInfo, CameraRecord, Envelope,
    VideoFormat,
};
use r_oms_registry::{ConnectionRegistry, Mode, Phase, ProgressEvent, ProgressReporter, Scope};
use r_oms_transport::Relay;

const ADD_TIMEOUT: u64 = 10;
const CONNECT_TIMEOUT: u64 = 12;
const QUERY_TIMEOUT: u64 = 12;

/// Result of one camera bring-up run. Statuses advance per camera as the
/// steps land: `pending`, `added`, `connected`, `info ok`, `video ok`, or
/// a failure marker naming the step that broke.
#[derive(Debug, Clone, Default)]
pub struct CameraReport {
    /// Per-camera status labels keyed by address.
    pub statuses: BTreeMap<String, String>,
    /// Camera metadata rows fetched in the info step.
    pub info: Vec<CameraInfo>,
    /// Video format rows fetched in the format step.
    pub video: Vec<VideoFormat>,
    /// Name of the step that terminated the run early, if any. The info
    /// and format queries are best-effort and never set this.
    pub failed_step: Option<&'static str>,
}

/// Camera bring-up: add the selected cameras to the controller, connect
/// them, then enrich the view with metadata and stream formats.
pub struct CameraBringUp {
    relay: Arc<dyn Relay>,
    registry: Arc<ConnectionRegistry>,
    reporter: Option<ProgressReporter>,
}

impl CameraBringUp {
    /// Wire the bring-up to its collaborators.
    pub fn new(relay: Arc<dyn Relay>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            relay,
            registry,
            reporter: None,
        }
    }

    /// Attach a progress reporter.
    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    fn emit(&self, phase: Phase, detail: &str) {
        if let Some(reporter) = &self.reporter {
            reporter.emit(ProgressEvent::new(Scope::Camera, Mode::Connect, phase, detail));
        }
    }

    /// Run the bring-up for the given cameras.
    pub async fn run(
        &self,
        host: &str,
        port: u16,
        dmpdip: &str,
        cameras: &[CameraRecord],
    ) -> CameraReport {
        let sequence_id = make_token();
        let mut report = CameraReport::default();
        let ips: Vec<String> = cameras.iter().map(|camera| camera.ip.clone()).collect();
        for ip in &ips {
            report.statuses.insert(ip.clone(), "pending".to_owned());
            self.registry.track(ip);
        }
        if ips.is_empty() {
            return report;
        }

        // add cameras to the controller
        self.emit(Phase::Running, "adding cameras");
        let envelope = Envelope::camera_add(dmpdip, cameras);
        match self.relay.send(host, port, &envelope, ADD_TIMEOUT).await {
            Ok(_) => {
                for ip in &ips {
                    report.statuses.insert(ip.clone(), "added".to_owned());
                }
            }
            Err(err) => {
                warn!(error = %err, "camera add failed");
                for ip in &ips {
                    report.statuses.insert(ip.clone(), "add failed".to_owned());
                }
                report.failed_step = Some("add");
                self.emit(Phase::Failed, "camera add failed");
                return report;
            }
        }

        // connect; the controller answers per camera when it can
        self.emit(Phase::Running, "connecting cameras");
        let envelope = Envelope::camera_connect(dmpdip);
        match self.relay.send(host, port, &envelope, CONNECT_TIMEOUT).await {
            Ok(resp) => {
                let rows = reply::camera_statuses(&resp);
                if rows.is_empty() {
                    for ip in &ips {
                        report.statuses.insert(ip.clone(), "connected".to_owned());
                        self.registry.record_connect_success(ip, &sequence_id);
                    }
                } else {
                    for (ip, status) in rows {
                        if status.eq_ignore_ascii_case("OK") {
                            report.statuses.insert(ip.clone(), "connected".to_owned());
                            self.registry.record_connect_success(&ip, &sequence_id);
                        } else {
                            report.statuses.insert(ip, status);
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "camera connect failed");
                for ip in &ips {
                    report.statuses.insert(ip.clone(), "connect failed".to_owned());
                }
                report.failed_step = Some("connect");
                self.emit(Phase::Failed, "camera connect failed");
                return report;
            }
        }

        // metadata and stream formats are best-effort enrichment
        self.emit(Phase::Running, "fetching camera info");
        let envelope = Envelope::camera_info(dmpdip, &ips);
        match self.relay.send(host, port, &envelope, QUERY_TIMEOUT).await {
            Ok(resp) => {
                report.info = parse_camera_info(&resp);
                for row in &report.info {
                    report.statuses.insert(row.ip.clone(), "info ok".to_owned());
                    self.registry.record_connect_success(&row.ip, &sequence_id);
                }
            }
            Err(err) => warn!(error = %err, "camera info query failed"),
        }

        self.emit(Phase::Running, "fetching video formats");
        let envelope = Envelope::video_format(dmpdip, &ips);
        match self.relay.send(host, port, &envelope, QUERY_TIMEOUT).await {
            Ok(resp) => {
                report.video = parse_video_format(&resp);
                for row in &report.video {
                    report.statuses.insert(row.ip.clone(), "video ok".to_owned());
                    self.registry.record_connect_success(&row.ip, &sequence_id);
                }
            }
            Err(err) => warn!(error = %err, "video format query failed"),
        }

        self.emit(Phase::Finished, "camera bring-up done");
        report
    }
}
