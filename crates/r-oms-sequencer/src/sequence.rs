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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use r_oms_common::net::{extract_ipv4, is_valid_ipv4, is_valid_port};
use r_oms_msg::reply::{self, UnitStatus, VersionReport};
use r_oms_msg::{
    canonical_unit, legacy_unit, make_token, parse_topology, sanitize_daemon_map, DaemonMap,
    Envelope, Topology, RELAY_UNIT, SUB_UNIT,
};
use r_oms_registry::{ConnectionRegistry, Mode, Phase, ProgressEvent, ProgressReporter, Scope};
use r_oms_transport::{collect_versions, fetch_version_single, Relay, WireLog, WireLogEntry};

use crate::retry::with_retry;
use crate::state::{StatePatch, StateSink};
use crate::{Result, SequenceError};

// Per-step relay timeouts, seconds. Step 2 fans out to the whole fleet and
// gets the widest window.
const STEP1_TIMEOUT: u64 = 15;
const STEP2_TIMEOUT: u64 = 18;
const STEP3_TIMEOUT: u64 = 12;
const STEP4_TIMEOUT: u64 = 12;
const VERSION_TIMEOUT: u64 = 8;
const SWITCH_TIMEOUT: u64 = 8;

/// Relay-side collection window for the sub-unit version batch.
const BATCH_WAIT_SECS: u64 = 3;
/// Hard deadline on draining the sub-unit version batch.
const BATCH_HARD_TIMEOUT: Duration = Duration::from_millis(7000);

/// Inputs of one connect sequence run.
#[derive(Debug, Clone)]
pub struct SequenceRequest {
    /// Relay host; hostname or address.
    pub relay_host: String,
    /// Relay daemon-protocol port.
    pub relay_port: u16,
    /// Management IP all units resolve relative to.
    pub dmpdip: String,
    /// Units to connect, possibly including legacy and excluded names.
    pub daemon_map: DaemonMap,
}

/// Cooperative abort flag checked before each step transition. In-flight
/// network calls are not cancelled; their results are discarded.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the sequence to stop at the next step boundary.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal status of a sequence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    /// All steps ran; partial step failures may be recorded.
    Done,
    /// The operator aborted between steps.
    Aborted,
    /// Step one failed; nothing after it ran.
    Failed,
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded for every unit it touched.
    Success,
    /// Some units succeeded.
    Partial,
    /// Nothing succeeded.
    Failed,
    /// The step never ran.
    Skipped,
}

/// Record of one executed step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Step index, 1-based.
    pub step: u8,
    /// Step name.
    pub name: &'static str,
    /// Step outcome.
    pub outcome: StepOutcome,
    /// Operator-facing detail.
    pub detail: String,
}

/// Accumulated result of a sequence run, persisted regardless of the
/// terminal status.
#[derive(Debug, Clone)]
pub struct SequenceReport {
    /// Identifier of this run; doubles as the connect-token issuer id.
    pub sequence_id: String,
    /// Terminal status.
    pub status: SequenceStatus,
    /// Per-step records in execution order.
    pub steps: Vec<StepRecord>,
    /// Per-unit connect flags keyed by surfaced (legacy) names.
    pub connected: BTreeMap<String, bool>,
    /// Units that went through the one-shot retry, recovered or not.
    pub retried: Vec<String>,
    /// Discovered topology.
    pub topology: Topology,
    /// Switch model strings keyed by address.
    pub switch_models: BTreeMap<String, String>,
    /// Sub-unit addresses that confirmed the batched connect.
    pub sub_unit_ips: Vec<String>,
    /// Version table keyed by surfaced unit name.
    pub versions: BTreeMap<String, VersionReport>,
    /// Sub-unit versions keyed by address.
    pub sub_unit_versions: BTreeMap<String, VersionReport>,
    /// Sub-unit addresses still unresolved after batch and fallback.
    pub sub_unit_pending: Vec<String>,
    /// Excerpt of the relay wire log for diagnostics.
    pub wire_log: Vec<WireLogEntry>,
}

impl SequenceReport {
    fn new(sequence_id: String) -> Self {
        Self {
            sequence_id,
            status: SequenceStatus::Done,
            steps: Vec::new(),
            connected: BTreeMap::new(),
            retried: Vec::new(),
            topology: Topology::default(),
            switch_models: BTreeMap::new(),
            sub_unit_ips: Vec::new(),
            versions: BTreeMap::new(),
            sub_unit_versions: BTreeMap::new(),
            sub_unit_pending: Vec::new(),
            wire_log: Vec::new(),
        }
    }

    fn record(&mut self, step: u8, name: &'static str, outcome: StepOutcome, detail: String) {
        self.steps.push(StepRecord {
            step,
            name,
            outcome,
            detail,
        });
    }
}

/// Driver of the five-step fleet connect sequence.
pub struct ConnectSequencer {
    relay: Arc<dyn Relay>,
    sink: Arc<dyn StateSink>,
    registry: Arc<ConnectionRegistry>,
    reporter: Option<ProgressReporter>,
    wire_log: Option<WireLog>,
    abort: AbortHandle,
}

impl ConnectSequencer {
    /// Wire a sequencer to its collaborators.
    pub fn new(
        relay: Arc<dyn Relay>,
        sink: Arc<dyn StateSink>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            relay,
            sink,
            registry,
            reporter: None,
            wire_log: None,
            abort: AbortHandle::new(),
        }
    }

    /// Attach a progress reporter.
    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Attach the relay wire log so the report carries an excerpt.
    pub fn with_wire_log(mut self, wire_log: WireLog) -> Self {
        self.wire_log = Some(wire_log);
        self
    }

    /// Handle for aborting the run from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn emit(&self, phase: Phase, detail: &str) {
        if let Some(reporter) = &self.reporter {
            reporter.emit(ProgressEvent::new(Scope::System, Mode::Connect, phase, detail));
        }
    }

    fn validate(&self, request: &SequenceRequest) -> Result<()> {
        if request.relay_host.trim().is_empty() {
            return Err(SequenceError::Validation("relay host required".into()));
        }
        if !is_valid_port(request.relay_port) {
            return Err(SequenceError::Validation(format!(
                "bad relay port: {}",
                request.relay_port
            )));
        }
        if !is_valid_ipv4(&request.dmpdip) {
            return Err(SequenceError::Validation(format!(
                "bad management IP: {}",
                request.dmpdip
            )));
        }
        let Some(primary) = request.daemon_map.get("EMd") else {
            return Err(SequenceError::Validation(
                "daemon map entry EMd is required for step 1".into(),
            ));
        };
        let primary_ip = extract_ipv4(primary).unwrap_or_default();
        if !is_valid_ipv4(&primary_ip) {
            return Err(SequenceError::Validation(format!(
                "bad EMd address: {}",
                primary
            )));
        }
        Ok(())
    }

    fn finish(&self, mut report: SequenceReport, status: SequenceStatus) -> SequenceReport {
        report.status = status;
        if let Some(wire_log) = &self.wire_log {
            report.wire_log = wire_log.snapshot();
        }
        let (phase, detail) = match status {
            SequenceStatus::Done => (Phase::Finished, "connect sequence done"),
            SequenceStatus::Aborted => (Phase::Aborted, "connect sequence aborted"),
            SequenceStatus::Failed => (Phase::Failed, "connect sequence failed"),
        };
        self.emit(phase, detail);
        info!(sequence_id = %report.sequence_id, status = ?status, "connect sequence finished");
        report
    }

    /// Run the sequence. Validation problems surface as errors before any
    /// network call; everything else terminates in a report whose partial
    /// state has already been persisted step by step.
    pub async fn run(&self, request: &SequenceRequest) -> Result<SequenceReport> {
        self.emit(Phase::Preparing, "validating inputs");
        self.validate(request)?;

        let sequence_id = make_token();
        let mut report = SequenceReport::new(sequence_id.clone());
        let sanitized = sanitize_daemon_map(&request.daemon_map);
        let host = request.relay_host.as_str();
        let port = request.relay_port;
        let dmpdip = request.dmpdip.as_str();

        // Step 1: primary unit connect; fatal on any failure.
        if self.abort.is_aborted() {
            return Ok(self.finish(report, SequenceStatus::Aborted));
        }
        self.emit(Phase::Running, "step 1/5: primary unit connect");
        let mut primary_map = DaemonMap::new();
        primary_map.insert("EMd".to_owned(), request.daemon_map["EMd"].clone());
        let envelope = Envelope::fleet_connect(dmpdip, &primary_map);
        match self.relay.send(host, port, &envelope, STEP1_TIMEOUT).await {
            Ok(resp) if reply::is_ok(&resp) => {
                report.record(1, "primary-connect", StepOutcome::Success, "EMd OK".into());
                report.connected.insert(RELAY_UNIT.to_owned(), true);
                if let Some(ip) = extract_ipv4(&primary_map["EMd"]) {
                    self.registry.record_connect_success(&ip, &sequence_id);
                }
                let mut flags = BTreeMap::new();
                flags.insert(RELAY_UNIT.to_owned(), Value::Bool(true));
                self.sink
                    .upsert(StatePatch {
                        dmpdip: Some(dmpdip.to_owned()),
                        connected_daemons: Some(flags),
                        relay_host: Some(host.to_owned()),
                        relay_port: Some(port),
                        ..StatePatch::default()
                    })
                    .await;
            }
            Ok(resp) => {
                let err = SequenceError::Step {
                    step: 1,
                    name: "primary-connect",
                    message: format!(
                        "EMd reported code {}",
                        reply::result_code(&resp).unwrap_or_default()
                    ),
                };
                report.record(1, "primary-connect", StepOutcome::Failed, err.to_string());
                return Ok(self.finish(report, SequenceStatus::Failed));
            }
            Err(err) => {
                let err = SequenceError::Transport(err);
                report.record(1, "primary-connect", StepOutcome::Failed, err.to_string());
                return Ok(self.finish(report, SequenceStatus::Failed));
            }
        }

        // Step 2: fleet connect with a one-shot retry of NOK units.
        if self.abort.is_aborted() {
            return Ok(self.finish(report, SequenceStatus::Aborted));
        }
        self.emit(Phase::Running, "step 2/5: fleet connect");
        let merged: Mutex<BTreeMap<String, UnitStatus>> = Mutex::new(BTreeMap::new());
        let retried: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let step2 = {
            let merged = &merged;
            let retried = &retried;
            let relay = &self.relay;
            let sanitized = &sanitized;
            with_retry(
                move |attempt| {
                    let target = if attempt == 0 {
                        sanitized.clone()
                    } else {
                        // resend only the units that answered NOK
                        let snapshot = merged.lock();
                        let failed: DaemonMap = snapshot
                            .iter()
                            .filter(|(_, status)| !status.is_ok())
                            .filter_map(|(name, status)| {
                                let address = status
                                    .ip
                                    .clone()
                                    .or_else(|| sanitized.get(name).cloned())?;
                                Some((name.clone(), address))
                            })
                            .collect();
                        retried.lock().extend(failed.keys().cloned());
                        failed
                    };
                    if attempt > 0 {
                        self.emit(Phase::Retrying, "step 2/5: retrying failed units");
                    }
                    let envelope = Envelope::fleet_connect(dmpdip, &target);
                    async move {
                        let resp = relay.send(host, port, &envelope, STEP2_TIMEOUT).await?;
                        let results = reply::daemon_results(&resp);
                        let mut snapshot = merged.lock();
                        snapshot.extend(results);
                        let has_failures = snapshot.values().any(|status| !status.is_ok());
                        Ok::<bool, r_oms_transport::TransportError>(has_failures)
                    }
                },
                |latest| matches!(latest, Ok(true)),
                1,
            )
            .await
        };
        let fleet_results = merged.into_inner();
        report.retried = retried.into_inner();

        if let Err(err) = &step2 {
            warn!(error = %err, "fleet connect transport failure");
        }
        if fleet_results.is_empty() {
            report.record(
                2,
                "fleet-connect",
                StepOutcome::Failed,
                match &step2 {
                    Err(err) => err.to_string(),
                    Ok(_) => "no per-unit results returned".into(),
                },
            );
        } else {
            let mut flags: BTreeMap<String, Value> = BTreeMap::new();
            for (name, status) in &fleet_results {
                let ok = status.is_ok();
                report.connected.insert(legacy_unit(name).to_owned(), ok);
                flags.insert(name.clone(), Value::Bool(ok));
                if name != legacy_unit(name) {
                    // surfaced under the legacy key as well; a stream
                    // publisher success also covers its controller clients
                    flags.insert(legacy_unit(name).to_owned(), Value::Bool(ok));
                    if ok {
                        flags.insert("MMcs".to_owned(), Value::String("ALL".to_owned()));
                    }
                }
                if ok {
                    if let Some(address) = status
                        .ip
                        .clone()
                        .or_else(|| sanitized.get(name).cloned())
                        .and_then(|raw| extract_ipv4(&raw))
                    {
                        self.registry.record_connect_success(&address, &sequence_id);
                    }
                }
            }
            let ok_count = fleet_results.values().filter(|status| status.is_ok()).count();
            let outcome = if ok_count == fleet_results.len() {
                StepOutcome::Success
            } else if ok_count > 0 {
                StepOutcome::Partial
            } else {
                StepOutcome::Failed
            };
            let detail = if report.retried.is_empty() {
                format!("{}/{} units OK", ok_count, fleet_results.len())
            } else {
                format!(
                    "{}/{} units OK (retried: {})",
                    ok_count,
                    fleet_results.len(),
                    report.retried.join(", ")
                )
            };
            report.record(2, "fleet-connect", outcome, detail);
            self.sink
                .upsert(StatePatch {
                    dmpdip: Some(dmpdip.to_owned()),
                    connected_daemons: Some(flags),
                    daemon_map: Some(sanitized.clone()),
                    ..StatePatch::default()
                })
                .await;
        }

        // Step 3: topology discovery via the directory unit.
        if self.abort.is_aborted() {
            return Ok(self.finish(report, SequenceStatus::Aborted));
        }
        self.emit(Phase::Running, "step 3/5: topology discovery");
        let envelope = Envelope::topology_select(dmpdip);
        match self.relay.send(host, port, &envelope, STEP3_TIMEOUT).await {
            Ok(resp) => {
                report.topology = parse_topology(&resp);
                for camera in &report.topology.cameras {
                    self.registry.track(&camera.ip);
                }
                for group in &report.topology.sub_units {
                    self.registry.track(&group.ip);
                }
                report.record(
                    3,
                    "topology-discovery",
                    StepOutcome::Success,
                    format!(
                        "{} cameras, {} sub-units, {} switches",
                        report.topology.cameras.len(),
                        report.topology.sub_units.len(),
                        report.topology.switch_ips.len()
                    ),
                );
            }
            Err(err) => {
                warn!(error = %err, "topology discovery failed");
                report.record(3, "topology-discovery", StepOutcome::Failed, err.to_string());
            }
        }
        self.sink
            .upsert(StatePatch {
                dmpdip: Some(dmpdip.to_owned()),
                cameras: Some(report.topology.cameras.clone()),
                sub_units: Some(report.topology.sub_units.clone()),
                switch_ips: Some(report.topology.switch_ips.clone()),
                ..StatePatch::default()
            })
            .await;

        if !report.topology.switch_ips.is_empty() {
            report.switch_models = self
                .query_switch_models(host, port, dmpdip, &report.topology.switch_ips)
                .await;
            if !report.switch_models.is_empty() {
                self.sink
                    .upsert(StatePatch {
                        dmpdip: Some(dmpdip.to_owned()),
                        switch_models: Some(report.switch_models.clone()),
                        ..StatePatch::default()
                    })
                    .await;
            }
        }

        // Step 4: one batched sub-unit connect, never one call per group.
        if self.abort.is_aborted() {
            return Ok(self.finish(report, SequenceStatus::Aborted));
        }
        self.emit(Phase::Running, "step 4/5: sub-unit connect");
        let envelope = Envelope::sub_unit_connect(dmpdip, &report.topology.sub_units);
        match self.relay.send(host, port, &envelope, STEP4_TIMEOUT).await {
            Ok(resp) => {
                let rows = reply::sub_unit_results(&resp);
                report.sub_unit_ips = rows
                    .iter()
                    .filter(|row| row.code == r_oms_msg::RESULT_OK)
                    .map(|row| row.ip.clone())
                    .collect();
                for ip in &report.sub_unit_ips {
                    self.registry.record_connect_success(ip, &sequence_id);
                }
                let outcome = if reply::is_ok(&resp) {
                    StepOutcome::Success
                } else {
                    warn!(code = ?reply::result_code(&resp), "sub-unit connect reported failure");
                    if report.sub_unit_ips.is_empty() {
                        StepOutcome::Failed
                    } else {
                        StepOutcome::Partial
                    }
                };
                report.record(
                    4,
                    "sub-unit-connect",
                    outcome,
                    format!(
                        "{}/{} groups confirmed",
                        report.sub_unit_ips.len(),
                        report.topology.sub_units.len()
                    ),
                );
            }
            Err(err) => {
                warn!(error = %err, "sub-unit connect failed");
                report.record(4, "sub-unit-connect", StepOutcome::Failed, err.to_string());
            }
        }
        let mut flags = BTreeMap::new();
        flags.insert(
            SUB_UNIT.to_owned(),
            Value::Bool(!report.sub_unit_ips.is_empty()),
        );
        self.sink
            .upsert(StatePatch {
                dmpdip: Some(dmpdip.to_owned()),
                connected_daemons: Some(flags),
                sub_unit_ips: Some(report.sub_unit_ips.clone()),
                ..StatePatch::default()
            })
            .await;

        // Step 5: version collection for OK units plus the relay itself.
        if self.abort.is_aborted() {
            return Ok(self.finish(report, SequenceStatus::Aborted));
        }
        self.emit(Phase::Running, "step 5/5: version collection");
        let mut targets: Vec<String> = fleet_results
            .iter()
            .filter(|(_, status)| status.is_ok())
            .map(|(name, _)| canonical_unit(name).to_owned())
            .collect();
        if !targets.contains(&RELAY_UNIT.to_owned()) {
            targets.push(RELAY_UNIT.to_owned());
        }
        for target in &targets {
            let envelope = Envelope::version_query(dmpdip, target);
            match self.relay.send(host, port, &envelope, VERSION_TIMEOUT).await {
                Ok(resp) => {
                    let version = reply::version_of(&resp, target);
                    report
                        .versions
                        .insert(legacy_unit(target).to_owned(), version);
                }
                Err(err) => warn!(unit = %target, error = %err, "version query failed"),
            }
        }

        if !report.sub_unit_ips.is_empty() {
            let batch = collect_versions(
                self.relay.as_ref(),
                host,
                port,
                dmpdip,
                SUB_UNIT,
                &report.sub_unit_ips,
                BATCH_WAIT_SECS,
                BATCH_HARD_TIMEOUT,
            )
            .await;
            report.sub_unit_versions.extend(batch.results);
            for ip in &batch.pending {
                // one direct attempt per straggler, through the shared
                // retry combinator with a zero retry budget
                let relay = &self.relay;
                let fallback = with_retry(
                    move |_| {
                        let ip = ip.clone();
                        async move {
                            fetch_version_single(
                                relay.as_ref(),
                                host,
                                port,
                                dmpdip,
                                SUB_UNIT,
                                &ip,
                                BATCH_WAIT_SECS,
                            )
                            .await
                        }
                    },
                    |latest: &r_oms_transport::Result<VersionReport>| latest.is_err(),
                    0,
                )
                .await;
                match fallback {
                    Ok(version) => {
                        report.sub_unit_versions.insert(ip.clone(), version);
                    }
                    Err(err) => {
                        warn!(ip = %ip, error = %err, "sub-unit version fallback failed");
                        report.sub_unit_pending.push(ip.clone());
                    }
                }
            }
            for (ip, version) in &report.sub_unit_versions {
                if version.is_resolved() {
                    self.registry.record_connect_success(ip, &sequence_id);
                }
            }
            if !report.sub_unit_pending.is_empty() {
                warn!(pending = ?report.sub_unit_pending, "sub-unit versions unresolved after fallback");
            }
        }

        let outcome = if report.versions.is_empty() && report.sub_unit_versions.is_empty() {
            StepOutcome::Failed
        } else if report.sub_unit_pending.is_empty() {
            StepOutcome::Success
        } else {
            StepOutcome::Partial
        };
        report.record(
            5,
            "version-collection",
            outcome,
            format!(
                "{} unit versions, {} sub-unit versions, {} pending",
                report.versions.len(),
                report.sub_unit_versions.len(),
                report.sub_unit_pending.len()
            ),
        );
        self.sink
            .upsert(StatePatch {
                dmpdip: Some(dmpdip.to_owned()),
                versions: Some(report.versions.clone()),
                sub_unit_versions: Some(report.sub_unit_versions.clone()),
                ..StatePatch::default()
            })
            .await;

        Ok(self.finish(report, SequenceStatus::Done))
    }

    /// Best-effort switch model query; failures only warn.
    async fn query_switch_models(
        &self,
        host: &str,
        port: u16,
        dmpdip: &str,
        switch_ips: &[String],
    ) -> BTreeMap<String, String> {
        let envelope = Envelope::switch_model(dmpdip, switch_ips);
        let mut models = BTreeMap::new();
        match self.relay.send(host, port, &envelope, SWITCH_TIMEOUT).await {
            Ok(resp) => {
                if let Some(rows) = resp.get("Switches").and_then(Value::as_array) {
                    for row in rows {
                        let ip = row.get("ip").and_then(Value::as_str);
                        let model = row
                            .get("Model")
                            .or_else(|| row.get("model"))
                            .and_then(Value::as_str);
                        if let (Some(ip), Some(model)) = (ip, model) {
                            models.insert(ip.to_owned(), model.to_owned());
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "switch model query failed"),
        }
        models
    }
}
