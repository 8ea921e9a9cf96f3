//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "binary"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Operator control CLI for the R-OMS fleet orchestrator."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;

use r_oms_common::net::extract_ipv4;
use r_oms_common::AppConfig;
use r_oms_msg::DaemonMap;
use r_oms_persistence::SnapshotMirror;
use r_oms_registry::{ChannelBus, ConnectionRegistry, ProgressReporter, SnapshotSync, StatusSnapshot};
use r_oms_sequencer::{ConnectSequencer, HttpStateSink, SequenceRequest};
use r_oms_transport::{RelayClient, StateClient};

/// Options for the connect sequence.
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Relay host.
    #[arg(long)]
    pub host: String,
    /// Relay port; defaults to the configured relay port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Management IP; defaults to the relay host when it is an address.
    #[arg(long)]
    pub dmpdip: Option<String>,
    /// Daemon map as inline JSON, or `@path` to a JSON file.
    #[arg(long, value_name = "JSON")]
    pub daemon_map: String,
}

fn parse_daemon_map(raw: &str) -> Result<DaemonMap> {
    let text = if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("failed reading daemon map {}", path))?
    } else {
        raw.to_owned()
    };
    serde_json::from_str(&text).map_err(|err| anyhow!("invalid daemon map JSON: {}", err))
}

/// Execute the connect sequence and publish the resulting snapshot.
pub async fn run(args: ConnectArgs, config: &AppConfig) -> Result<()> {
    let daemon_map = parse_daemon_map(&args.daemon_map)?;
    let port = args.port.unwrap_or(config.relay.default_port);
    let dmpdip = args
        .dmpdip
        .clone()
        .or_else(|| extract_ipv4(&args.host))
        .unwrap_or_else(|| "127.0.0.1".to_owned());

    let relay = RelayClient::new(&config.api.base_url)?;
    let wire_log = relay.wire_log().clone();
    let state_client = StateClient::new(&config.api.base_url)?;
    let registry = Arc::new(ConnectionRegistry::new(
        config.liveness.indeterminate_debounce,
    ));
    let bus = Arc::new(ChannelBus::default());

    let sequencer = ConnectSequencer::new(
        Arc::new(relay),
        Arc::new(HttpStateSink::new(state_client.clone())),
        registry.clone(),
    )
    .with_reporter(ProgressReporter::new(bus.clone()))
    .with_wire_log(wire_log);

    let request = SequenceRequest {
        relay_host: args.host.clone(),
        relay_port: port,
        dmpdip,
        daemon_map,
    };
    let report = sequencer.run(&request).await?;

    println!("Sequence {} -> {:?}", report.sequence_id, report.status);
    for step in &report.steps {
        println!(
            "  step {} {:<20} {:?}: {}",
            step.step, step.name, step.outcome, step.detail
        );
    }
    for (unit, connected) in &report.connected {
        println!("  {:<8} connected={}", unit, connected);
    }
    for (unit, version) in &report.versions {
        println!("  {:<8} version={} ({})", unit, version.version, version.date);
    }
    for (ip, version) in &report.sub_unit_versions {
        println!("  sub-unit {:<16} version={}", ip, version.version);
    }
    if !report.sub_unit_pending.is_empty() {
        println!("  unresolved sub-units: {}", report.sub_unit_pending.join(", "));
    }

    // fold the run into the shared snapshot so sibling observers catch up
    let sync = SnapshotSync::new(
        registry.clone(),
        SnapshotMirror::new(&config.mirror.path),
        Some(state_client),
        bus,
    );
    let mut status: BTreeMap<String, String> = BTreeMap::new();
    for (ip, state) in registry.statuses() {
        status.insert(ip, state.to_string());
    }
    let snapshot = StatusSnapshot {
        cameras: report.topology.cameras.clone(),
        status,
        ..StatusSnapshot::default()
    };
    sync.publish(snapshot).await;
    Ok(())
}
