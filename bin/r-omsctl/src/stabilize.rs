//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "binary"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Operator control CLI for the R-OMS fleet orchestrator."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use r_oms_common::AppConfig;
use r_oms_stabilizer::{RestartStabilizer, StableReason};
use r_oms_transport::{subscribe_state_stream, HealthClient};

/// Options for the stabilization watch.
#[derive(Debug, Args)]
pub struct StabilizeArgs {
    /// Skip the live state stream and rely on polling alone.
    #[arg(long)]
    pub no_stream: bool,
}

/// Watch the fleet until it stabilizes or the hard timeout fires.
pub async fn run(args: StabilizeArgs, config: &AppConfig) -> Result<()> {
    let poller = Arc::new(HealthClient::new(&config.api.base_url)?);
    let stabilizer = RestartStabilizer::new(poller, config.stabilizer.clone());

    let stream = if args.no_stream {
        None
    } else {
        Some(subscribe_state_stream(format!(
            "{}/restart/stream",
            config.api.base_url.trim_end_matches('/')
        )))
    };

    let outcome = stabilizer
        .watch(stream, |state| {
            info!(state = %state, "restart state event");
        })
        .await;

    match outcome.reason {
        StableReason::Stabilized => {
            let nodes = outcome.last.map(|report| report.nodes.len()).unwrap_or(0);
            println!("Fleet stabilized ({} nodes healthy)", nodes);
        }
        StableReason::Timeout => {
            println!(
                "Fleet did not stabilize within {:?}",
                config.stabilizer.hard_timeout
            );
        }
    }
    Ok(())
}
