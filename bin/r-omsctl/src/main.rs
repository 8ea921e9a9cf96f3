//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "binary"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Operator control CLI for the R-OMS fleet orchestrator."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use r_oms_common::{init_tracing, AppConfig};

mod connect;
mod stabilize;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "R-OMS fleet orchestration control utility",
    long_about = None
)]
struct Cli {
    /// Configuration file; falls back to configs/r-oms.toml, then defaults.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the fleet connect sequence against a relay.
    Connect(connect::ConnectArgs),
    /// Watch the fleet until it stabilizes after a restart.
    Stabilize(stabilize::StabilizeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-oms.toml"));
    let config = AppConfig::load(&candidates)?;
    init_tracing("r-omsctl", &config.logging)?;

    match cli.command {
        Commands::Connect(args) => connect::run(args, &config).await?,
        Commands::Stabilize(args) => stabilize::run(args, &config).await?,
    }
    Ok(())
}
