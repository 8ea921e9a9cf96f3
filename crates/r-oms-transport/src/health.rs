//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{Result, TransportError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// One managed process entry on a node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutableStatus {
    /// Process name.
    #[serde(default)]
    pub name: String,
    /// Whether the operator has the process selected for management.
    /// Absent means selected.
    #[serde(default)]
    pub select: Option<bool>,
    /// Whether the agent reports the process as running.
    #[serde(default)]
    pub running: bool,
    /// Daemon-level connection state, e.g. `CONNECTED`.
    #[serde(default)]
    pub connection_state: String,
}

impl ExecutableStatus {
    /// Deselected processes are excluded from aggregate health decisions.
    pub fn is_selected(&self) -> bool {
        self.select != Some(false)
    }

    /// A process is healthy when it runs or is explicitly connected.
    pub fn is_good(&self) -> bool {
        self.running || self.connection_state.eq_ignore_ascii_case("CONNECTED")
    }
}

/// Process table of one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeProcesses {
    /// Managed process entries.
    #[serde(default)]
    pub executables: Vec<ExecutableStatus>,
}

/// Aggregate status of one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    /// Node host, possibly annotated (`10.0.0.5:19776 (8/9)`).
    #[serde(default)]
    pub host: String,
    /// Node process table.
    #[serde(default)]
    pub status: NodeProcesses,
}

/// Fleet-wide aggregate health report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReport {
    /// Every reporting node.
    #[serde(default)]
    pub nodes: Vec<NodeStatus>,
}

impl StatusReport {
    /// Whether every selected process across every node is healthy.
    pub fn all_good(&self) -> bool {
        self.nodes.iter().all(|node| {
            node.status
                .executables
                .iter()
                .filter(|process| process.is_selected())
                .all(ExecutableStatus::is_good)
        })
    }
}

/// Client for the aggregate health endpoint of the OMS service.
#[derive(Debug, Clone)]
pub struct HealthClient {
    http: Client,
    base_url: String,
}

impl HealthClient {
    /// Construct a client rooted at the given API base.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(HEALTH_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Fetch the current aggregate status.
    pub async fn status(&self) -> Result<StatusReport> {
        let url = format!("{}/status", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Http {
                status: response.status().as_u16(),
                url,
                message: "status fetch rejected".to_owned(),
            });
        }
        Ok(response.json().await?)
    }
}
