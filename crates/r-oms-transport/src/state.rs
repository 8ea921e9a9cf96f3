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
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::STATE_SAVES_TOTAL;
use crate::{Result, TransportError};

/// Full-snapshot save endpoints tried in order; deployments differ on
/// which route their service generation exposes, so the first 2xx wins.
const SAVE_CANDIDATES: [&str; 3] = ["/state", "/state/save", "/save-state"];

const STATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the shared-state endpoints of the OMS service.
#[derive(Debug, Clone)]
pub struct StateClient {
    http: Client,
    base_url: String,
}

impl StateClient {
    /// Construct a client rooted at the given API base.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(STATE_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Save a full snapshot, trying each candidate endpoint in order and
    /// accepting the first 2xx.
    pub async fn save(&self, snapshot: &Value) -> Result<()> {
        let mut last_err = None;
        for candidate in SAVE_CANDIDATES {
            let url = format!("{}{}", self.base_url, candidate);
            match self.http.post(&url).json(snapshot).send().await {
                Ok(response) if response.status().is_success() => {
                    STATE_SAVES_TOTAL.inc();
                    debug!(%url, "snapshot saved");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(%url, status = response.status().as_u16(), "state save rejected");
                    last_err = Some(TransportError::Http {
                        status: response.status().as_u16(),
                        url,
                        message: "state save rejected".to_owned(),
                    });
                }
                Err(err) => {
                    warn!(%url, error = %err, "state save unreachable");
                    last_err = Some(TransportError::Request(err));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| TransportError::Relay("no save endpoint accepted".to_owned())))
    }

    /// Push a partial snapshot to the incremental endpoint; merge semantics
    /// are the server's responsibility.
    pub async fn upsert(&self, patch: &Value) -> Result<()> {
        let url = format!("{}/state/upsert", self.base_url);
        let response = self.http.post(&url).json(patch).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Http {
                status: response.status().as_u16(),
                url,
                message: "state upsert rejected".to_owned(),
            });
        }
        Ok(())
    }

    /// Fetch the server's current state document.
    pub async fn fetch(&self) -> Result<Value> {
        let url = format!("{}/state", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Http {
                status: response.status().as_u16(),
                url,
                message: "state fetch rejected".to_owned(),
            });
        }
        Ok(response.json().await?)
    }
}
