//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use r_oms_msg::Envelope;

use crate::metrics::{RELAY_ERRORS_TOTAL, RELAY_SENDS_TOTAL};
use crate::wirelog::{WireDirection, WireLog};
use crate::{Result, TransportError};

/// Safety margin added to the HTTP timeout so the relay's own inner
/// timeout always fires first and reaches us as a reported error instead
/// of a cut connection.
const HTTP_MARGIN_SECS: u64 = 5;

/// Seam for sending one envelope and receiving the correlated reply.
/// Production traffic goes through [`RelayClient`]; tests substitute
/// scripted implementations.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Send `envelope` to the daemon at `host:port` through the relay and
    /// return the daemon's reply. `timeout_secs` bounds the relay's inner
    /// daemon round trip.
    async fn send(
        &self,
        host: &str,
        port: u16,
        envelope: &Envelope,
        timeout_secs: u64,
    ) -> Result<Value>;
}

/// HTTP client for the relay endpoint of the OMS service.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
    wire_log: WireLog,
}

impl RelayClient {
    /// Construct a client rooted at the given API base, e.g.
    /// `http://127.0.0.1:8787/oms`. Per-request timeouts are applied in
    /// [`Relay::send`]; the client itself carries none.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            wire_log: WireLog::new(),
        })
    }

    /// Diagnostics ring shared by every send through this client.
    pub fn wire_log(&self) -> &WireLog {
        &self.wire_log
    }

    fn endpoint(&self) -> String {
        format!("{}/relay-connect", self.base_url)
    }
}

#[async_trait]
impl Relay for RelayClient {
    async fn send(
        &self,
        host: &str,
        port: u16,
        envelope: &Envelope,
        timeout_secs: u64,
    ) -> Result<Value> {
        let url = self.endpoint();
        let payload = json!({
            "host": host,
            "port": port,
            "timeout": timeout_secs,
            "message": envelope,
        });
        self.wire_log
            .record(WireDirection::Send, host, port, payload.clone());

        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(timeout_secs + HTTP_MARGIN_SECS))
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                self.wire_log.record(
                    WireDirection::Error,
                    host,
                    port,
                    json!({"error": err.to_string()}),
                );
                RELAY_ERRORS_TOTAL.inc();
                if err.is_timeout() {
                    TransportError::Timeout(timeout_secs + HTTP_MARGIN_SECS)
                } else {
                    TransportError::Request(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            self.wire_log.record(
                WireDirection::Error,
                host,
                port,
                json!({"status": status.as_u16(), "error": message}),
            );
            RELAY_ERRORS_TOTAL.inc();
            return Err(TransportError::Http {
                status: status.as_u16(),
                url,
                message,
            });
        }

        let body: Value = response.json().await?;
        if body.get("ok").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("relay reported failure")
                .to_owned();
            self.wire_log
                .record(WireDirection::Error, host, port, json!({"error": message}));
            RELAY_ERRORS_TOTAL.inc();
            return Err(TransportError::Relay(message));
        }

        // the relay wraps the daemon reply; older builds return it bare
        let reply = body.get("response").cloned().unwrap_or(body);
        self.wire_log
            .record(WireDirection::Recv, host, port, reply.clone());
        RELAY_SENDS_TOTAL.inc();
        debug!(host, port, token = ?r_oms_msg::reply::token(&reply), "relay reply received");
        Ok(reply)
    }
}
