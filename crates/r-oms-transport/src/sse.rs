//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Minimal server-sent-events subscriber for the restart state stream.
//! Only `data:` lines are interpreted; everything else in the SSE framing
//! is ignored. The stream is informational, so a broken connection ends
//! the subscription with a warning instead of an error.

use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Subscribe to an SSE endpoint yielding JSON state objects.
///
/// A background task owns the connection; each decoded `data:` payload is
/// forwarded to the returned channel. Dropping the receiver ends the task.
pub fn subscribe_state_stream(url: String) -> mpsc::Receiver<Value> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let client = match Client::builder().build() {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "state stream client construction failed");
                return;
            }
        };
        let response = match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(%url, status = response.status().as_u16(), "state stream rejected");
                return;
            }
            Err(err) => {
                warn!(%url, error = %err, "state stream unreachable");
                return;
            }
        };

        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(%url, error = %err, "state stream interrupted");
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_owned();
                buffer.drain(..=newline);
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                match serde_json::from_str::<Value>(data.trim()) {
                    Ok(state) => {
                        if tx.send(state).await.is_err() {
                            debug!(%url, "state stream receiver dropped");
                            return;
                        }
                    }
                    Err(err) => debug!(%url, error = %err, "undecodable state event skipped"),
                }
            }
        }
    });
    rx
}
