//! ---
//! oms_section: "05-networking-external-interfaces"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Relay transport, batch collection, and OMS service clients."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use r_oms_msg::reply::{self, VersionReport};
use r_oms_msg::Envelope;

use crate::relay::Relay;
use crate::Result;

/// Pause between token polls while draining a batch.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Floor for the relay-side timeout of batch sends and polls.
const MIN_SEND_TIMEOUT_SECS: u64 = 8;

/// Error row recorded for a responder that answered with a failure code.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
    /// Result code the responder reported.
    pub code: i64,
    /// Error message, when the responder supplied one.
    pub message: Option<String>,
}

/// Outcome of one batched collection.
///
/// Invariant: `results.len() + pending.len()` equals the number of input
/// addresses, and no address appears in both.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Version reports keyed by responder address.
    pub results: BTreeMap<String, VersionReport>,
    /// Addresses that never answered, in input order.
    pub pending: Vec<String>,
    /// Failure rows keyed by responder address.
    pub errors: BTreeMap<String, BatchError>,
    /// Whether the hard deadline elapsed with unresolved addresses.
    pub timed_out: bool,
}

fn send_timeout(wait_secs: u64) -> u64 {
    MIN_SEND_TIMEOUT_SECS.max(wait_secs + 3)
}

fn record_match(
    reply_body: &Value,
    unit: &str,
    token: &str,
    expected: &[String],
    resolved: &mut HashSet<String>,
    results: &mut BTreeMap<String, VersionReport>,
    errors: &mut BTreeMap<String, BatchError>,
) {
    if reply::from_unit(reply_body) != Some(unit) || reply::token(reply_body) != Some(token) {
        return;
    }
    let Some(ip) = reply::sender_ip(reply_body) else {
        return;
    };
    // a sender outside the expected set would break the results/pending
    // cardinality invariant
    if !expected.iter().any(|candidate| candidate == ip) {
        return;
    }
    let ip = ip.to_owned();
    results.insert(ip.clone(), reply::version_of(reply_body, unit));
    resolved.insert(ip.clone());
    if let Some(code) = reply::result_code(reply_body) {
        if code != r_oms_msg::RESULT_OK {
            errors.insert(
                ip,
                BatchError {
                    code,
                    message: reply::error_message(reply_body),
                },
            );
        }
    }
}

/// Collect version reports from many units that each reply independently
/// to one broadcast token.
///
/// One envelope with `Expect {ips, count, wait_sec}` opens the collection;
/// afterwards lightweight polls reuse the same token (no re-broadcast)
/// until every address answered or the hard deadline passes. Poll errors
/// are ignored so a transient relay hiccup does not abandon replies that
/// are still in flight. Addresses left unresolved come back as `pending`;
/// the caller owns the per-address fallback.
pub async fn collect_versions<R: Relay + ?Sized>(
    relay: &R,
    host: &str,
    port: u16,
    dmpdip: &str,
    unit: &str,
    ips: &[String],
    wait_secs: u64,
    hard_timeout: Duration,
) -> BatchOutcome {
    if ips.is_empty() {
        return BatchOutcome::default();
    }

    let broadcast = Envelope::version_query(dmpdip, unit).with_expect(
        ips.to_vec(),
        ips.len(),
        wait_secs,
    );
    let batch_token = broadcast.token.clone();

    let mut resolved: HashSet<String> = HashSet::new();
    let mut results = BTreeMap::new();
    let mut errors = BTreeMap::new();
    let deadline = Instant::now() + hard_timeout;

    match relay.send(host, port, &broadcast, send_timeout(wait_secs)).await {
        Ok(reply_body) => record_match(
            &reply_body,
            unit,
            &batch_token,
            ips,
            &mut resolved,
            &mut results,
            &mut errors,
        ),
        Err(err) => warn!(unit, error = %err, "initial batch send failed"),
    }

    let poll = Envelope::version_query(dmpdip, unit).with_token(&batch_token);
    while resolved.len() < ips.len() && Instant::now() < deadline {
        match relay.send(host, port, &poll, send_timeout(wait_secs)).await {
            Ok(reply_body) => record_match(
                &reply_body,
                unit,
                &batch_token,
                ips,
                &mut resolved,
                &mut results,
                &mut errors,
            ),
            Err(err) => debug!(unit, error = %err, "batch poll failed; continuing"),
        }
        sleep(POLL_INTERVAL).await;
    }

    let pending: Vec<String> = ips
        .iter()
        .filter(|ip| !resolved.contains(*ip))
        .cloned()
        .collect();
    let timed_out = !pending.is_empty();
    BatchOutcome {
        results,
        pending,
        errors,
        timed_out,
    }
}

/// Direct single-target version fetch used as the per-address fallback for
/// batch stragglers.
pub async fn fetch_version_single<R: Relay + ?Sized>(
    relay: &R,
    host: &str,
    port: u16,
    dmpdip: &str,
    unit: &str,
    ip: &str,
    wait_secs: u64,
) -> Result<VersionReport> {
    let envelope =
        Envelope::version_query(dmpdip, unit).with_expect(vec![ip.to_owned()], 1, wait_secs);
    let reply_body = relay
        .send(host, port, &envelope, send_timeout(wait_secs))
        .await?;
    Ok(reply::version_of(&reply_body, unit))
}
