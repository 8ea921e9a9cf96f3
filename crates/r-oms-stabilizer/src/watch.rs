//! ---
//! oms_section: "07-resilience-fault-tolerance"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Restart stabilization watchdog."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, info, warn};

use r_oms_common::config::StabilizerConfig;
use r_oms_transport::{HealthClient, StatusReport};

/// Seam for the aggregate health poll. The HTTP implementation is
/// [`HealthClient`]; tests script their own.
#[async_trait]
pub trait HealthPoller: Send + Sync {
    /// Fetch the current aggregate status.
    async fn poll(&self) -> r_oms_transport::Result<StatusReport>;
}

#[async_trait]
impl HealthPoller for HealthClient {
    async fn poll(&self) -> r_oms_transport::Result<StatusReport> {
        self.status().await
    }
}

/// Why the watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableReason {
    /// The required number of consecutive healthy polls was observed.
    Stabilized,
    /// The hard wall-clock timeout elapsed first.
    Timeout,
}

/// Terminal result of one watch.
#[derive(Debug)]
pub struct WatchOutcome {
    /// Why the watch ended.
    pub reason: StableReason,
    /// The status report that completed stabilization; absent on timeout.
    pub last: Option<StatusReport>,
}

/// Watchdog declaring a fleet stable after N consecutive healthy polls,
/// bounded by a hard timeout.
pub struct RestartStabilizer {
    poller: Arc<dyn HealthPoller>,
    config: StabilizerConfig,
}

async fn next_event(stream: &mut Option<mpsc::Receiver<Value>>) -> Option<Value> {
    match stream {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl RestartStabilizer {
    /// Wire the stabilizer to a health poller.
    pub fn new(poller: Arc<dyn HealthPoller>, config: StabilizerConfig) -> Self {
        Self { poller, config }
    }

    /// Watch until stability or timeout.
    ///
    /// `stream` optionally feeds live state events; they are informational
    /// and forwarded to `on_state` without influencing the verdict. Each
    /// poll either extends the consecutive-healthy run or resets it to
    /// zero; poll errors reset the run rather than abort the watch, so a
    /// transient fetch failure only costs progress, never the whole
    /// timeout window.
    pub async fn watch<F>(
        &self,
        mut stream: Option<mpsc::Receiver<Value>>,
        mut on_state: F,
    ) -> WatchOutcome
    where
        F: FnMut(&Value) + Send,
    {
        let deadline = Instant::now() + self.config.hard_timeout;
        let mut ticker = interval_at(
            Instant::now() + self.config.initial_delay,
            self.config.poll_interval,
        );
        let mut consecutive: u32 = 0;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    warn!("stabilization timed out");
                    return WatchOutcome {
                        reason: StableReason::Timeout,
                        last: None,
                    };
                }
                event = next_event(&mut stream) => {
                    match event {
                        Some(state) => on_state(&state),
                        None => stream = None,
                    }
                }
                _ = ticker.tick() => {
                    match self.poller.poll().await {
                        Ok(report) if report.all_good() => {
                            consecutive += 1;
                            debug!(consecutive, "healthy poll");
                            if consecutive >= self.config.required_consecutive {
                                info!(consecutive, "fleet stabilized");
                                return WatchOutcome {
                                    reason: StableReason::Stabilized,
                                    last: Some(report),
                                };
                            }
                        }
                        Ok(_) => {
                            debug!("unhealthy poll; consecutive count reset");
                            consecutive = 0;
                        }
                        Err(err) => {
                            debug!(error = %err, "poll failed; consecutive count reset");
                            consecutive = 0;
                        }
                    }
                }
            }
        }
    }
}
