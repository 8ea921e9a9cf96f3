//! ---
//! oms_section: "04-sequencing-orchestration"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Ordered fleet connect sequencing."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::future::Future;

use tracing::debug;

/// Run `operation` once, then re-run it while `should_retry` approves the
/// latest result, up to `max_retries` additional attempts.
///
/// The operation receives the attempt index (0 for the initial run) so it
/// can narrow its payload on retries, e.g. resending only the units that
/// failed the first time. `max_retries = 0` expresses a single,
/// never-repeated attempt through the same code path.
pub async fn with_retry<T, F, Fut, P>(mut operation: F, should_retry: P, max_retries: usize) -> T
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 0;
    loop {
        let result = operation(attempt).await;
        if attempt >= max_retries || !should_retry(&result) {
            return result;
        }
        attempt += 1;
        debug!(attempt, "retrying operation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_predicate_clears() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { attempt }
            },
            |latest| *latest < 1,
            3,
        )
        .await;
        assert_eq!(result, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn budget_bounds_the_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = with_retry(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still broken") }
            },
            |latest: &Result<(), &str>| latest.is_err(),
            1,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_budget_means_exactly_one_attempt() {
        let calls = AtomicUsize::new(0);
        let _: Result<(), &str> = with_retry(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            },
            |_| true,
            0,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
