//! Connection retry loops with cooperative cancellation

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fmf_core::resilience::retry::RetryPolicy;
use fmf_core::Result;

/// Sleep for `delay` unless cancelled first.
///
/// Returns `true` if the full delay elapsed, `false` on cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Call `connect` until it succeeds, sleeping the policy's backoff between
/// attempts.
///
/// Every failure is retried and logged: broker-unreachable errors at warn,
/// anything else (timeouts, rejected handshakes) at error. Cancellation is checked before each attempt and
/// during the backoff; an attempt already in flight runs to completion.
/// Returns `None` if cancelled before a connection was made.
pub async fn connect_with_retry<T, F, Fut>(
    what: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut connect: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            info!(what = %what, "Connect cancelled");
            return None;
        }

        attempt = attempt.saturating_add(1);
        match connect().await {
            Ok(conn) => {
                info!(what = %what, attempts = attempt, "Connected");
                return Some(conn);
            }
            Err(e) => {
                let backoff = policy.delay(attempt);
                let backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
                if e.is_connection() {
                    warn!(error = %e, what = %what, attempt = attempt, backoff_ms = backoff_ms, "Broker unreachable, retrying");
                } else {
                    error!(error = %e, what = %what, attempt = attempt, backoff_ms = backoff_ms, "Connection failed, retrying");
                }

                if !sleep_or_cancel(backoff, cancel).await {
                    info!(what = %what, "Connect cancelled during backoff");
                    return None;
                }
            }
        }
    }
}
