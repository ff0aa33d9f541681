use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::metrics::SEND_RETRIES;
use crate::BackoffPolicy;
use crate::TransportError;

/// Runs `task` until it succeeds, fails non-retriably, or exhausts
/// `policy.max_retries` attempts.
///
/// Every attempt is bounded by `policy.timeout_ms`. Delays start at
/// `base_delay_ms` and double up to `max_delay_ms`. Returns the last error.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    mut task: F,
    policy: BackoffPolicy,
) -> std::result::Result<P, TransportError>
where
    F: FnMut() -> T,
    T: std::future::Future<Output = std::result::Result<P, TransportError>>,
{
    let max_attempts = policy.max_retries.max(1);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut current_delay = Duration::from_millis(policy.base_delay_ms);

    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!("Attempt {} of {}", attempt, max_attempts);

        let error = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(error)) => error,
            Err(_) => {
                warn!("Task timed out after {:?}", timeout_duration);
                TransportError::Timeout(timeout_duration)
            }
        };

        if !error.is_retriable() {
            warn!("Task failed with non-retriable error: {}", error);
            return Err(error);
        }
        if attempt >= max_attempts {
            warn!("Task failed after {} attempts: {}", attempt, error);
            return Err(error);
        }

        warn!("Attempt {} failed: {}. Retrying in {:?}...", attempt, error, current_delay);
        SEND_RETRIES.inc();
        sleep(current_delay).await;

        // Exponential backoff (double the delay each time)
        current_delay = (current_delay * 2).min(max_delay);
    }
}
