use std::future::Future;

use engine_logging::{engine_error, engine_warn};
use harvester_core::{BackoffPolicy, RetryAttempt, RetryDecision};
use tokio_util::sync::CancellationToken;

/// Result of one attempt inside [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Ready(T),
    /// Retry after backing off; carries a short description of the cause.
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The cap was waited out and the failure persisted.
    Exhausted { label: String, detail: String },
    Cancelled,
}

/// Re-invokes `action` while it reports transient failures, sleeping with
/// exponential backoff between attempts. Gives up after a second failure
/// at the cap. Sleeping observes `cancel`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    cancel: &CancellationToken,
    mut action: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut retry = RetryAttempt::new(label);
    loop {
        let detail = match action().await {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Transient(detail) => detail,
        };
        match retry.on_transient(policy) {
            RetryDecision::Wait(delay) => {
                engine_warn!(
                    "{} ({}): retry {} in {:.1}s",
                    retry.label,
                    detail,
                    retry.attempt,
                    delay.as_secs_f64()
                );
                sleep_or_cancel(delay, cancel).await?;
            }
            RetryDecision::GiveUp => {
                engine_error!(
                    "{} ({}): backoff cap reached, giving up",
                    retry.label,
                    detail
                );
                return Err(RetryError::Exhausted {
                    label: retry.label,
                    detail,
                });
            }
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(
    delay: std::time::Duration,
    cancel: &CancellationToken,
) -> Result<(), RetryError> {
    if cancel.is_cancelled() {
        return Err(RetryError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(RetryError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
