use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use harvester_core::BackoffPolicy;
use harvester_engine::{retry_with_backoff, Attempt, RetryError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn policy() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(2))
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_waiting_the_cap_once() {
    let calls = &AtomicUsize::new(0);
    let started = Instant::now();

    let cancel = CancellationToken::new();
    let attempt = move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Attempt::<()>::Transient("blocked, status=429".to_string())
    };
    let result = retry_with_backoff(&policy(), "detail w0", &cancel, attempt).await;

    assert_eq!(
        result,
        Err(RetryError::Exhausted {
            label: "detail w0".to_string(),
            detail: "blocked, status=429".to_string(),
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let calls = &AtomicUsize::new(0);
    let started = Instant::now();

    let cancel = CancellationToken::new();
    let result = retry_with_backoff(&policy(), "search w1", &cancel, move || async move {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Attempt::Transient("network error".to_string())
        } else {
            Attempt::Ready("loc:w1")
        }
    })
    .await;

    assert_eq!(result, Ok("loc:w1"));
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_backoff_sleep() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });
    let started = Instant::now();

    let result: Result<(), _> = retry_with_backoff(
        &BackoffPolicy::new(Duration::from_secs(300), Duration::from_secs(3600)),
        "search w2",
        &cancel,
        || async { Attempt::Transient("reset".to_string()) },
    )
    .await;

    assert_eq!(result, Err(RetryError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));
}
