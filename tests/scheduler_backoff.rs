use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::try_join_all;
use reqwest::StatusCode;
use tokio::time::{Duration, Instant};

use coldpush::error::UploadError;
use coldpush::scheduler::{Backoff, PartScheduler};

fn transient() -> UploadError {
    UploadError::BadStatus {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "injected outage".to_string(),
    }
}

#[test]
fn delay_doubles_per_failure_and_caps_at_five_minutes() {
    let backoff = Backoff::default();
    assert_eq!(backoff.delay(), Duration::from_secs(1));

    backoff.record_failure();
    assert_eq!(backoff.delay(), Duration::from_secs(2));
    backoff.record_failure();
    assert_eq!(backoff.delay(), Duration::from_secs(4));
    backoff.record_failure();
    assert_eq!(backoff.delay(), Duration::from_secs(8));

    for _ in 0..30 {
        backoff.record_failure();
    }
    assert_eq!(backoff.delay(), Duration::from_secs(300));

    backoff.record_success();
    assert_eq!(backoff.delay(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn waits_follow_the_failure_streak() {
    let scheduler = PartScheduler::new(1);
    let attempts = AtomicU32::new(0);

    let started = Instant::now();
    scheduler
        .run("part 0", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(transient())
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    // Waits before the four attempts: 1, 2, 4, 8 seconds
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16),
        "unexpected total wait {elapsed:?}"
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn success_resets_the_shared_exponent() {
    let scheduler = PartScheduler::new(1);

    let attempts = AtomicU32::new(0);
    scheduler
        .run("part 0", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    // The fleet is rescued: the next task is back to the 1 s baseline
    let started = Instant::now();
    scheduler.run("part 1", || async { Ok(()) }).await.unwrap();
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2),
        "unexpected wait {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn at_most_c_attempts_in_flight() {
    let scheduler = PartScheduler::new(3);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let jobs = (0..10).map(|n| {
        let scheduler = &scheduler;
        let current = current.clone();
        let peak = peak.clone();
        async move {
            let label = format!("part {n}");
            scheduler
                .run(&label, || {
                    let current = current.clone();
                    let peak = peak.clone();
                    async move {
                        let inflight = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(inflight, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), UploadError>(())
                    }
                })
                .await
        }
    });
    try_join_all(jobs).await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 3, "bound violated");
    assert_eq!(current.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_errors_abort_without_retry() {
    let scheduler = PartScheduler::new(2);
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = scheduler
        .run("part 0", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(UploadError::Config("broken setup".to_string())) }
        })
        .await;

    assert!(matches!(result, Err(UploadError::Config(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn checksum_mismatch_is_retried() {
    let scheduler = PartScheduler::new(1);
    let attempts = AtomicU32::new(0);

    scheduler
        .run("part 0", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(UploadError::ChecksumMismatch {
                        sent: "aa".to_string(),
                        received: "bb".to_string(),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
