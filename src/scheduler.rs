use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::constants::MAX_RETRY_DELAY_SECS;
use crate::error::{RetryClass, UploadError};

/// Shared failure counter driving exponential backoff. One counter for
/// the whole fleet: the failure mode being defended against is
/// service-wide, so any success immediately rescues every worker from a
/// long delay, while a sustained outage quickly reaches the cap.
#[derive(Debug, Default)]
pub struct Backoff {
    failures: AtomicU32,
}

impl Backoff {
    /// `min(MAX_RETRY_DELAY, 2^failures)` seconds.
    pub fn delay(&self) -> Duration {
        let f = self.failures.load(Ordering::Relaxed);
        // 2^9 already exceeds the cap, so larger exponents saturate.
        let secs = (1u64 << f.min(9)).min(MAX_RETRY_DELAY_SECS);
        Duration::from_secs(secs)
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Bounded-concurrency retry queue for part uploads. At most `C`
/// attempts are in flight at once; an attempt occupies its slot for the
/// backoff wait plus the attempt body. A failed part goes to the back of
/// the queue (the semaphore wakes waiters in FIFO order) and is retried
/// without bound; only fatal errors abort.
pub struct PartScheduler {
    slots: Semaphore,
    backoff: Backoff,
}

impl PartScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            slots: Semaphore::new(concurrency.max(1)),
            backoff: Backoff::default(),
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        loop {
            let permit = self
                .slots
                .acquire()
                .await
                .expect("scheduler semaphore is never closed");
            sleep(self.backoff.delay()).await;
            let result = attempt().await;
            drop(permit);

            match result {
                Ok(value) => {
                    self.backoff.record_success();
                    return Ok(value);
                }
                Err(e) if e.retry_class() == RetryClass::Fatal => return Err(e),
                Err(e) => {
                    self.backoff.record_failure();
                    warn!(
                        "{label} failed ({e}); retrying in {}s",
                        self.backoff.delay().as_secs()
                    );
                }
            }
        }
    }
}
