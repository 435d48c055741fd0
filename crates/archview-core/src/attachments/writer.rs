//! Background cache writes
//!
//! Cache fills never hold up a response. Each write runs as a tracked task,
//! is retried with exponential backoff and logs its final failure.

use archview_common::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

pub const DEFAULT_WRITE_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);
const MAX_DELAY: Duration = Duration::from_secs(5);

pub struct CacheWriter {
    tracker: TaskTracker,
    attempts: u32,
    base_delay: Duration,
    flush_lock: Mutex<()>,
}

impl Default for CacheWriter {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_ATTEMPTS)
    }
}

impl CacheWriter {
    /// Create a writer making at most `attempts` tries per write
    pub fn new(attempts: u32) -> Self {
        Self {
            tracker: TaskTracker::new(),
            attempts: attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Spawn a write; `write` is called again for every retry
    pub fn spawn<F, Fut>(&self, kind: &'static str, key: String, write: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let attempts = self.attempts;
        let base_delay = self.base_delay;

        self.tracker.spawn(async move {
            for attempt in 0..attempts {
                match write().await {
                    Ok(()) => {
                        debug!(kind, key = %key, attempt, "Background cache write done");
                        return;
                    }
                    Err(e) if attempt + 1 < attempts => {
                        let delay = backoff(base_delay, attempt);
                        warn!(
                            kind,
                            key = %key,
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "Background cache write failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        error!(
                            kind,
                            key = %key,
                            attempts,
                            error = %e,
                            "Background cache write abandoned"
                        );
                    }
                }
            }
        });
    }

    /// Number of writes still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every write spawned so far has finished
    pub async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Delay before retry number `attempt + 1`
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt)).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archview_common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff() {
        let base = Duration::from_millis(50);
        assert_eq!(backoff(base, 0), Duration::from_millis(50));
        assert_eq!(backoff(base, 1), Duration::from_millis(100));
        assert_eq!(backoff(base, 2), Duration::from_millis(200));
        assert_eq!(backoff(base, 20), MAX_DELAY);
        assert_eq!(backoff(base, 40), MAX_DELAY);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let writer = CacheWriter::new(3).with_base_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        writer.spawn("raw", "1".to_string(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::Storage("disk full".into()))
                } else {
                    Ok(())
                }
            }
        });

        writer.flush().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(writer.pending(), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let writer = CacheWriter::new(3).with_base_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        writer.spawn("raw", "1".to_string(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Storage("read-only filesystem".into()))
            }
        });

        writer.flush().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_writer_is_reusable_after_flush() {
        let writer = CacheWriter::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = calls.clone();
            writer.spawn("raw", "1".to_string(), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
            writer.flush().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
