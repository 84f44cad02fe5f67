//! Rate-limited work queue (C2)
//!
//! Serializes upstream calls behind a concurrency cap and a minimum
//! interval between starts, retrying retryable failures with exponential
//! backoff. There's no external token-bucket dependency here — just the
//! semaphore-plus-last-start-instant shape, mirroring the teacher's
//! `OAuthHttpClient` retry loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{Error, Result};

/// Elapsed time for a single call, for aggregation by the Extract Engine.
#[derive(Debug, Clone, Copy)]
pub struct CallTiming {
    pub elapsed: Duration,
    pub attempts: u32,
}

pub struct RateLimitedQueue {
    semaphore: Semaphore,
    last_start: Mutex<Option<Instant>>,
    config: QueueConfig,
}

impl RateLimitedQueue {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Semaphore::new(config.max_inflight),
            last_start: Mutex::new(None),
            config,
        })
    }

    /// Run `f`, enforcing the concurrency cap, the minimum interval between
    /// call starts, and exponential backoff retry on retryable errors.
    /// Returns `Error::Cancelled` promptly if `cancel` fires while queued,
    /// waiting out the interval, or backing off.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, f: F) -> Result<(T, CallTiming)>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => permit.map_err(|e| Error::Other(e.to_string()))?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        self.wait_for_interval(cancel).await?;

        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match f().await {
                Ok(value) => {
                    return Ok((
                        value,
                        CallTiming {
                            elapsed: start.elapsed(),
                            attempts: attempt + 1,
                        },
                    ));
                }
                Err(err) if err.is_retryable() && attempt < self.config.retry_attempts => {
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "retrying upstream call");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn wait_for_interval(&self, cancel: &CancellationToken) -> Result<()> {
        let mut last_start = self.last_start.lock().await;
        if let Some(last) = *last_start {
            let elapsed = last.elapsed();
            if elapsed < self.config.min_interval {
                let remaining = self.config.min_interval - elapsed;
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }
        *last_start = Some(Instant::now());
        Ok(())
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.config.retry_initial_backoff.as_millis() as u64;
        let scaled = base.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(scaled).min(self.config.retry_max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_retryable_errors_and_eventually_succeeds() {
        let queue = RateLimitedQueue::new(QueueConfig {
            max_inflight: 1,
            min_interval: Duration::from_millis(1),
            retry_attempts: 3,
            retry_initial_backoff: Duration::from_millis(1),
            retry_max_backoff: Duration::from_millis(5),
        });
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let (value, timing) = queue
            .execute(&cancel, || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(Error::Api {
                            status: 503,
                            endpoint: "/test".to_string(),
                            body: String::new(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(timing.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let queue = RateLimitedQueue::new(QueueConfig {
            max_inflight: 1,
            min_interval: Duration::from_millis(1),
            retry_attempts: 3,
            retry_initial_backoff: Duration::from_millis(1),
            retry_max_backoff: Duration::from_millis(5),
        });
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let result = queue
            .execute(&cancel, || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::Schema("bad payload".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_execution() {
        let queue = RateLimitedQueue::new(QueueConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = queue.execute(&cancel, || async { Ok::<_, Error>(1) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
