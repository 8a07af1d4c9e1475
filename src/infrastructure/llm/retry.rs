//! Exponential-backoff retry for transient generative-client errors.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::errors::LlmApiError;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        assert!(initial_backoff_ms > 0, "initial_backoff_ms must be greater than 0");
        assert!(
            max_backoff_ms >= initial_backoff_ms,
            "max_backoff_ms must be >= initial_backoff_ms"
        );
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Execute an operation, retrying transient failures with backoff.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmApiError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        "attempt {} failed with transient error: {}. retrying in {:?}",
                        attempt + 1,
                        err,
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// min(initial * 2^attempt, max)
    fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1_000, 60_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(3, 1, 10);
        let attempts = AtomicU32::new(0);

        let result = policy
            .execute(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmApiError::NetworkError("flaky".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(3, 1, 10);
        let attempts = AtomicU32::new(0);

        let result: Result<i32, _> = policy
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(LlmApiError::AuthFailed("nope".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let policy = RetryPolicy::new(2, 1, 10);
        let attempts = AtomicU32::new(0);

        let result: Result<i32, _> = policy
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(LlmApiError::Timeout(1))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
