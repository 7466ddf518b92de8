//! Exponential-backoff retry for transient VM API failures (§7 "Transient
//! I/O"). Hand-rolled rather than via `backoff`/`governor` — see DESIGN.md.

use std::time::Duration;

use crate::domain::errors::VmApiError;
use crate::domain::models::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.min(20));
        let scaled = self.base_delay.saturating_mul(exp);
        scaled.min(self.max_delay)
    }

    /// Run `op` until it succeeds, a non-transient error is returned, or
    /// `max_attempts` is exhausted. Retries only on `VmApiError::is_transient`.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, VmApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, VmApiError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(attempt, ?delay, error = %err, "retrying transient vm api error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        })
    }

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = policy
            .run(|| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, VmApiError>(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = policy
            .run(|| {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(VmApiError::Status { status: 503, body: "busy".into() })
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = policy
            .run(|| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(VmApiError::Status { status: 404, body: "missing".into() })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = policy
            .run(|| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(VmApiError::Network("down".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
