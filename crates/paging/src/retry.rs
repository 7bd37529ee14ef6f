//! Retry policy for backend calls.

use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::error::BackendError;

/// Retry configuration for backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub retry_count: u32,
    /// Delay before the first retry; grows linearly with each attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 5,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(retry_count: u32) -> Self {
        Self {
            retry_count,
            ..Self::default()
        }
    }

    /// Total number of attempts including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Run `f` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.max_attempts() => {
                    let delay = self.delay * attempt;
                    info!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts(),
                        error = %e,
                        "Backend call failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(BackendError::Api { status: 429, .. }) => {
                    return Err(BackendError::RateLimited { attempts: attempt });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> BackendError {
        BackendError::Api {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(3);

        let result = policy
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(server_error())
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_count() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(2);

        let result: Result<(), _> = policy
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            })
            .await;

        assert!(matches!(result, Err(BackendError::Api { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(5);

        let result: Result<(), _> = policy
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::Api {
                    status: 404,
                    body: "missing".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_is_reported() {
        let policy = RetryPolicy::new(1);

        let result: Result<(), _> = policy
            .run("test", || async {
                Err(BackendError::Api {
                    status: 429,
                    body: String::new(),
                })
            })
            .await;

        assert!(matches!(result, Err(BackendError::RateLimited { attempts: 2 })));
    }
}
