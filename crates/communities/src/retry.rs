use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Errors that may succeed when the same request is sent again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Backoff for LLM requests that fail with a transient error (dropped
/// connection, rate limiting, server error). Permanent errors are returned
/// on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), doubling up to the cap
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    pub async fn run<F, Fut, T, E>(&self, operation: &'static str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + fmt::Display,
    {
        let mut retry = 0;

        loop {
            let error = match call().await {
                Ok(value) => {
                    if retry > 0 {
                        info!(operation, attempts = retry + 1, "Request succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                warn!(operation, error = %error, "Request failed permanently");
                return Err(error);
            }
            if retry >= self.max_retries {
                warn!(operation, attempts = retry + 1, error = %error, "Request failed after max retries");
                return Err(error);
            }

            retry += 1;
            let delay = self.backoff(retry);
            warn!(
                operation,
                retry,
                max_retries = self.max_retries,
                backoff_ms = delay.as_millis(),
                error = %error,
                "Request failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum CallError {
        Overloaded,
        BadRequest,
    }

    impl Transient for CallError {
        fn is_transient(&self) -> bool {
            matches!(self, CallError::Overloaded)
        }
    }

    impl fmt::Display for CallError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = policy(10);
        let delays: Vec<u64> = (1..=6).map(|retry| policy.backoff(retry).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(policy.backoff(80), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let attempts = &AtomicUsize::new(0);
        let start = Instant::now();

        let result = policy(3)
            .run("generate", move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CallError::Overloaded)
                } else {
                    Ok("report")
                }
            })
            .await;

        assert_eq!(result, Ok("report"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 100ms then 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let attempts = &AtomicUsize::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy(3)
            .run("generate", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CallError::BadRequest)
            })
            .await;

        assert_eq!(result, Err(CallError::BadRequest));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let attempts = &AtomicUsize::new(0);

        let result: Result<(), _> = policy(2)
            .run("combine", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Overloaded)
            })
            .await;

        assert_eq!(result, Err(CallError::Overloaded));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let attempts = &AtomicUsize::new(0);
        let result: Result<(), _> = RetryPolicy::disabled()
            .run("combine", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Overloaded)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
