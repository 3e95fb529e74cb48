use std::time::Duration;
use tokio::sync::{AcquireError, Mutex, Semaphore, SemaphorePermit};
use tokio::time::{Instant, sleep_until};

use crate::config::SummarizerConfig;

/// Throttle shared by every call to the generation service.
///
/// Caps the number of requests in flight and spaces request starts at least
/// `min_interval` apart. Waiting is async, other tasks keep running.
pub struct RequestLimiter {
    permits: Semaphore,
    min_interval: Duration,
    next_start: Mutex<Instant>,
}

impl RequestLimiter {
    pub fn new(max_in_flight: usize, min_interval: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_in_flight),
            min_interval,
            next_start: Mutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &SummarizerConfig) -> Self {
        Self::new(config.max_concurrent_llm_calls, config.min_request_interval())
    }

    /// Wait for a free slot; the request may start once this returns and
    /// holds the slot until the permit is dropped.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        let permit = self.permits.acquire().await?;

        if !self.min_interval.is_zero() {
            let mut next_start = self.next_start.lock().await;
            let now = Instant::now();
            if *next_start > now {
                sleep_until(*next_start).await;
            }
            *next_start = Instant::now() + self.min_interval;
        }

        Ok(permit)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
