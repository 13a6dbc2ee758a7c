use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed retry budget with linear backoff.
///
/// Attempt 0 runs immediately. After failed attempt `n` the policy waits
/// `base_delay * (n + 1)` before trying again, until an attempt succeeds or
/// `max_retries` retries have failed. Every error is retried the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total attempts an always-failing operation receives.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pause between failed attempt `attempt` (0-based) and the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Run `operation` until it succeeds or the budget is spent.
    ///
    /// The operation receives the 0-based attempt number. The last error is
    /// returned when every attempt fails.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_counted(operation).await.0
    }

    /// Like [`RetryPolicy::run`], also reporting how many attempts were made.
    pub async fn run_counted<F, Fut, T, E>(&self, mut operation: F) -> (Result<T, E>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => return (Ok(value), attempt + 1),
                Err(error) => error,
            };

            if attempt >= self.max_retries {
                return (Err(error), attempt + 1);
            }

            let delay = self.delay_after(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = self.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                %error,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
