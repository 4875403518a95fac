//! Retry with exponential backoff and jitter.
//!
//! Handles transient provider failures: rate limiting (429), server
//! errors (5xx), and network timeouts. Authentication and client errors
//! are surfaced immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::ai::provider::{ProviderError, RetryCallback};

/// Backoff configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (1-indexed): exponential growth with
    /// up to 25% random jitter, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        base.mul_f64(1.0 + jitter).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the retry
/// budget is exhausted. `on_retry` is invoked before each re-attempt.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    on_retry: Option<RetryCallback>,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0usize;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if !error.is_retryable() || attempt > config.max_retries {
                    return Err(error);
                }

                let delay = error
                    .retry_after()
                    .unwrap_or_else(|| config.delay_for_attempt(attempt));
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying provider call"
                );
                if let Some(callback) = &on_retry {
                    callback(attempt, &error);
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}
