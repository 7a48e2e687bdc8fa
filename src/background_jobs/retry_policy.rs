//! Retry policy for job callbacks and alert delivery.
//!
//! Implements exponential backoff starting at a minimum delay.

use crate::config::RetrySettings;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy implementing exponential backoff.
///
/// Retries are blind: every error is retried until the attempts run out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of invocations, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry. No retry waits less than this.
    pub min_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.attempts,
            min_delay: settings.min_timeout,
            max_delay: settings.max_timeout,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (0-based).
    ///
    /// `min_delay * multiplier^attempt`, capped at `max_delay` but never below
    /// `min_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let cap = self.max_delay.max(self.min_delay);
        let delay = self.min_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= cap.as_secs_f64() {
            cap
        } else {
            Duration::from_secs_f64(delay).max(self.min_delay)
        }
    }

    /// Run `operation` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt + 1,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySettings::default())
    }
}
