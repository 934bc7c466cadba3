//! Retry policy with exponential backoff and classification-driven
//! cooldowns.
//!
//! [`with_retry`] drives the attempt state machine: a failed attempt is
//! classified once; non-retryable kinds surface immediately regardless
//! of remaining budget, retryable kinds wait out a delay and try again
//! until the attempt budget is spent. The delay is, in precedence
//! order: the provider's `retry_after` hint, the kind's fixed cooldown
//! (60s for rate limiting, 1h for quota exhaustion), or exponential
//! backoff `base * 2^attempt` capped at `max_delay`.
//!
//! Admission failures never reach this module; only provider-call
//! failures are retried.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ErrorKind, GatewayError};
use crate::telemetry;
use crate::Result;

/// Configuration for retry behaviour on classified provider failures.
///
/// ```rust
/// # use heimdallr::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// Default: 3.
    pub max_attempts: u32,
    /// Base delay for exponential backoff. Default: 1s.
    pub base_delay: Duration,
    /// Cap on the exponentially-growing delay. Cooldowns and
    /// `retry_after` hints are not capped. Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request, minimum 1).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the cap on exponential backoff delays.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff delay for a given attempt number (0-indexed):
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// The delay applied after a given failed attempt.
    ///
    /// Provider `retry_after` hints win over the classification's fixed
    /// cooldown, which wins over exponential backoff.
    pub fn effective_delay(&self, attempt: u32, error: &GatewayError) -> Duration {
        error
            .retry_after()
            .or_else(|| error.kind().and_then(|k| k.cooldown()))
            .unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async operation under the retry policy.
///
/// Retryable failures (per [`ErrorKind::is_retryable`]) wait out their
/// delay and try again, up to `config.max_attempts` total attempts.
/// Non-retryable failures are returned immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() => {
                let kind = e.kind().unwrap_or(ErrorKind::Unknown);
                metrics::counter!(telemetry::RETRIES_TOTAL, "kind" => kind.as_str()).increment(1);
                let delay = config.effective_delay(attempt, &e);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e), // terminal classification
        }
    }
    Err(last_err.unwrap_or_else(|| {
        GatewayError::provider(ErrorKind::Unknown, "retry budget exhausted before any attempt")
    }))
}
