//! Gateway configuration.
//!
//! All knobs are supplied at construction time; the gateway never reads
//! environment or files itself. Defaults are conservative enough for a
//! single-user application sharing one provider account.

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::ledger::LedgerConfig;
use crate::limiter::RateLimitConfig;
use crate::provider::ProviderUsage;
use crate::retry::RetryConfig;
use crate::types::Usage;

/// Construction-time configuration for a [`Gateway`](crate::Gateway).
///
/// ```rust
/// # use heimdallr::{GatewayConfig, RateLimitConfig};
/// # use std::time::Duration;
/// let config = GatewayConfig::new()
///     .default_model("anthropic/claude-sonnet-4")
///     .rate_limits(RateLimitConfig::new().requests_per_minute(20))
///     .concurrency_limit(2)
///     .probe_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Model used when a request does not specify one.
    pub default_model: String,
    /// Temperature used when a request does not specify one. Default: 0.7.
    pub default_temperature: f32,
    /// Output token cap when a request does not specify one. Default: 1024.
    pub default_max_tokens: usize,
    /// Hard timeout on a single provider call; expiry is classified as
    /// a network error. Default: 30s.
    pub call_timeout: Duration,
    /// Admission budgets.
    pub rate_limits: RateLimitConfig,
    /// Retry behaviour for classified provider failures.
    pub retry: RetryConfig,
    /// Response cache TTL and capacity.
    pub cache: CacheConfig,
    /// Maximum concurrent outbound provider calls. Default: 3.
    pub concurrency_limit: usize,
    /// Interval between health probes; `None` disables the background
    /// prober (probes can still be driven manually). Default: `None`.
    pub probe_interval: Option<Duration>,
    /// Interval between ledger retention passes; `None` disables the
    /// background pruner. Default: `None`.
    pub prune_interval: Option<Duration>,
    /// Ledger retention horizons.
    pub ledger: LedgerConfig,
    /// Cost per 1,000 prompt tokens, in account currency.
    pub cost_per_1k_prompt_tokens: f64,
    /// Cost per 1,000 completion tokens, in account currency.
    pub cost_per_1k_completion_tokens: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_model: "openai/gpt-4o-mini".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 1024,
            call_timeout: Duration::from_secs(30),
            rate_limits: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            concurrency_limit: 3,
            probe_interval: None,
            prune_interval: None,
            ledger: LedgerConfig::default(),
            cost_per_1k_prompt_tokens: 0.00015,
            cost_per_1k_completion_tokens: 0.0006,
        }
    }
}

impl GatewayConfig {
    /// Create a config with the defaults above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default model.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the default temperature.
    pub fn default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    /// Set the default output token cap.
    pub fn default_max_tokens(mut self, max_tokens: usize) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Set the hard per-call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the admission budgets.
    pub fn rate_limits(mut self, limits: RateLimitConfig) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Set the retry behaviour.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cache TTL and capacity.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the concurrent outbound call cap (minimum 1).
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Enable the background health prober at the given interval.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Enable the background ledger pruner at the given interval.
    pub fn prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = Some(interval);
        self
    }

    /// Set the ledger retention horizons.
    pub fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }

    /// Set token pricing used for cost estimation.
    pub fn pricing(mut self, per_1k_prompt: f64, per_1k_completion: f64) -> Self {
        self.cost_per_1k_prompt_tokens = per_1k_prompt;
        self.cost_per_1k_completion_tokens = per_1k_completion;
        self
    }

    /// Attribute cost to provider-reported token counts.
    pub fn attribute_cost(&self, usage: &ProviderUsage) -> Usage {
        let estimated_cost = usage.prompt_tokens as f64 / 1000.0 * self.cost_per_1k_prompt_tokens
            + usage.completion_tokens as f64 / 1000.0 * self.cost_per_1k_completion_tokens;
        Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            estimated_cost,
        }
    }
}
