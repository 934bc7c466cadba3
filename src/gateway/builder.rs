//! Builder for constructing a [`Gateway`].

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::CacheConfig;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::ledger::LedgerConfig;
use crate::limiter::RateLimitConfig;
use crate::provider::Provider;
use crate::retry::RetryConfig;
use crate::store::{KeyValueStore, MemoryStore};
use crate::Result;

use super::{Gateway, GatewayContext};

/// Entry point for the heimdallr API.
///
/// ```rust,no_run
/// # use heimdallr::{Heimdallr, RateLimitConfig};
/// # use std::sync::Arc;
/// # async fn example(provider: Arc<dyn heimdallr::Provider>) -> heimdallr::Result<()> {
/// let gateway = Heimdallr::builder()
///     .provider(provider)
///     .default_model("openai/gpt-4o-mini")
///     .rate_limits(RateLimitConfig::new().requests_per_minute(20))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Heimdallr;

impl Heimdallr {
    /// Create a new [`GatewayBuilder`].
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }
}

/// Builder for [`Gateway`] instances.
///
/// A provider is required; everything else has defaults. Usage history
/// persists through the supplied [`KeyValueStore`], defaulting to an
/// in-memory store that forgets on drop.
#[derive(Default)]
pub struct GatewayBuilder {
    provider: Option<Arc<dyn Provider>>,
    store: Option<Arc<dyn KeyValueStore>>,
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Create a builder with default configuration and no provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider adapter. Required.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the persistence backend for usage history.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default model.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    /// Set the admission budgets.
    pub fn rate_limits(mut self, limits: RateLimitConfig) -> Self {
        self.config.rate_limits = limits;
        self
    }

    /// Set the retry behaviour.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the cache TTL and capacity.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Set the ledger retention horizons.
    pub fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.config.ledger = ledger;
        self
    }

    /// Set the concurrent outbound call cap.
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit.max(1);
        self
    }

    /// Set the hard per-call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Enable the background health prober at the given interval.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = Some(interval);
        self
    }

    /// Enable the background ledger pruner at the given interval.
    pub fn prune_interval(mut self, interval: Duration) -> Self {
        self.config.prune_interval = Some(interval);
        self
    }

    /// Build the gateway, loading persisted usage history and starting
    /// any configured background tasks.
    pub async fn build(self) -> Result<Gateway> {
        let provider = self.provider.ok_or_else(|| {
            GatewayError::Configuration("a provider is required; call .provider(...)".to_string())
        })?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);

        let context = GatewayContext::new(Arc::clone(&provider), store, self.config).await?;
        info!(
            provider = provider.name(),
            model = %context.config.default_model,
            concurrency = context.config.concurrency_limit,
            "gateway ready"
        );
        Ok(Gateway::new(provider, context))
    }
}
