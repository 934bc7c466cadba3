//! The gateway core: the control flow every generation call passes
//! through.
//!
//! Order matters and is fixed: cache lookup, in-flight deduplication,
//! rate-limit admission, concurrency queueing, health fast-fail, then
//! the retried provider call. A cache hit costs nothing downstream; a
//! deduplicated joiner consumes no admission budget; a rate-limit
//! denial never occupies a queue slot.
//!
//! Settlement is symmetric: success and failure both produce a ledger
//! record and metrics, and success additionally feeds the cache and
//! resets the health failure streak.

mod builder;
mod stream;

pub use builder::{GatewayBuilder, Heimdallr};
pub use stream::DEFAULT_STREAM_BUFFER;

use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{cache_key, ResponseCache};
use crate::config::GatewayConfig;
use crate::dedup::InFlightDeduplicator;
use crate::error::{ErrorKind, GatewayError};
use crate::health::{HealthMonitor, HealthStatus};
use crate::ledger::{ComponentCount, DailyUsage, PeriodTotals, UsageLedger, UsageRecord};
use crate::limiter::{RateLimitSnapshot, RateLimiter};
use crate::provider::{Provider, ProviderCall, ProviderMessage};
use crate::queue::ConcurrencyQueue;
use crate::retry::with_retry;
use crate::store::KeyValueStore;
use crate::telemetry;
use crate::types::{Admission, GenerateRequest, GenerateResponse, StreamEvent};
use crate::Result;

/// Shared state behind a [`Gateway`]: configuration plus every
/// pipeline stage. Built once and handed to the gateway constructor.
pub struct GatewayContext {
    pub(crate) config: GatewayConfig,
    pub(crate) cache: ResponseCache,
    pub(crate) dedup: Arc<InFlightDeduplicator>,
    pub(crate) limiter: RateLimiter,
    pub(crate) queue: ConcurrencyQueue,
    pub(crate) health: Arc<HealthMonitor>,
    pub(crate) ledger: Arc<UsageLedger>,
}

impl GatewayContext {
    /// Assemble the pipeline stages from configuration, loading any
    /// persisted ledger state from the store.
    pub async fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn KeyValueStore>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let ledger = Arc::new(UsageLedger::open(store, config.ledger).await?);
        Ok(Self {
            cache: ResponseCache::new(config.cache.clone()),
            dedup: Arc::new(InFlightDeduplicator::new()),
            limiter: RateLimiter::new(config.rate_limits.clone()),
            queue: ConcurrencyQueue::new(config.concurrency_limit),
            health: Arc::new(HealthMonitor::new(provider)),
            ledger,
            config,
        })
    }
}

/// Usage statistics combining ledger aggregates with the rate
/// limiter's live counters.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    /// Today's aggregate.
    pub today: DailyUsage,
    /// Rollup over the trailing 7 days.
    pub last_7_days: PeriodTotals,
    /// Components ranked by request count, at most 5.
    pub top_components: Vec<ComponentCount>,
    /// Overall failure ratio across retained history.
    pub error_rate: f64,
    /// Current rolling-window counters and reset deadlines.
    pub rate_limits: RateLimitSnapshot,
}

/// The request gateway. See the [crate docs](crate) for the pipeline
/// overview; construct one through [`Heimdallr::builder`].
pub struct Gateway {
    provider: Arc<dyn Provider>,
    ctx: Arc<GatewayContext>,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl Gateway {
    /// Create a gateway from a provider and an assembled context.
    ///
    /// Spawns the background prober and pruner when their intervals are
    /// configured; both are aborted when the gateway is dropped.
    pub fn new(provider: Arc<dyn Provider>, context: GatewayContext) -> Self {
        let ctx = Arc::new(context);
        let mut background = Vec::new();
        if let Some(interval) = ctx.config.probe_interval {
            background.push(ctx.health.spawn(interval));
        }
        if let Some(interval) = ctx.config.prune_interval {
            background.push(ctx.ledger.spawn_pruner(interval));
        }
        Self {
            provider,
            ctx,
            background,
        }
    }

    /// Run a generation request through the full pipeline.
    ///
    /// Identical requests (same prompt, context, model, temperature)
    /// arriving while one is in flight share a single provider call and
    /// all receive the same result. A cached response is returned with
    /// `cached: true` and touches nothing downstream.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.ctx.config.default_model.clone());
        let temperature = request
            .temperature
            .unwrap_or(self.ctx.config.default_temperature);
        let key = cache_key(&request.prompt, request.context.as_deref(), &model, temperature);

        if request.cache {
            if let Some(mut hit) = self.ctx.cache.get(key) {
                hit.cached = true;
                debug!(key, component = %request.component, "serving cached response");
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "component" => request.component.clone(), "status" => "ok")
                .increment(1);
                return Ok(hit);
            }
        }

        let provider = Arc::clone(&self.provider);
        let ctx = Arc::clone(&self.ctx);
        let (shared, _created) = self
            .ctx
            .dedup
            .join_or_create(key, move || execute(provider, ctx, request, model, temperature, key));
        shared.await
    }

    /// Run a streaming generation request.
    ///
    /// Streams pass through admission, queueing, and the health check
    /// but bypass the cache and deduplication; delivered chunks are
    /// never retracted, so a mid-stream failure surfaces as a terminal
    /// `Err` item after whatever content already arrived. The
    /// concurrency slot is held until the stream settles.
    pub async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let ctx = &self.ctx;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| ctx.config.default_model.clone());
        let temperature = request.temperature.unwrap_or(ctx.config.default_temperature);

        let estimated = request.estimated_tokens(ctx.config.default_max_tokens);
        if let Err(reason) = ctx.limiter.admit(estimated, ctx.ledger.today_cost()) {
            return Err(GatewayError::RequestRejected {
                reason: reason.to_string(),
            });
        }

        let permit = ctx.queue.acquire(request.priority).await;

        if !ctx.health.is_healthy() {
            let status = ctx.health.status();
            return Err(GatewayError::ProviderUnavailable {
                consecutive_failures: status.consecutive_failures,
            });
        }

        let call = build_call(&ctx.config, &request, &model, temperature);
        let started = Instant::now();
        // Retry covers stream establishment only; once chunks flow,
        // failures terminate the stream.
        let opened = with_retry(&ctx.config.retry, "stream_generate", || async {
            match tokio::time::timeout(ctx.config.call_timeout, self.provider.generate_stream(&call))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(GatewayError::provider(
                    ErrorKind::NetworkError,
                    format!(
                        "stream open timed out after {}ms",
                        ctx.config.call_timeout.as_millis()
                    ),
                )),
            }
        })
        .await;

        let inner = match opened {
            Ok(inner) => inner,
            Err(e) => {
                self.settle_failure(&request, &e, started).await;
                return Err(e);
            }
        };

        let recording = stream::RecordingStream::new(
            inner,
            Arc::clone(&self.ctx),
            permit,
            request.component.clone(),
            request.persona.clone(),
            started,
        );
        Ok(stream::bounded(Box::pin(recording), DEFAULT_STREAM_BUFFER))
    }

    /// Pre-flight admission check for UI affordances.
    ///
    /// Evaluates health and every rate budget without consuming any;
    /// a positive answer is advisory, not a reservation.
    pub fn can_make_request(&self, estimated_tokens: u64) -> Admission {
        if !self.ctx.health.is_healthy() {
            return Admission::denied("provider unavailable");
        }
        match self
            .ctx
            .limiter
            .check(estimated_tokens, self.ctx.ledger.today_cost())
        {
            Ok(()) => Admission::allowed(),
            Err(reason) => Admission::denied(reason.to_string()),
        }
    }

    /// Aggregated usage statistics plus live rate-limit counters.
    pub fn usage_stats(&self) -> UsageStats {
        let stats = self.ctx.ledger.stats();
        UsageStats {
            today: stats.today,
            last_7_days: stats.last_7_days,
            top_components: stats.top_components,
            error_rate: stats.error_rate,
            rate_limits: self.ctx.limiter.snapshot(),
        }
    }

    /// Daily aggregates for the trailing `days` dates, oldest first.
    pub fn daily_history(&self, days: u64) -> Vec<DailyUsage> {
        self.ctx.ledger.daily_history(days)
    }

    /// Serialize the full usage history to JSON.
    pub fn export_data(&self) -> Result<String> {
        self.ctx.ledger.export()
    }

    /// Drop all usage history, in memory and in the store.
    pub async fn clear_data(&self) -> Result<()> {
        self.ctx.ledger.clear().await
    }

    /// Drop all cached responses.
    pub fn clear_cache(&self) {
        self.ctx.cache.clear();
    }

    /// Current provider health snapshot.
    pub fn health_status(&self) -> HealthStatus {
        self.ctx.health.status()
    }

    /// Run one health probe cycle immediately.
    pub async fn probe_health(&self) {
        self.ctx.health.probe_once().await;
    }

    async fn settle_failure(&self, request: &GenerateRequest, error: &GatewayError, started: Instant) {
        record_failure(&self.ctx, request, error, started.elapsed().as_millis() as u64).await;
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        for handle in &self.background {
            handle.abort();
        }
    }
}

/// Resolve a request plus configured defaults into the outbound call.
fn build_call(
    config: &GatewayConfig,
    request: &GenerateRequest,
    model: &str,
    temperature: f32,
) -> ProviderCall {
    let mut messages = Vec::with_capacity(2);
    if let Some(context) = &request.context {
        messages.push(ProviderMessage::system(context));
    }
    messages.push(ProviderMessage::user(&request.prompt));
    ProviderCall {
        model: model.to_string(),
        messages,
        max_tokens: request.max_tokens.unwrap_or(config.default_max_tokens),
        temperature,
        user: request.user.clone(),
    }
}

async fn record_failure(
    ctx: &GatewayContext,
    request: &GenerateRequest,
    error: &GatewayError,
    elapsed_ms: u64,
) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "component" => request.component.clone(), "status" => "error")
    .increment(1);
    let mut record = UsageRecord::failure(&request.component, error.to_string(), elapsed_ms);
    if let Some(persona) = &request.persona {
        record = record.persona(persona);
    }
    if let Err(e) = ctx.ledger.record(record).await {
        warn!(error = %e, "failed to record usage");
    }
}

/// The owned pipeline tail shared by all deduplicated callers:
/// admission, queueing, health check, retried provider call, and
/// settlement.
async fn execute(
    provider: Arc<dyn Provider>,
    ctx: Arc<GatewayContext>,
    request: GenerateRequest,
    model: String,
    temperature: f32,
    key: u64,
) -> Result<GenerateResponse> {
    let estimated = request.estimated_tokens(ctx.config.default_max_tokens);
    if let Err(reason) = ctx.limiter.admit(estimated, ctx.ledger.today_cost()) {
        debug!(component = %request.component, %reason, "admission denied");
        return Err(GatewayError::RequestRejected {
            reason: reason.to_string(),
        });
    }

    let _permit = ctx.queue.acquire(request.priority).await;

    if !ctx.health.is_healthy() {
        let status = ctx.health.status();
        return Err(GatewayError::ProviderUnavailable {
            consecutive_failures: status.consecutive_failures,
        });
    }

    let call = build_call(&ctx.config, &request, &model, temperature);
    let started = Instant::now();
    let outcome = with_retry(&ctx.config.retry, "generate", || async {
        match tokio::time::timeout(ctx.config.call_timeout, provider.generate(&call)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::provider(
                ErrorKind::NetworkError,
                format!(
                    "provider call timed out after {}ms",
                    ctx.config.call_timeout.as_millis()
                ),
            )),
        }
    })
    .await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(raw) => {
            ctx.health.record_success();
            let usage = ctx.config.attribute_cost(&raw.usage);
            let response = GenerateResponse {
                content: raw.content,
                usage,
                model: raw.model,
                cached: false,
            };
            if request.cache {
                ctx.cache.insert(key, response.clone());
            }

            metrics::counter!(telemetry::REQUESTS_TOTAL,
                "component" => request.component.clone(), "status" => "ok")
            .increment(1);
            metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                "component" => request.component.clone())
            .record(elapsed.as_secs_f64());
            metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "prompt")
                .increment(usage.prompt_tokens);
            metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "completion")
                .increment(usage.completion_tokens);

            let mut record =
                UsageRecord::success(&request.component, usage, elapsed.as_millis() as u64);
            if let Some(persona) = &request.persona {
                record = record.persona(persona);
            }
            if let Err(e) = ctx.ledger.record(record).await {
                warn!(error = %e, "failed to record usage");
            }
            Ok(response)
        }
        Err(e) => {
            record_failure(&ctx, &request, &e, elapsed.as_millis() as u64).await;
            Err(e)
        }
    }
}
