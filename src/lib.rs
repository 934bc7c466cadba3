//! # heimdallr
//!
//! A resilient request gateway for LLM APIs. Every generation call
//! passes through a fixed pipeline: response cache, in-flight
//! deduplication, multi-budget rate limiting, a priority concurrency
//! queue, a provider health check, and a classification-driven retry
//! policy around the outbound call. Settled calls are recorded in a
//! persistent usage ledger with per-component attribution.
//!
//! The gateway never speaks HTTP itself; you supply a [`Provider`]
//! adapter for your upstream API. Adapters classify every failure with
//! an [`ErrorKind`] at the boundary, and the core decides retry
//! behaviour from that classification alone.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use heimdallr::{GenerateRequest, Heimdallr, Priority, RateLimitConfig};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn heimdallr::Provider>) -> heimdallr::Result<()> {
//! let gateway = Heimdallr::builder()
//!     .provider(provider)
//!     .default_model("openai/gpt-4o-mini")
//!     .rate_limits(RateLimitConfig::new().requests_per_minute(20))
//!     .build()
//!     .await?;
//!
//! let response = gateway
//!     .generate(
//!         GenerateRequest::new("Explain ownership in Rust")
//!             .context("You are a patient tutor.")
//!             .component("lesson")
//!             .priority(Priority::High),
//!     )
//!     .await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! [`Gateway::stream_generate`] yields [`StreamEvent`]s through a
//! bounded channel; delivered chunks are never retracted, and the
//! stream terminates with a `Done` event carrying usage when the
//! provider reports it.
//!
//! ## Observability
//!
//! Metrics are emitted through the [`metrics`] facade under the names
//! in [`telemetry`]; install any compatible recorder. Logs go through
//! [`tracing`].

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod gateway;
pub mod health;
pub mod ledger;
pub mod limiter;
pub mod provider;
pub mod queue;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod types;

pub use cache::{cache_key, CacheConfig, ResponseCache};
pub use config::GatewayConfig;
pub use dedup::InFlightDeduplicator;
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{Gateway, GatewayBuilder, GatewayContext, Heimdallr, UsageStats};
pub use health::{HealthMonitor, HealthStatus, FAILURE_THRESHOLD};
pub use ledger::{
    ComponentCount, DailyUsage, LedgerConfig, LedgerStats, PeriodTotals, UsageLedger, UsageRecord,
};
pub use limiter::{DenialReason, RateLimitConfig, RateLimitSnapshot, RateLimiter};
pub use provider::{
    Provider, ProviderCall, ProviderMessage, ProviderResponse, ProviderUsage, Role,
};
pub use queue::{ConcurrencyQueue, Permit};
pub use retry::{with_retry, RetryConfig};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use types::{
    Admission, GenerateRequest, GenerateResponse, Priority, StreamEvent, Usage,
};
