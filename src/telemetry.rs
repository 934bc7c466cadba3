//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdallr operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdallr_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `component` — caller tag from the request (e.g. "lesson", "chat")
//! - `status` — outcome: "ok" or "error"
//! - `kind` — error classification on failures
//! - `reason` — denial reason on rejected admissions
//! - `direction` — token direction: "prompt" or "completion"

/// Total requests settled by the gateway (cache hits included).
///
/// Labels: `component`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "heimdallr_requests_total";

/// Provider call duration in seconds.
///
/// Labels: `component`.
pub const REQUEST_DURATION_SECONDS: &str = "heimdallr_request_duration_seconds";

/// Total retryable failures observed by the retry policy.
///
/// Labels: `kind`.
pub const RETRIES_TOTAL: &str = "heimdallr_retries_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "heimdallr_cache_hits_total";

/// Total response cache misses.
pub const CACHE_MISSES_TOTAL: &str = "heimdallr_cache_misses_total";

/// Total requests that attached to an existing in-flight call.
pub const DEDUP_JOINS_TOTAL: &str = "heimdallr_dedup_joins_total";

/// Total admissions denied by the rate limiter.
///
/// Labels: `reason` ("requests_per_minute" | "requests_per_hour" |
/// "tokens_per_minute" | "cost_per_day").
pub const RATE_LIMITED_TOTAL: &str = "heimdallr_rate_limited_total";

/// Total tokens consumed.
///
/// Labels: `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "heimdallr_tokens_total";
