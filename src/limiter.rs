//! Multi-budget admission control.
//!
//! [`RateLimiter`] tracks four independent budgets: requests/minute,
//! requests/hour, tokens/minute, and cost/day. The minute and hour
//! windows are rolling counters that reset lazily — the first check
//! after a window boundary zeroes that window before evaluating. The
//! daily cost budget is evaluated against the [`UsageLedger`]'s running
//! total for today, supplied by the caller, so spend accounting has a
//! single source of truth.
//!
//! [`check`](RateLimiter::check) never consumes budget;
//! [`admit`](RateLimiter::admit) increments counters only when all four
//! budgets pass.
//!
//! [`UsageLedger`]: crate::UsageLedger

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::telemetry;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Budget thresholds for admission control.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum admissions per rolling minute. Default: 30.
    pub requests_per_minute: u64,
    /// Maximum admissions per rolling hour. Default: 500.
    pub requests_per_hour: u64,
    /// Maximum estimated tokens per rolling minute. Default: 40,000.
    pub tokens_per_minute: u64,
    /// Maximum estimated spend per calendar day. Default: 10.0.
    pub cost_per_day: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            requests_per_hour: 500,
            tokens_per_minute: 40_000,
            cost_per_day: 10.0,
        }
    }
}

impl RateLimitConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-minute request budget.
    pub fn requests_per_minute(mut self, n: u64) -> Self {
        self.requests_per_minute = n;
        self
    }

    /// Set the per-hour request budget.
    pub fn requests_per_hour(mut self, n: u64) -> Self {
        self.requests_per_hour = n;
        self
    }

    /// Set the per-minute token budget.
    pub fn tokens_per_minute(mut self, n: u64) -> Self {
        self.tokens_per_minute = n;
        self
    }

    /// Set the per-day cost budget.
    pub fn cost_per_day(mut self, cost: f64) -> Self {
        self.cost_per_day = cost;
        self
    }
}

/// Which budget denied an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    RequestsPerMinute,
    RequestsPerHour,
    TokensPerMinute,
    CostPerDay,
}

impl DenialReason {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::RequestsPerMinute => "requests_per_minute",
            DenialReason::RequestsPerHour => "requests_per_hour",
            DenialReason::TokensPerMinute => "tokens_per_minute",
            DenialReason::CostPerDay => "cost_per_day",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::RequestsPerMinute => write!(f, "per-minute request limit reached"),
            DenialReason::RequestsPerHour => write!(f, "per-hour request limit reached"),
            DenialReason::TokensPerMinute => write!(f, "per-minute token budget exhausted"),
            DenialReason::CostPerDay => write!(f, "daily cost budget exhausted"),
        }
    }
}

/// Point-in-time view of the rolling counters, for usage stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub requests_this_minute: u64,
    pub requests_this_hour: u64,
    pub tokens_this_minute: u64,
    /// Milliseconds until the minute window resets.
    pub minute_resets_in_ms: u64,
    /// Milliseconds until the hour window resets.
    pub hour_resets_in_ms: u64,
}

struct Counters {
    requests_this_minute: u64,
    tokens_this_minute: u64,
    minute_started: Instant,
    requests_this_hour: u64,
    hour_started: Instant,
}

impl Counters {
    fn new(now: Instant) -> Self {
        Self {
            requests_this_minute: 0,
            tokens_this_minute: 0,
            minute_started: now,
            requests_this_hour: 0,
            hour_started: now,
        }
    }

    /// Reset any window whose boundary has elapsed. Each window resets
    /// exactly once per boundary; counters are monotone in between.
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.minute_started) >= MINUTE {
            self.requests_this_minute = 0;
            self.tokens_this_minute = 0;
            self.minute_started = now;
        }
        if now.duration_since(self.hour_started) >= HOUR {
            self.requests_this_hour = 0;
            self.hour_started = now;
        }
    }
}

/// Rolling-window rate limiter over four budgets.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<Counters>,
}

impl RateLimiter {
    /// Create a limiter with the given thresholds.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(Counters::new(Instant::now())),
        }
    }

    /// Evaluate all four budgets without consuming any.
    ///
    /// `daily_cost` is the ledger's running spend for today.
    pub fn check(&self, estimated_tokens: u64, daily_cost: f64) -> Result<(), DenialReason> {
        let mut counters = self.counters.lock();
        counters.roll(Instant::now());
        self.evaluate(&counters, estimated_tokens, daily_cost)
    }

    /// Evaluate all four budgets and consume them if every one passes.
    ///
    /// Increments happen only on actual admission; a denied request
    /// consumes nothing.
    pub fn admit(&self, estimated_tokens: u64, daily_cost: f64) -> Result<(), DenialReason> {
        let mut counters = self.counters.lock();
        counters.roll(Instant::now());
        if let Err(reason) = self.evaluate(&counters, estimated_tokens, daily_cost) {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "reason" => reason.as_str())
                .increment(1);
            return Err(reason);
        }
        counters.requests_this_minute += 1;
        counters.requests_this_hour += 1;
        counters.tokens_this_minute += estimated_tokens;
        Ok(())
    }

    fn evaluate(
        &self,
        counters: &Counters,
        estimated_tokens: u64,
        daily_cost: f64,
    ) -> Result<(), DenialReason> {
        if counters.requests_this_minute >= self.config.requests_per_minute {
            return Err(DenialReason::RequestsPerMinute);
        }
        if counters.requests_this_hour >= self.config.requests_per_hour {
            return Err(DenialReason::RequestsPerHour);
        }
        if counters.tokens_this_minute + estimated_tokens > self.config.tokens_per_minute {
            return Err(DenialReason::TokensPerMinute);
        }
        if daily_cost >= self.config.cost_per_day {
            return Err(DenialReason::CostPerDay);
        }
        Ok(())
    }

    /// Current counters and reset deadlines.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        counters.roll(now);
        RateLimitSnapshot {
            requests_this_minute: counters.requests_this_minute,
            requests_this_hour: counters.requests_this_hour,
            tokens_this_minute: counters.tokens_this_minute,
            minute_resets_in_ms: MINUTE
                .saturating_sub(now.duration_since(counters.minute_started))
                .as_millis() as u64,
            hour_resets_in_ms: HOUR
                .saturating_sub(now.duration_since(counters.hour_started))
                .as_millis() as u64,
        }
    }

    /// The configured thresholds.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_until_minute_budget_spent() {
        let limiter = RateLimiter::new(RateLimitConfig::new().requests_per_minute(2));
        assert!(limiter.admit(10, 0.0).is_ok());
        assert!(limiter.admit(10, 0.0).is_ok());
        assert_eq!(
            limiter.admit(10, 0.0),
            Err(DenialReason::RequestsPerMinute)
        );
    }

    #[tokio::test]
    async fn check_does_not_consume() {
        let limiter = RateLimiter::new(RateLimitConfig::new().requests_per_minute(1));
        for _ in 0..5 {
            assert!(limiter.check(10, 0.0).is_ok());
        }
        assert!(limiter.admit(10, 0.0).is_ok());
        assert!(limiter.check(10, 0.0).is_err());
    }

    #[tokio::test]
    async fn denied_admission_consumes_nothing() {
        let limiter = RateLimiter::new(RateLimitConfig::new().tokens_per_minute(100));
        assert_eq!(
            limiter.admit(101, 0.0),
            Err(DenialReason::TokensPerMinute)
        );
        assert_eq!(limiter.snapshot().tokens_this_minute, 0);
        assert_eq!(limiter.snapshot().requests_this_minute, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn minute_window_resets_lazily() {
        let limiter = RateLimiter::new(RateLimitConfig::new().requests_per_minute(1));
        assert!(limiter.admit(10, 0.0).is_ok());
        assert!(limiter.admit(10, 0.0).is_err());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.admit(10, 0.0).is_ok());
        assert_eq!(limiter.snapshot().requests_this_minute, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hour_budget_survives_minute_resets() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new()
                .requests_per_minute(10)
                .requests_per_hour(2),
        );
        assert!(limiter.admit(1, 0.0).is_ok());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.admit(1, 0.0).is_ok());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.admit(1, 0.0), Err(DenialReason::RequestsPerHour));
    }

    #[tokio::test]
    async fn daily_cost_budget_from_ledger_total() {
        let limiter = RateLimiter::new(RateLimitConfig::new().cost_per_day(5.0));
        assert!(limiter.admit(1, 4.99).is_ok());
        assert_eq!(limiter.admit(1, 5.0), Err(DenialReason::CostPerDay));
    }

    #[tokio::test]
    async fn token_budget_counts_admitted_tokens() {
        let limiter = RateLimiter::new(RateLimitConfig::new().tokens_per_minute(1000));
        assert!(limiter.admit(500, 0.0).is_ok());
        assert!(limiter.admit(400, 0.0).is_ok());
        assert_eq!(
            limiter.admit(200, 0.0),
            Err(DenialReason::TokensPerMinute)
        );
    }
}
