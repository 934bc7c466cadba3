//! Self-healing provider health monitoring.
//!
//! [`HealthMonitor`] periodically issues a minimal-cost probe through
//! the provider adapter. Individual probe failures degrade the status
//! but do not block traffic; after three consecutive failures the
//! monitor marks the gateway unhealthy (new admissions fast-fail) and
//! attempts a provider reinitialization followed by a fresh probe. Any
//! successful probe — or a successful generation call reported via
//! [`record_success`](HealthMonitor::record_success) — resets the
//! failure streak and restores health.
//!
//! Probe failures never surface to callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::provider::Provider;

/// Consecutive probe failures before the gateway fast-fails admissions.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Read-only snapshot of provider health.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HealthStatus {
    /// False once the failure threshold has been crossed and not yet
    /// recovered.
    pub is_healthy: bool,
    /// When the monitor last probed or observed a call outcome.
    pub last_check: Option<DateTime<Utc>>,
    /// Current streak of failed probes.
    pub consecutive_failures: u32,
    /// Message from the most recent failed probe.
    pub last_error: Option<String>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_check: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Tracks provider health and drives reinitialization.
pub struct HealthMonitor {
    provider: Arc<dyn Provider>,
    status: RwLock<HealthStatus>,
}

impl HealthMonitor {
    /// Create a monitor for the given provider, initially healthy.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            status: RwLock::new(HealthStatus::default()),
        }
    }

    /// Current health snapshot.
    pub fn status(&self) -> HealthStatus {
        self.status.read().clone()
    }

    /// Whether admissions should proceed.
    pub fn is_healthy(&self) -> bool {
        self.status.read().is_healthy
    }

    /// Report a successful probe or generation call: resets the failure
    /// streak and restores health.
    pub fn record_success(&self) {
        let mut status = self.status.write();
        if !status.is_healthy {
            debug!("provider health restored");
        }
        status.is_healthy = true;
        status.consecutive_failures = 0;
        status.last_error = None;
        status.last_check = Some(Utc::now());
    }

    /// Run one probe cycle.
    ///
    /// On failure, extends the streak; crossing [`FAILURE_THRESHOLD`]
    /// marks the gateway unhealthy and triggers reinitialize + probe.
    pub async fn probe_once(&self) {
        match self.provider.probe().await {
            Ok(()) => self.record_success(),
            Err(e) => {
                let crossed_threshold = {
                    let mut status = self.status.write();
                    status.consecutive_failures += 1;
                    status.last_error = Some(e.to_string());
                    status.last_check = Some(Utc::now());
                    if status.consecutive_failures >= FAILURE_THRESHOLD {
                        status.is_healthy = false;
                    }
                    warn!(
                        consecutive_failures = status.consecutive_failures,
                        healthy = status.is_healthy,
                        error = %e,
                        "health probe failed"
                    );
                    !status.is_healthy
                };
                if crossed_threshold {
                    self.reinitialize().await;
                }
            }
        }
    }

    /// Attempt to rebuild the provider connection and verify it.
    async fn reinitialize(&self) {
        warn!("reinitializing provider after repeated probe failures");
        if let Err(e) = self.provider.reinitialize().await {
            warn!(error = %e, "provider reinitialization failed");
            return;
        }
        match self.provider.probe().await {
            Ok(()) => self.record_success(),
            Err(e) => {
                let mut status = self.status.write();
                status.last_error = Some(e.to_string());
                status.last_check = Some(Utc::now());
            }
        }
    }

    /// Spawn a background task probing every `interval`.
    ///
    /// The returned handle aborts the loop when dropped by the caller's
    /// choice; the monitor itself keeps no reference to it.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }
}
