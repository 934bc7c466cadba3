//! In-flight request deduplication.
//!
//! [`InFlightDeduplicator`] maps a request key to a single shared
//! future. The first caller for a key creates the outbound work; every
//! caller arriving before it settles attaches to the same future and
//! receives an identical clone of the result. The entry is removed
//! when the owned future settles, before waiters observe the result.
//!
//! The check-and-insert runs entirely under a sync mutex with no await
//! point in between, so two logically concurrent identical requests
//! can never both create outbound calls.
//!
//! The owned work runs as a detached task, not inside the callers'
//! futures. A caller that gives up (drops its `generate` future, e.g.
//! under `tokio::time::timeout`) therefore cannot strand the work
//! half-done: the provider call still settles, resources held by the
//! pipeline are still released, and the entry is still removed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ErrorKind, GatewayError};
use crate::telemetry;
use crate::types::GenerateResponse;
use crate::Result;

/// A shared, cloneable handle to an in-flight generation result.
pub type SharedResponse = Shared<BoxFuture<'static, Result<GenerateResponse>>>;

/// Map from request key to the single in-flight future for that key.
#[derive(Default)]
pub struct InFlightDeduplicator {
    inflight: Mutex<HashMap<u64, SharedResponse>>,
}

impl InFlightDeduplicator {
    /// Create an empty deduplicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the in-flight future for `key`, or create one.
    ///
    /// Returns the shared future and whether this caller created it.
    /// Created work is spawned as a detached task that removes its
    /// entry on settlement (success or failure), so a later identical
    /// request starts fresh work and an abandoned caller never strands
    /// the work. Must be called from within a tokio runtime.
    pub fn join_or_create<F, Fut>(self: &Arc<Self>, key: u64, factory: F) -> (SharedResponse, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GenerateResponse>> + Send + 'static,
    {
        let mut inflight = self.inflight.lock();
        if let Some(existing) = inflight.get(&key) {
            metrics::counter!(telemetry::DEDUP_JOINS_TOTAL).increment(1);
            debug!(key, "joined in-flight request");
            return (existing.clone(), false);
        }

        let this = Arc::clone(self);
        let fut = factory();
        let task = tokio::spawn(async move {
            let result = fut.await;
            this.inflight.lock().remove(&key);
            result
        });
        let shared: SharedResponse = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(GatewayError::provider(
                    ErrorKind::Unknown,
                    format!("generation task failed: {e}"),
                )),
            }
        }
        .boxed()
        .shared();
        // The task cannot touch the map until this lock is released, so
        // the entry is visible before the task's own removal runs.
        inflight.insert(key, shared.clone());
        (shared, true)
    }

    /// Whether a call for `key` is currently in flight.
    pub fn contains(&self, key: u64) -> bool {
        self.inflight.lock().contains_key(&key)
    }

    /// Number of distinct keys currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Whether no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }
}
