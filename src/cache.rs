//! Content-addressed response cache with TTL expiry.
//!
//! [`ResponseCache`] stores settled [`GenerateResponse`]s keyed on a
//! content hash of (prompt, context, model, temperature). Entries
//! expire after a configurable TTL and the store is capacity-bounded:
//! inserts past capacity evict the entry with the lowest hit count,
//! tie-broken by least-recent access, so a frequently-reused entry
//! survives a one-off entry inserted slightly later.
//!
//! Requests with caching disabled never reach this module; the gateway
//! skips both the read and the write.
//!
//! Time is measured with `tokio::time::Instant` so TTL behaviour is
//! testable under a paused runtime clock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::telemetry;
use crate::types::GenerateResponse;

/// Configuration for the response cache.
///
/// ```rust
/// # use heimdallr::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 1,000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 5 minutes.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

struct Entry {
    response: GenerateResponse,
    inserted_at: Instant,
    last_access: Instant,
    hits: u64,
}

/// Bounded in-memory cache of settled responses.
pub struct ResponseCache {
    entries: Mutex<HashMap<u64, Entry>>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Look up a cached response.
    ///
    /// An entry past its TTL is removed and reported as a miss; a
    /// stale response is never returned. Hits bump the entry's access
    /// count and recency. Emits cache hit/miss metrics.
    pub fn get(&self, key: u64) -> Option<GenerateResponse> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            Some(entry) if now.duration_since(entry.inserted_at) <= self.config.ttl => {
                entry.hits += 1;
                entry.last_access = now;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(&key);
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Insert a response, evicting if at capacity.
    ///
    /// Eviction drops expired entries first; if still full, the entry
    /// with the lowest (hit count, last access) score goes.
    pub fn insert(&self, key: u64, response: GenerateResponse) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            entries.retain(|_, e| now.duration_since(e.inserted_at) <= self.config.ttl);
            if entries.len() >= self.config.max_entries {
                if let Some(victim) = entries
                    .iter()
                    .min_by_key(|(_, e)| (e.hits, e.last_access))
                    .map(|(k, _)| *k)
                {
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            key,
            Entry {
                response,
                inserted_at: now,
                last_access: now,
                hits: 0,
            },
        );
    }

    /// Number of entries currently stored, including not-yet-collected
    /// expired ones.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Compute the content-addressed key for a request.
///
/// Uses `DefaultHasher` (SipHash); deterministic within a process
/// lifetime, which is sufficient for an in-memory cache and dedup map.
/// Temperature participates via its bit pattern so 0.7 and 0.70001
/// hash differently.
pub fn cache_key(prompt: &str, context: Option<&str>, model: &str, temperature: f32) -> u64 {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    context.hash(&mut hasher);
    model.hash(&mut hasher);
    temperature.to_bits().hash(&mut hasher);
    hasher.finish()
}
