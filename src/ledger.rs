//! Persisted usage analytics.
//!
//! [`UsageLedger`] is an append-only record store with derived daily
//! aggregates, persisted through a [`KeyValueStore`] after every
//! mutation under fixed keys and reloaded at construction. Saves are
//! sequenced: a snapshot serialized earlier never overwrites one
//! serialized later, so the persisted blob tracks the newest state
//! even under concurrent mutations. Aggregates
//! are updated incrementally on each record, so
//! [`today_cost`](UsageLedger::today_cost) is cheap enough for the rate
//! limiter to consult on every admission.
//!
//! Retention: detailed records are pruned after 7 days, daily
//! aggregates after 30 (both configurable). [`spawn_pruner`]
//! (UsageLedger::spawn_pruner) runs the pruning pass hourly.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::store::KeyValueStore;
use crate::types::Usage;
use crate::Result;

/// Storage key for the detailed record list.
pub const RECORDS_KEY: &str = "heimdallr_usage_records";
/// Storage key for the daily aggregate list.
pub const DAILY_KEY: &str = "heimdallr_daily_usage";

/// One settled call, as remembered by the ledger. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Calling feature tag.
    pub component: String,
    /// Optional persona tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    pub usage: Usage,
    pub response_time_ms: u64,
    pub success: bool,
    /// Error description for failed calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageRecord {
    /// Create a successful record timestamped now.
    pub fn success(component: impl Into<String>, usage: Usage, response_time_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            component: component.into(),
            persona: None,
            usage,
            response_time_ms,
            success: true,
            error: None,
        }
    }

    /// Create a failed record timestamped now.
    pub fn failure(
        component: impl Into<String>,
        error: impl Into<String>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            component: component.into(),
            persona: None,
            usage: Usage::default(),
            response_time_ms,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Attach a persona tag.
    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }
}

/// Aggregate usage for one calendar date, derived incrementally from
/// that date's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// failures / total for this date.
    pub error_rate: f64,
}

impl DailyUsage {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_requests: 0,
            failed_requests: 0,
            total_tokens: 0,
            total_cost: 0.0,
            error_rate: 0.0,
        }
    }

    fn absorb(&mut self, record: &UsageRecord) {
        self.total_requests += 1;
        if !record.success {
            self.failed_requests += 1;
        }
        self.total_tokens += record.usage.total_tokens;
        self.total_cost += record.usage.estimated_cost;
        self.error_rate = self.failed_requests as f64 / self.total_requests as f64;
    }
}

/// Retention horizons for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Days of detailed records kept. Default: 7.
    pub detailed_retention_days: u64,
    /// Days of daily aggregates kept. Default: 30.
    pub daily_retention_days: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            detailed_retention_days: 7,
            daily_retention_days: 30,
        }
    }
}

impl LedgerConfig {
    /// Create a config with the default horizons.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the detailed record retention in days.
    pub fn detailed_retention_days(mut self, days: u64) -> Self {
        self.detailed_retention_days = days;
        self
    }

    /// Set the daily aggregate retention in days.
    pub fn daily_retention_days(mut self, days: u64) -> Self {
        self.daily_retention_days = days;
        self
    }
}

/// Request/token/cost totals over a trailing period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
}

/// A component and its request count, for the top-N ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCount {
    pub component: String,
    pub requests: u64,
}

/// Aggregated view returned by [`UsageLedger::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    /// Today's aggregate (zeroed when no calls were made today).
    pub today: DailyUsage,
    /// Rollup over the trailing 7 days, today included.
    pub last_7_days: PeriodTotals,
    /// Components ranked by request count, descending. At most 5.
    pub top_components: Vec<ComponentCount>,
    /// failures / total across all retained daily aggregates.
    pub error_rate: f64,
}

/// Serialized snapshot shape used by export and persistence.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    records: Vec<UsageRecord>,
    daily: Vec<DailyUsage>,
}

struct LedgerState {
    records: Vec<UsageRecord>,
    daily: BTreeMap<NaiveDate, DailyUsage>,
    /// Bumped on every mutation; snapshots carry the value they were
    /// serialized under so the save phase can refuse to roll the
    /// persisted state backwards.
    seq: u64,
}

impl LedgerState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records.clone(),
            daily: self.daily.values().cloned().collect(),
        }
    }
}

/// Append-only usage record store with daily aggregates.
pub struct UsageLedger {
    store: Arc<dyn KeyValueStore>,
    config: LedgerConfig,
    state: Mutex<LedgerState>,
    /// Sequence number of the last persisted snapshot. An async mutex:
    /// it is held across the store writes to keep them ordered.
    last_saved: tokio::sync::Mutex<u64>,
}

impl UsageLedger {
    /// Open the ledger, loading any persisted state from the store.
    pub async fn open(store: Arc<dyn KeyValueStore>, config: LedgerConfig) -> Result<Self> {
        let records: Vec<UsageRecord> = match store.load(RECORDS_KEY).await? {
            Some(blob) => serde_json::from_slice(&blob)?,
            None => Vec::new(),
        };
        let daily_list: Vec<DailyUsage> = match store.load(DAILY_KEY).await? {
            Some(blob) => serde_json::from_slice(&blob)?,
            None => Vec::new(),
        };
        let daily = daily_list.into_iter().map(|d| (d.date, d)).collect();
        Ok(Self {
            store,
            config,
            state: Mutex::new(LedgerState {
                records,
                daily,
                seq: 0,
            }),
            last_saved: tokio::sync::Mutex::new(0),
        })
    }

    /// Append a record, update its date's aggregate, and persist.
    pub async fn record(&self, record: UsageRecord) -> Result<()> {
        let (seq, records_blob, daily_blob) = {
            let mut state = self.state.lock();
            let date = record.timestamp.date_naive();
            state
                .daily
                .entry(date)
                .or_insert_with(|| DailyUsage::empty(date))
                .absorb(&record);
            state.records.push(record);
            state.seq += 1;
            let snapshot = state.snapshot();
            (
                state.seq,
                serde_json::to_vec(&snapshot.records)?,
                serde_json::to_vec(&snapshot.daily)?,
            )
        };
        self.persist(seq, records_blob, daily_blob).await
    }

    /// Write a serialized snapshot unless a newer one is already saved.
    ///
    /// Snapshots are serialized under the state lock, but the writes
    /// happen outside it; without the sequence check a slow older
    /// writer could land after a newer one and leave the persisted
    /// blob behind the in-memory state.
    async fn persist(&self, seq: u64, records_blob: Vec<u8>, daily_blob: Vec<u8>) -> Result<()> {
        let mut last_saved = self.last_saved.lock().await;
        if *last_saved >= seq {
            return Ok(());
        }
        self.store.save(RECORDS_KEY, &records_blob).await?;
        self.store.save(DAILY_KEY, &daily_blob).await?;
        *last_saved = seq;
        Ok(())
    }

    /// Running cost total for today, consulted by the rate limiter's
    /// daily budget.
    pub fn today_cost(&self) -> f64 {
        let today = Utc::now().date_naive();
        self.state
            .lock()
            .daily
            .get(&today)
            .map_or(0.0, |d| d.total_cost)
    }

    /// Aggregated statistics over the retained history.
    pub fn stats(&self) -> LedgerStats {
        let today = Utc::now().date_naive();
        let week_start = today - Days::new(6);
        let state = self.state.lock();

        let mut last_7_days = PeriodTotals::default();
        let mut failed = 0u64;
        let mut total = 0u64;
        for day in state.daily.values() {
            failed += day.failed_requests;
            total += day.total_requests;
            if day.date >= week_start {
                last_7_days.requests += day.total_requests;
                last_7_days.tokens += day.total_tokens;
                last_7_days.cost += day.total_cost;
            }
        }

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for record in &state.records {
            *counts.entry(record.component.as_str()).or_default() += 1;
        }
        let mut top_components: Vec<ComponentCount> = counts
            .into_iter()
            .map(|(component, requests)| ComponentCount {
                component: component.to_string(),
                requests,
            })
            .collect();
        top_components.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.component.cmp(&b.component)));
        top_components.truncate(5);

        LedgerStats {
            today: state
                .daily
                .get(&today)
                .cloned()
                .unwrap_or_else(|| DailyUsage::empty(today)),
            last_7_days,
            top_components,
            error_rate: if total > 0 {
                failed as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Daily aggregates for the trailing `days` dates, oldest first.
    pub fn daily_history(&self, days: u64) -> Vec<DailyUsage> {
        if days == 0 {
            return Vec::new();
        }
        let cutoff = Utc::now().date_naive() - Days::new(days - 1);
        self.state
            .lock()
            .daily
            .range(cutoff..)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Serialize the full ledger (records and aggregates) to JSON.
    pub fn export(&self) -> Result<String> {
        let snapshot = self.state.lock().snapshot();
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Drop all records and aggregates, in memory and in the store.
    pub async fn clear(&self) -> Result<()> {
        let seq = {
            let mut state = self.state.lock();
            state.records.clear();
            state.daily.clear();
            state.seq += 1;
            state.seq
        };
        let mut last_saved = self.last_saved.lock().await;
        if *last_saved >= seq {
            return Ok(());
        }
        self.store.remove(RECORDS_KEY).await?;
        self.store.remove(DAILY_KEY).await?;
        *last_saved = seq;
        Ok(())
    }

    /// Apply retention horizons and persist the trimmed state.
    pub async fn prune(&self) -> Result<()> {
        let now = Utc::now();
        let record_cutoff = now - chrono::Duration::days(self.config.detailed_retention_days as i64);
        let daily_cutoff = now.date_naive() - Days::new(self.config.daily_retention_days);
        let (seq, records_blob, daily_blob) = {
            let mut state = self.state.lock();
            state.records.retain(|r| r.timestamp >= record_cutoff);
            state.daily.retain(|date, _| *date >= daily_cutoff);
            state.seq += 1;
            let snapshot = state.snapshot();
            (
                state.seq,
                serde_json::to_vec(&snapshot.records)?,
                serde_json::to_vec(&snapshot.daily)?,
            )
        };
        self.persist(seq, records_blob, daily_blob).await
    }

    /// Spawn a background task pruning every `interval` (typically 1h).
    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                if let Err(e) = ledger.prune().await {
                    warn!(error = %e, "ledger prune failed");
                }
            }
        })
    }
}
