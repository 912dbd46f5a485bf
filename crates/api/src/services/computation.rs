//! Cancellable usage computation and the published latest result.
//!
//! The engine is synchronous, so each run executes on the blocking pool.
//! Cancelling a run detaches the worker and discards whatever it produces.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::models::{BatteryHistRecord, BatteryHistoryMap};
use domain::services::{BatteryUsageEngine, BatteryUsageReport};
use domain::BatteryError;
use shared::time_slots::DeviceTimeZone;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::middleware::metrics::record_usage_computation;

/// Engine slotting in the device's calendar.
pub type UsageEngine = BatteryUsageEngine<DeviceTimeZone>;

#[derive(Debug, Error)]
pub enum ComputationError {
    #[error(transparent)]
    Battery(#[from] BatteryError),

    #[error("Computation worker failed: {0}")]
    Worker(String),
}

/// How a computation ended.
#[derive(Debug)]
pub enum ComputationOutcome {
    Completed(BatteryUsageReport),
    Cancelled,
}

/// Input handed to the worker.
enum ComputationInput {
    History(BatteryHistoryMap),
    Records(Vec<BatteryHistRecord>),
}

/// Handle to one in-flight computation.
pub struct UsageComputation {
    token: CancellationToken,
    handle: JoinHandle<Result<BatteryUsageReport, BatteryError>>,
}

impl UsageComputation {
    /// Computes over an already assembled history map.
    pub fn spawn(engine: Arc<UsageEngine>, raw: BatteryHistoryMap) -> Self {
        Self::start(engine, ComputationInput::History(raw), None)
    }

    /// Validates stored rows, keeps the last `window_ms` of history and
    /// computes over it.
    pub fn spawn_records(
        engine: Arc<UsageEngine>,
        records: Vec<BatteryHistRecord>,
        window_ms: Option<i64>,
    ) -> Self {
        Self::start(engine, ComputationInput::Records(records), window_ms)
    }

    fn start(engine: Arc<UsageEngine>, input: ComputationInput, window_ms: Option<i64>) -> Self {
        let token = CancellationToken::new();
        let worker_token = token.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let mut raw = match input {
                ComputationInput::History(raw) => raw,
                ComputationInput::Records(records) => BatteryHistoryMap::from_records(records)?,
            };
            if let Some(window_ms) = window_ms {
                raw.retain_recent(window_ms);
            }
            if worker_token.is_cancelled() {
                tracing::debug!("Computation cancelled before start");
                return Ok(BatteryUsageReport::default());
            }

            let report = engine.compute(&raw);
            record_usage_computation(&report.stats, started.elapsed().as_secs_f64());
            tracing::info!(
                raw_timestamps = report.raw_timestamps,
                slots = report.stats.slots.len(),
                gaps = report.stats.gaps(),
                resets = report.stats.resets(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Battery usage computed"
            );
            Ok(report)
        });

        Self { token, handle }
    }

    /// Requests cancellation. The handle then resolves to
    /// [`ComputationOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn join(self) -> Result<ComputationOutcome, ComputationError> {
        let Self { token, mut handle } = self;
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                handle.abort();
                Ok(ComputationOutcome::Cancelled)
            }
            joined = &mut handle => {
                if token.is_cancelled() {
                    return Ok(ComputationOutcome::Cancelled);
                }
                let report = joined.map_err(|e| ComputationError::Worker(e.to_string()))??;
                Ok(ComputationOutcome::Completed(report))
            }
        }
    }
}

/// A computed report and when it was produced.
#[derive(Debug)]
pub struct UsageSnapshot {
    pub report: BatteryUsageReport,
    pub computed_at: DateTime<Utc>,
    pub source: String,
}

/// Most recent published snapshot, shared between jobs and handlers.
#[derive(Debug, Clone, Default)]
pub struct LatestUsage {
    inner: Arc<RwLock<Option<Arc<UsageSnapshot>>>>,
}

impl LatestUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, report: BatteryUsageReport, source: impl Into<String>) {
        let snapshot = UsageSnapshot {
            report,
            computed_at: Utc::now(),
            source: source.into(),
        };
        *self.inner.write().await = Some(Arc::new(snapshot));
    }

    pub async fn get(&self) -> Option<Arc<UsageSnapshot>> {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::models::{BatteryHistEntry, BatteryStatus, BatteryHealth, Consumer};
    use domain::services::{
        DataProcessor, EntryInfoCache, InterpolationThresholds, UsagePolicy,
    };
    use crate::services::app_info::StaticAppInfoResolver;

    fn engine() -> Arc<UsageEngine> {
        let tz = DeviceTimeZone::Fixed(chrono::FixedOffset::east_opt(0).unwrap());
        Arc::new(BatteryUsageEngine::new(
            DataProcessor::new(tz, InterpolationThresholds::default()),
            Arc::new(UsagePolicy::default()),
            Arc::new(EntryInfoCache::new(Arc::new(StaticAppInfoResolver::default()))),
        ))
    }

    fn entry(timestamp: i64, level: i32, fg_ms: i64, power: f64) -> BatteryHistEntry {
        BatteryHistEntry {
            consumer: Consumer::System {
                component_id: 0,
                label: None,
            },
            boot_timestamp: 24 * 3_600_000,
            timestamp,
            total_power: 0.0,
            consume_power: power,
            foreground_usage_consume_power: power,
            foreground_service_usage_consume_power: 0.0,
            background_usage_consume_power: 0.0,
            cached_usage_consume_power: 0.0,
            percent_of_total: 0.0,
            foreground_usage_time_ms: fg_ms,
            foreground_service_usage_time_ms: 0,
            background_usage_time_ms: 0,
            battery_level: level,
            battery_status: BatteryStatus::Discharging,
            battery_health: BatteryHealth::Good,
        }
    }

    fn history() -> BatteryHistoryMap {
        let ts = |hour| {
            Utc.with_ymd_and_hms(2024, 7, 1, hour, 10, 0)
                .unwrap()
                .timestamp_millis()
        };
        vec![entry(ts(1), 90, 0, 0.0), entry(ts(9), 70, 600_000, 12.0)]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_computation_completes() {
        let outcome = UsageComputation::spawn(engine(), history()).join().await.unwrap();
        match outcome {
            ComputationOutcome::Completed(report) => {
                assert!(report.level_data.is_some());
                assert_eq!(report.raw_timestamps, 2);
            }
            ComputationOutcome::Cancelled => panic!("Expected a completed computation"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_computation_resolves_to_cancelled() {
        let computation = UsageComputation::spawn(engine(), history());
        computation.cancel();
        assert!(computation.is_cancelled());
        let outcome = computation.join().await.unwrap();
        assert!(matches!(outcome, ComputationOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_invalid_records_fail() {
        let record: BatteryHistRecord = serde_json::from_value(serde_json::json!({
            "consumerType": 1,
            "timestamp": 1_700_000_000_000i64,
            "bootTimestamp": 0,
            "batteryLevel": 150
        }))
        .unwrap();
        let result = UsageComputation::spawn_records(engine(), vec![record], None)
            .join()
            .await;
        assert!(matches!(result, Err(ComputationError::Battery(_))));
    }

    #[tokio::test]
    async fn test_latest_usage_publish() {
        let latest = LatestUsage::new();
        assert!(latest.get().await.is_none());

        latest
            .publish(BatteryUsageReport::default(), "unit-test")
            .await;
        let snapshot = latest.get().await.unwrap();
        assert_eq!(snapshot.source, "unit-test");
        assert!(snapshot.report.level_data.is_none());
    }
}
