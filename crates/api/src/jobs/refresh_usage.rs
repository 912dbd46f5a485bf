//! Background job that reloads history and republishes usage.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_refresh;
use crate::services::{
    ComputationOutcome, HistorySource, LatestUsage, UsageComputation, UsageEngine,
};

/// Periodically recomputes usage from a [`HistorySource`] and publishes the
/// result to [`LatestUsage`].
pub struct RefreshUsageJob {
    source: Arc<dyn HistorySource>,
    engine: Arc<UsageEngine>,
    latest: LatestUsage,
    window_ms: i64,
    interval_minutes: u64,
    shutdown: CancellationToken,
}

impl RefreshUsageJob {
    pub fn new(
        source: Arc<dyn HistorySource>,
        engine: Arc<UsageEngine>,
        latest: LatestUsage,
        window_ms: i64,
        interval_minutes: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            engine,
            latest,
            window_ms,
            interval_minutes,
            shutdown,
        }
    }

    /// Loads, computes and publishes once.
    pub async fn refresh(&self) -> Result<(), String> {
        let records = self.source.load().await.map_err(|e| e.to_string())?;

        let computation =
            UsageComputation::spawn_records(Arc::clone(&self.engine), records, Some(self.window_ms));
        let token = computation.cancellation_token();

        let outcome = tokio::select! {
            outcome = computation.join() => outcome.map_err(|e| e.to_string())?,
            _ = self.shutdown.cancelled() => {
                token.cancel();
                ComputationOutcome::Cancelled
            }
        };

        match outcome {
            ComputationOutcome::Completed(report) => {
                let raw_timestamps = report.raw_timestamps;
                self.latest.publish(report, self.source.name()).await;
                record_refresh(true, raw_timestamps);
                Ok(())
            }
            ComputationOutcome::Cancelled => {
                tracing::info!(source = %self.source.name(), "Usage refresh cancelled");
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl Job for RefreshUsageJob {
    fn name(&self) -> &'static str {
        "refresh_usage"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    fn run_on_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), String> {
        let result = self.refresh().await;
        if result.is_err() {
            record_refresh(false, 0);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history_source::HistorySourceError;
    use crate::services::StaticAppInfoResolver;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone, Utc};
    use domain::models::BatteryHistRecord;
    use shared::time_slots::DeviceTimeZone;
    use domain::services::{
        BatteryUsageEngine, DataProcessor, EntryInfoCache, InterpolationThresholds, UsagePolicy,
    };

    struct FixedSource {
        records: Option<Vec<BatteryHistRecord>>,
    }

    #[async_trait]
    impl HistorySource for FixedSource {
        fn name(&self) -> String {
            "fixed".to_string()
        }

        async fn load(&self) -> Result<Vec<BatteryHistRecord>, HistorySourceError> {
            self.records.clone().ok_or_else(|| HistorySourceError::Io {
                path: "fixed".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            })
        }
    }

    fn engine() -> Arc<UsageEngine> {
        Arc::new(BatteryUsageEngine::new(
            DataProcessor::new(
                DeviceTimeZone::Fixed(FixedOffset::east_opt(0).unwrap()),
                InterpolationThresholds::default(),
            ),
            Arc::new(UsagePolicy::default()),
            Arc::new(EntryInfoCache::new(Arc::new(StaticAppInfoResolver::default()))),
        ))
    }

    fn record(hour: u32, level: i32, power: f64) -> BatteryHistRecord {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 7, 1, hour, 10, 0)
            .unwrap()
            .timestamp_millis();
        serde_json::from_value(serde_json::json!({
            "componentId": 0,
            "consumerType": 3,
            "timestamp": timestamp,
            "bootTimestamp": 86_400_000,
            "batteryLevel": level,
            "consumePower": power
        }))
        .unwrap()
    }

    fn job(records: Option<Vec<BatteryHistRecord>>, latest: LatestUsage) -> RefreshUsageJob {
        RefreshUsageJob::new(
            Arc::new(FixedSource { records }),
            engine(),
            latest,
            6 * 86_400_000,
            60,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_refresh_publishes_report() {
        let latest = LatestUsage::new();
        let job = job(Some(vec![record(1, 90, 0.0), record(9, 70, 5.0)]), latest.clone());

        job.execute().await.unwrap();

        let snapshot = latest.get().await.unwrap();
        assert_eq!(snapshot.source, "fixed");
        assert!(snapshot.report.level_data.is_some());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_snapshot() {
        let latest = LatestUsage::new();
        let result = job(None, latest.clone()).execute().await;
        assert!(result.unwrap_err().contains("gone"));
        assert!(latest.get().await.is_none());
    }

    #[test]
    fn test_job_schedule() {
        let job = job(Some(Vec::new()), LatestUsage::new());
        assert_eq!(job.name(), "refresh_usage");
        assert_eq!(job.frequency(), JobFrequency::Minutes(60));
        assert!(job.run_on_start());
    }
}
