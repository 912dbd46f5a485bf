//! End-to-end battery usage computation.

use std::sync::Arc;

use chrono::TimeZone;

use crate::error::BatteryError;
use crate::models::battery_diff_data::AggregationContext;
use crate::models::battery_hist_entry::BatteryHistRecord;
use crate::models::battery_level_data::BatteryLevelData;
use crate::models::history_map::BatteryHistoryMap;
use crate::services::data_processor::{DataProcessor, ReconstructionStats};
use crate::services::entry_info_cache::EntryInfoCache;
use crate::services::usage_map::BatteryUsageMap;
use crate::services::usage_policy::PowerUsagePolicy;

/// Result of one computation over a raw history window.
#[derive(Debug, Clone, Default)]
pub struct BatteryUsageReport {
    /// `None` when the history is too short to chart.
    pub level_data: Option<BatteryLevelData>,
    pub usage_map: BatteryUsageMap,
    pub stats: ReconstructionStats,
    pub is_from_full_charge: bool,
    pub raw_timestamps: usize,
}

/// Reconstructs raw history, derives the level series and aggregates usage.
pub struct BatteryUsageEngine<Tz: TimeZone> {
    processor: DataProcessor<Tz>,
    policy: Arc<dyn PowerUsagePolicy>,
    cache: Arc<EntryInfoCache>,
}

impl<Tz: TimeZone> BatteryUsageEngine<Tz> {
    pub fn new(
        processor: DataProcessor<Tz>,
        policy: Arc<dyn PowerUsagePolicy>,
        cache: Arc<EntryInfoCache>,
    ) -> Self {
        Self {
            processor,
            policy,
            cache,
        }
    }

    pub fn processor(&self) -> &DataProcessor<Tz> {
        &self.processor
    }

    pub fn cache(&self) -> &Arc<EntryInfoCache> {
        &self.cache
    }

    pub fn compute(&self, raw: &BatteryHistoryMap) -> BatteryUsageReport {
        let reconstruction = self.processor.process_history(raw);
        let level_data = self.processor.level_data(&reconstruction.history);

        let usage_map = match &level_data {
            Some(level_data) => {
                let ctx = AggregationContext {
                    policy: self.policy.as_ref(),
                    cache: self.cache.as_ref(),
                };
                BatteryUsageMap::generate(&reconstruction.history, level_data, ctx)
            }
            None => {
                tracing::info!(raw_timestamps = raw.len(), "Not enough battery history to chart");
                BatteryUsageMap::default()
            }
        };

        BatteryUsageReport {
            level_data,
            usage_map,
            stats: reconstruction.stats,
            is_from_full_charge: reconstruction.is_from_full_charge,
            raw_timestamps: raw.len(),
        }
    }

    /// Validates stored rows and computes over them.
    pub fn compute_records<I>(&self, records: I) -> Result<BatteryUsageReport, BatteryError>
    where
        I: IntoIterator<Item = BatteryHistRecord>,
    {
        let raw = BatteryHistoryMap::from_records(records)?;
        Ok(self.compute(&raw))
    }
}
