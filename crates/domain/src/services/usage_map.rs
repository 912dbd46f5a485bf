//! Per-slot usage diffs and the daily/hourly usage map.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::battery_diff_data::{AggregationContext, BatteryDiffData, SlotMetadata};
use crate::models::battery_diff_entry::BatteryDiffEntry;
use crate::models::battery_hist_entry::BatteryHistEntry;
use crate::models::battery_level_data::BatteryLevelData;
use crate::models::history_map::BatteryHistoryMap;

/// Selects one slot by index or every slot at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSelector {
    All,
    Index(usize),
}

impl From<Option<usize>> for SlotSelector {
    fn from(index: Option<usize>) -> Self {
        index.map_or(SlotSelector::All, SlotSelector::Index)
    }
}

impl std::fmt::Display for SlotSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotSelector::All => write!(f, "all"),
            SlotSelector::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Raw usage diffs of one slot, before aggregation.
#[derive(Debug, Clone, Default)]
pub struct SlotUsage {
    pub app_entries: Vec<BatteryDiffEntry>,
    pub system_entries: Vec<BatteryDiffEntry>,
    pub screen_on_time_ms: i64,
}

fn increment<T: PartialOrd + std::ops::Sub<Output = T> + Default>(previous: T, current: T) -> T {
    if current > previous {
        current - previous
    } else {
        T::default()
    }
}

fn add_increment(diff: &mut BatteryDiffEntry, previous: Option<&BatteryHistEntry>, current: &BatteryHistEntry) {
    let prev_ms = |pick: fn(&BatteryHistEntry) -> i64| previous.map_or(0, pick);
    let prev_power = |pick: fn(&BatteryHistEntry) -> f64| previous.map_or(0.0, pick);

    diff.foreground_usage_time_ms += increment(
        prev_ms(|e| e.foreground_usage_time_ms),
        current.foreground_usage_time_ms,
    );
    diff.foreground_service_usage_time_ms += increment(
        prev_ms(|e| e.foreground_service_usage_time_ms),
        current.foreground_service_usage_time_ms,
    );
    diff.background_usage_time_ms += increment(
        prev_ms(|e| e.background_usage_time_ms),
        current.background_usage_time_ms,
    );
    diff.consume_power += increment(prev_power(|e| e.consume_power), current.consume_power);
    diff.foreground_usage_consume_power += increment(
        prev_power(|e| e.foreground_usage_consume_power),
        current.foreground_usage_consume_power,
    );
    diff.foreground_service_usage_consume_power += increment(
        prev_power(|e| e.foreground_service_usage_consume_power),
        current.foreground_service_usage_consume_power,
    );
    diff.background_usage_consume_power += increment(
        prev_power(|e| e.background_usage_consume_power),
        current.background_usage_consume_power,
    );
    diff.cached_usage_consume_power += increment(
        prev_power(|e| e.cached_usage_consume_power),
        current.cached_usage_consume_power,
    );
}

fn scale(entry: &mut BatteryDiffEntry, ratio: f64) {
    let scale_ms = |ms: i64| (ms as f64 * ratio).round() as i64;
    entry.foreground_usage_time_ms = scale_ms(entry.foreground_usage_time_ms);
    entry.foreground_service_usage_time_ms = scale_ms(entry.foreground_service_usage_time_ms);
    entry.background_usage_time_ms = scale_ms(entry.background_usage_time_ms);
    entry.consume_power *= ratio;
    entry.foreground_usage_consume_power *= ratio;
    entry.foreground_service_usage_consume_power *= ratio;
    entry.background_usage_consume_power *= ratio;
    entry.cached_usage_consume_power *= ratio;
}

/// Sums each entity's positive increments between consecutive buckets
/// within `[start, end]`.
///
/// Pairs starting at an empty bucket are skipped. Entities without any usage
/// are dropped, and usage longer than the slot is scaled down to fit it.
pub fn compute_slot_usage(history: &BatteryHistoryMap, start: i64, end: i64) -> SlotUsage {
    let timestamps = history.timestamps_in(start, end);
    let mut diffs: BTreeMap<String, BatteryDiffEntry> = BTreeMap::new();

    for pair in timestamps.windows(2) {
        let (Some(previous), Some(current)) = (history.get(pair[0]), history.get(pair[1])) else {
            continue;
        };
        if previous.is_empty() {
            continue;
        }
        for (key, entry) in current {
            let diff = diffs
                .entry(key.clone())
                .or_insert_with(|| BatteryDiffEntry::for_consumer(entry.consumer.clone()));
            add_increment(diff, previous.get(key), entry);
        }
    }

    let duration = end - start;
    let mut usage = SlotUsage::default();
    for (key, mut entry) in diffs {
        if entry.foreground_usage_time_ms == 0
            && entry.background_usage_time_ms == 0
            && entry.consume_power == 0.0
        {
            continue;
        }

        let total_time = entry.foreground_usage_time_ms + entry.background_usage_time_ms;
        if duration > 0 && total_time > duration {
            tracing::warn!(
                key = %key,
                total_time,
                duration,
                "Usage time exceeds slot duration, scaling down"
            );
            scale(&mut entry, duration as f64 / total_time as f64);
        }

        if entry.is_system_component() {
            usage.system_entries.push(entry);
        } else {
            if entry.uid().is_some() {
                entry.screen_on_time_ms = entry.foreground_usage_time_ms;
                usage.screen_on_time_ms += entry.foreground_usage_time_ms;
            }
            usage.app_entries.push(entry);
        }
    }
    usage.screen_on_time_ms = usage.screen_on_time_ms.min(duration.max(0));
    usage
}

/// Merges already aggregated slots into one accumulated slot.
fn accumulate<'a>(
    slots: impl IntoIterator<Item = &'a BatteryDiffData>,
    ctx: AggregationContext<'_>,
) -> Option<BatteryDiffData> {
    let mut metadata: Option<SlotMetadata> = None;
    let mut apps: BTreeMap<String, BatteryDiffEntry> = BTreeMap::new();
    let mut systems: BTreeMap<String, BatteryDiffEntry> = BTreeMap::new();

    for slot in slots {
        let meta = slot.metadata();
        match metadata.as_mut() {
            None => metadata = Some(*meta),
            Some(merged) => {
                merged.end_timestamp = meta.end_timestamp;
                merged.end_battery_level = meta.end_battery_level;
                merged.screen_on_time_ms += meta.screen_on_time_ms;
            }
        }
        for (target, entries) in [
            (&mut apps, slot.app_diff_entry_list()),
            (&mut systems, slot.system_diff_entry_list()),
        ] {
            for entry in entries {
                target
                    .entry(entry.key())
                    .and_modify(|merged| merged.accumulate(entry))
                    .or_insert_with(|| entry.clone());
            }
        }
    }

    metadata.map(|metadata| {
        BatteryDiffData::new(
            metadata,
            apps.into_values().collect(),
            systems.into_values().collect(),
            ctx,
            true,
        )
    })
}

/// Aggregated usage for every hourly slot, every day and the whole range.
#[derive(Debug, Clone, Default)]
pub struct BatteryUsageMap {
    slots: HashMap<(SlotSelector, SlotSelector), BatteryDiffData>,
}

impl BatteryUsageMap {
    /// Builds the map over the slots of `level_data`, using usage from the
    /// reconstructed `history`.
    pub fn generate(
        history: &BatteryHistoryMap,
        level_data: &BatteryLevelData,
        ctx: AggregationContext<'_>,
    ) -> Self {
        let mut slots = HashMap::new();

        for (day, period) in level_data.hourly_battery_levels_per_day().iter().enumerate() {
            let timestamps = period.timestamps();
            let levels = period.levels();
            for hour in 0..timestamps.len().saturating_sub(1) {
                let (start, end) = (timestamps[hour], timestamps[hour + 1]);
                let usage = compute_slot_usage(history, start, end);
                let metadata = SlotMetadata {
                    start_timestamp: start,
                    end_timestamp: end,
                    start_battery_level: levels[hour],
                    end_battery_level: levels[hour + 1],
                    screen_on_time_ms: usage.screen_on_time_ms,
                };
                let data = BatteryDiffData::new(
                    metadata,
                    usage.app_entries,
                    usage.system_entries,
                    ctx,
                    false,
                );
                slots.insert((SlotSelector::Index(day), SlotSelector::Index(hour)), data);
            }
        }

        let days = level_data.hourly_battery_levels_per_day().len();
        for day in 0..days {
            let hourly: Vec<&BatteryDiffData> = (0..)
                .map_while(|hour| slots.get(&(SlotSelector::Index(day), SlotSelector::Index(hour))))
                .collect();
            if let Some(data) = accumulate(hourly, ctx) {
                slots.insert((SlotSelector::Index(day), SlotSelector::All), data);
            }
        }

        let daily: Vec<&BatteryDiffData> = (0..days)
            .filter_map(|day| slots.get(&(SlotSelector::Index(day), SlotSelector::All)))
            .collect();
        if let Some(data) = accumulate(daily, ctx) {
            slots.insert((SlotSelector::All, SlotSelector::All), data);
        }

        tracing::debug!(slots = slots.len(), days, "Generated battery usage map");
        Self { slots }
    }

    pub fn get(&self, daily: SlotSelector, hourly: SlotSelector) -> Option<&BatteryDiffData> {
        self.slots.get(&(daily, hourly))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
