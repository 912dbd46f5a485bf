//! Daily and hourly battery level series.

use std::collections::BTreeMap;

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use shared::time_slots::{next_day_boundary, next_even_hour, HOUR_IN_MILLIS};

use crate::models::history_map::BatteryHistoryMap;

/// Width of one hourly display slot.
pub const HOURLY_SLOT_MILLIS: i64 = 2 * HOUR_IN_MILLIS;

/// Timestamps and their battery levels for one period. A level is `None`
/// when no sample was available for that timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBatteryLevelData {
    timestamps: Vec<i64>,
    levels: Vec<Option<i32>>,
}

impl PeriodBatteryLevelData {
    /// Looks up each timestamp in `level_map`.
    pub fn new(level_map: &BTreeMap<i64, Option<i32>>, timestamps: Vec<i64>) -> Self {
        let levels = timestamps
            .iter()
            .map(|ts| level_map.get(ts).copied().flatten())
            .collect();
        Self { timestamps, levels }
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn levels(&self) -> &[Option<i32>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Index `i` of the interval with `timestamps[i] <= start` and
    /// `end <= timestamps[i + 1]`.
    fn index_of(&self, start: i64, end: i64) -> Option<usize> {
        self.timestamps
            .windows(2)
            .position(|pair| pair[0] <= start && end <= pair[1])
    }
}

/// Slot selection for a highlighted time range. `None` means nothing is
/// highlighted at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightIndex {
    pub daily: Option<usize>,
    pub hourly: Option<usize>,
}

/// Two-level battery level series: one daily period plus one hourly period
/// per daily interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryLevelData {
    daily_battery_levels: PeriodBatteryLevelData,
    hourly_battery_levels_per_day: Vec<PeriodBatteryLevelData>,
}

impl BatteryLevelData {
    /// Builds the series from per-timestamp levels. Returns `None` when fewer
    /// than two timestamps are available.
    pub fn new<Tz: TimeZone>(level_map: &BTreeMap<i64, Option<i32>>, tz: &Tz) -> Option<Self> {
        if level_map.len() < 2 {
            return None;
        }
        let timestamps: Vec<i64> = level_map.keys().copied().collect();
        let daily = daily_timestamps(&timestamps, tz)?;
        let hourly = hourly_timestamps(&daily, tz)
            .into_iter()
            .map(|per_day| PeriodBatteryLevelData::new(level_map, per_day))
            .collect();

        Some(Self {
            daily_battery_levels: PeriodBatteryLevelData::new(level_map, daily),
            hourly_battery_levels_per_day: hourly,
        })
    }

    /// Builds the series from reconstructed hourly history, averaging each
    /// bucket's levels.
    pub fn from_processed_history<Tz: TimeZone>(history: &BatteryHistoryMap, tz: &Tz) -> Option<Self> {
        Self::new(&history.level_map(), tz)
    }

    pub fn daily_battery_levels(&self) -> &PeriodBatteryLevelData {
        &self.daily_battery_levels
    }

    pub fn hourly_battery_levels_per_day(&self) -> &[PeriodBatteryLevelData] {
        &self.hourly_battery_levels_per_day
    }

    /// Maps a time range onto the daily slot containing it and, within that
    /// day, the hourly slot containing it.
    pub fn index_by_timestamps(&self, start: i64, end: i64) -> HighlightIndex {
        let daily = self.daily_battery_levels.index_of(start, end);
        let hourly = daily.and_then(|day| {
            self.hourly_battery_levels_per_day
                .get(day)
                .and_then(|period| period.index_of(start, end))
        });
        HighlightIndex { daily, hourly }
    }
}

/// `[start, each local midnight in (start, end), end]`, or `None` when the
/// input spans no time.
pub fn daily_timestamps<Tz: TimeZone>(timestamps: &[i64], tz: &Tz) -> Option<Vec<i64>> {
    let (&start, &end) = (timestamps.first()?, timestamps.last()?);
    if start >= end {
        return None;
    }
    let mut daily = vec![start];
    let mut boundary = next_day_boundary(tz, start);
    while boundary < end && boundary > *daily.last()? {
        daily.push(boundary);
        boundary = next_day_boundary(tz, boundary);
    }
    daily.push(end);
    Some(daily)
}

/// For each consecutive pair of daily timestamps: the day start, each
/// two-hour step from the next even hour while before the day end, and the
/// day end.
pub fn hourly_timestamps<Tz: TimeZone>(daily: &[i64], tz: &Tz) -> Vec<Vec<i64>> {
    daily
        .windows(2)
        .map(|pair| {
            let (start, end) = (pair[0], pair[1]);
            let mut hourly = vec![start];
            let mut slot = next_even_hour(tz, start);
            while slot < end && slot > start {
                hourly.push(slot);
                slot += HOURLY_SLOT_MILLIS;
            }
            hourly.push(end);
            hourly
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn ts(day: u32, hour: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn hourly_levels(start: i64, end: i64) -> BTreeMap<i64, Option<i32>> {
        let mut level = 100;
        let mut map = BTreeMap::new();
        let mut t = start;
        while t <= end {
            map.insert(t, Some(level));
            level -= 1;
            t += HOUR_IN_MILLIS;
        }
        map
    }

    #[test]
    fn test_requires_two_timestamps() {
        let mut map = BTreeMap::new();
        assert!(BatteryLevelData::new(&map, &Utc).is_none());
        map.insert(ts(1, 2), Some(90));
        assert!(BatteryLevelData::new(&map, &Utc).is_none());
        map.insert(ts(1, 4), Some(80));
        assert!(BatteryLevelData::new(&map, &Utc).is_some());
    }

    #[test]
    fn test_single_day_series() {
        let data = BatteryLevelData::new(&hourly_levels(ts(1, 2), ts(1, 14)), &Utc).unwrap();

        assert_eq!(data.daily_battery_levels().timestamps(), &[ts(1, 2), ts(1, 14)]);
        assert_eq!(data.daily_battery_levels().levels(), &[Some(100), Some(88)]);
        assert_eq!(data.hourly_battery_levels_per_day().len(), 1);
        assert_eq!(
            data.hourly_battery_levels_per_day()[0].timestamps(),
            &[ts(1, 2), ts(1, 4), ts(1, 6), ts(1, 8), ts(1, 10), ts(1, 12), ts(1, 14)]
        );
    }

    #[test]
    fn test_multi_day_series() {
        let data = BatteryLevelData::new(&hourly_levels(ts(1, 20), ts(3, 4)), &Utc).unwrap();

        assert_eq!(
            data.daily_battery_levels().timestamps(),
            &[ts(1, 20), ts(2, 0), ts(3, 0), ts(3, 4)]
        );
        let hourly = data.hourly_battery_levels_per_day();
        assert_eq!(hourly.len(), data.daily_battery_levels().len() - 1);
        assert_eq!(hourly[0].timestamps(), &[ts(1, 20), ts(1, 22), ts(2, 0)]);
        assert_eq!(hourly[1].len(), 13);
        assert_eq!(hourly[2].timestamps(), &[ts(3, 0), ts(3, 2), ts(3, 4)]);
    }

    #[test]
    fn test_unknown_levels() {
        let mut map = hourly_levels(ts(1, 2), ts(1, 6));
        map.insert(ts(1, 4), None);
        let data = BatteryLevelData::new(&map, &Utc).unwrap();
        assert_eq!(
            data.hourly_battery_levels_per_day()[0].levels(),
            &[Some(100), None, Some(96)]
        );
    }

    #[test]
    fn test_daily_timestamps_use_local_midnight() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // Local midnight of the 2nd in UTC+2 is 22:00 UTC on the 1st.
        let daily = daily_timestamps(&[ts(1, 12), ts(2, 6)], &tz).unwrap();
        assert_eq!(daily, vec![ts(1, 12), ts(1, 22), ts(2, 6)]);
    }

    #[test]
    fn test_hourly_timestamps_from_odd_start() {
        let start = ts(1, 1) + 10 * 60 * 1000;
        let hourly = hourly_timestamps(&[start, ts(1, 7)], &Utc);
        assert_eq!(hourly, vec![vec![start, ts(1, 2), ts(1, 4), ts(1, 6), ts(1, 7)]]);
    }

    #[test]
    fn test_index_by_timestamps() {
        let data = BatteryLevelData::new(&hourly_levels(ts(1, 20), ts(3, 4)), &Utc).unwrap();

        assert_eq!(
            data.index_by_timestamps(ts(2, 4), ts(2, 6)),
            HighlightIndex {
                daily: Some(1),
                hourly: Some(2)
            }
        );
        assert_eq!(
            data.index_by_timestamps(ts(2, 3), ts(2, 6)),
            HighlightIndex {
                daily: Some(1),
                hourly: None
            }
        );
        assert_eq!(
            data.index_by_timestamps(ts(1, 22), ts(2, 2)),
            HighlightIndex::default()
        );
    }

    #[test]
    fn test_index_lookup_is_sound() {
        let data = BatteryLevelData::new(&hourly_levels(ts(1, 20), ts(3, 4)), &Utc).unwrap();
        let daily = data.daily_battery_levels().timestamps();
        for start in (ts(1, 18)..ts(3, 6)).step_by(HOUR_IN_MILLIS as usize) {
            let end = start + HOUR_IN_MILLIS;
            if let Some(i) = data.index_by_timestamps(start, end).daily {
                assert!(daily[i] <= start && end <= daily[i + 1]);
            }
        }
    }
}
