//! Timestamp-indexed battery history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BatteryError;
use crate::models::battery_hist_entry::{BatteryHistEntry, BatteryHistRecord};

/// Samples recorded at one timestamp, keyed by entity key.
pub type Bucket = BTreeMap<String, BatteryHistEntry>;

/// Ordered map of `timestamp -> (entity key -> sample)`.
///
/// Every sample in a non-empty bucket carries that bucket's timestamp. Empty
/// buckets are allowed and mark gaps in reconstructed history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatteryHistoryMap {
    buckets: BTreeMap<i64, Bucket>,
}

impl BatteryHistoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts stored rows into a history map, failing on the first
    /// invalid record.
    pub fn from_records<I>(records: I) -> Result<Self, BatteryError>
    where
        I: IntoIterator<Item = BatteryHistRecord>,
    {
        let mut map = Self::new();
        for record in records {
            map.insert(BatteryHistEntry::try_from(record)?)?;
        }
        Ok(map)
    }

    /// Adds a sample to the bucket at its own timestamp.
    pub fn insert(&mut self, entry: BatteryHistEntry) -> Result<(), BatteryError> {
        let bucket = self.buckets.entry(entry.timestamp).or_default();
        let key = entry.key();
        if bucket.contains_key(&key) {
            return Err(BatteryError::DuplicateEntity {
                bucket: entry.timestamp,
                key,
            });
        }
        bucket.insert(key, entry);
        Ok(())
    }

    /// Replaces the bucket at `timestamp`.
    pub fn insert_bucket(&mut self, timestamp: i64, bucket: Bucket) -> Result<(), BatteryError> {
        if let Some(entry) = bucket.values().find(|e| e.timestamp != timestamp) {
            return Err(BatteryError::TimestampMismatch {
                bucket: timestamp,
                sample: entry.timestamp,
            });
        }
        self.buckets.insert(timestamp, bucket);
        Ok(())
    }

    /// Marks `timestamp` as a gap.
    pub fn insert_empty(&mut self, timestamp: i64) {
        self.buckets.insert(timestamp, Bucket::new());
    }

    pub fn get(&self, timestamp: i64) -> Option<&Bucket> {
        self.buckets.get(&timestamp)
    }

    /// All timestamps in ascending order.
    pub fn timestamps(&self) -> Vec<i64> {
        self.buckets.keys().copied().collect()
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.buckets.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.buckets.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Bucket)> {
        self.buckets.iter().map(|(ts, bucket)| (*ts, bucket))
    }

    /// Timestamps within `[start, end]`, ascending.
    pub fn timestamps_in(&self, start: i64, end: i64) -> Vec<i64> {
        if start > end {
            return Vec::new();
        }
        self.buckets.range(start..=end).map(|(ts, _)| *ts).collect()
    }

    /// Drops buckets older than `window_ms` before the latest timestamp.
    pub fn retain_recent(&mut self, window_ms: i64) {
        if let Some(last) = self.last_timestamp() {
            let cutoff = last.saturating_sub(window_ms);
            self.buckets.retain(|ts, _| *ts >= cutoff);
        }
    }

    /// Rounded mean battery level of the bucket, `None` when the bucket is
    /// missing or empty.
    pub fn average_level(&self, timestamp: i64) -> Option<i32> {
        let bucket = self.buckets.get(&timestamp)?;
        if bucket.is_empty() {
            return None;
        }
        let sum: f64 = bucket.values().map(|e| f64::from(e.battery_level)).sum();
        Some((sum / bucket.len() as f64).round() as i32)
    }

    /// Per-timestamp average level for every bucket.
    pub fn level_map(&self) -> BTreeMap<i64, Option<i32>> {
        self.buckets
            .keys()
            .map(|ts| (*ts, self.average_level(*ts)))
            .collect()
    }
}

impl FromIterator<BatteryHistEntry> for BatteryHistoryMap {
    /// Collects samples, keeping the last one seen per entity and timestamp.
    fn from_iter<T: IntoIterator<Item = BatteryHistEntry>>(iter: T) -> Self {
        let mut map = Self::new();
        for entry in iter {
            map.buckets
                .entry(entry.timestamp)
                .or_default()
                .insert(entry.key(), entry);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::battery_hist_entry::test_support::app_entry;

    #[test]
    fn test_insert_groups_by_timestamp() {
        let mut map = BatteryHistoryMap::new();
        map.insert(app_entry(1, 2_000, 0, 0, 0.0)).unwrap();
        map.insert(app_entry(2, 2_000, 0, 0, 0.0)).unwrap();
        map.insert(app_entry(1, 1_000, 0, 0, 0.0)).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.timestamps(), vec![1_000, 2_000]);
        assert_eq!(map.get(2_000).unwrap().len(), 2);
        assert_eq!(map.first_timestamp(), Some(1_000));
        assert_eq!(map.last_timestamp(), Some(2_000));
    }

    #[test]
    fn test_insert_rejects_duplicate_entity() {
        let mut map = BatteryHistoryMap::new();
        map.insert(app_entry(1, 2_000, 0, 0, 0.0)).unwrap();
        let result = map.insert(app_entry(1, 2_000, 5, 0, 0.0));
        assert!(matches!(
            result,
            Err(BatteryError::DuplicateEntity { bucket: 2_000, .. })
        ));
    }

    #[test]
    fn test_insert_bucket_enforces_timestamp() {
        let mut map = BatteryHistoryMap::new();
        let entry = app_entry(1, 1_000, 0, 0, 0.0);
        let bucket: Bucket = [(entry.key(), entry)].into_iter().collect();

        let result = map.insert_bucket(2_000, bucket.clone());
        assert!(matches!(
            result,
            Err(BatteryError::TimestampMismatch {
                bucket: 2_000,
                sample: 1_000
            })
        ));
        assert!(map.insert_bucket(1_000, bucket).is_ok());
    }

    #[test]
    fn test_average_level() {
        let mut map = BatteryHistoryMap::new();
        let mut a = app_entry(1, 1_000, 0, 0, 0.0);
        a.battery_level = 50;
        let mut b = app_entry(2, 1_000, 0, 0, 0.0);
        b.battery_level = 51;
        map.insert(a).unwrap();
        map.insert(b).unwrap();
        map.insert_empty(2_000);

        assert_eq!(map.average_level(1_000), Some(51));
        assert_eq!(map.average_level(2_000), None);
        assert_eq!(map.average_level(3_000), None);
        let levels = map.level_map();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[&2_000], None);
    }

    #[test]
    fn test_timestamps_in_and_retain_recent() {
        let mut map: BatteryHistoryMap = (1..=5)
            .map(|i| app_entry(1, i * 1_000, 0, 0, 0.0))
            .collect();
        assert_eq!(map.timestamps_in(2_000, 4_000), vec![2_000, 3_000, 4_000]);
        assert!(map.timestamps_in(4_000, 2_000).is_empty());

        map.retain_recent(2_000);
        assert_eq!(map.timestamps(), vec![3_000, 4_000, 5_000]);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let map: BatteryHistoryMap = std::iter::once(app_entry(7, 1_000, 0, 0, 0.0)).collect();
        let json = serde_json::to_value(&map).unwrap();
        assert!(json["1000"]["7"].is_object());
        let back: BatteryHistoryMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}
