//! Battery history reconstruction.
//!
//! Raw samples arrive at irregular times: the collector runs on a
//! best-effort schedule, the device may reboot, and counters may reset. This
//! service maps the raw history onto the expected hourly slots between the
//! nearest even hours around the first and last raw sample:
//!
//! 1. The first slot copies the first raw bucket when the history starts
//!    from a full charge or the raw data starts after the first slot.
//! 2. A slot within the snap threshold before a raw sample takes that
//!    sample as is.
//! 3. A slot with a raw sample on both sides is interpolated entity by
//!    entity, unless the device rebooted in between.
//! 4. Anything else becomes an empty bucket, reported as an unknown level.

use std::collections::BTreeMap;

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use shared::time_slots::{nearest_even_hour, Rounding, HOUR_IN_MILLIS, MINUTE_IN_MILLIS, SECOND_IN_MILLIS};

use crate::models::battery_hist_entry::BatteryHistEntry;
use crate::models::battery_level_data::BatteryLevelData;
use crate::models::history_map::{BatteryHistoryMap, Bucket};

/// Distances that decide between snapping and interpolating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationThresholds {
    /// A raw sample closer than this after a slot is used for the slot as is.
    pub snap_to_upper_ms: i64,
    /// Across a reboot, a raw sample closer than this after a slot is used
    /// for the slot; further samples leave the slot empty.
    pub reboot_force_align_ms: i64,
}

impl Default for InterpolationThresholds {
    fn default() -> Self {
        Self {
            snap_to_upper_ms: 5 * SECOND_IN_MILLIS,
            reboot_force_align_ms: 10 * MINUTE_IN_MILLIS,
        }
    }
}

/// Why a slot was left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// No raw sample after the slot yet.
    SchedulerDelayed,
    /// No raw sample before the slot.
    NoLowerBound,
    /// The device rebooted between the surrounding samples.
    DifferentBootSession,
}

/// How a reconstructed slot was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SlotKind {
    /// First slot copied from the first raw bucket.
    Copied,
    /// Raw bucket within the snap threshold.
    Snapped,
    /// Raw bucket after a reboot, within the reboot threshold.
    ForceAligned,
    /// Interpolated; `resets` entities took the upper sample after a counter
    /// reset.
    Interpolated { resets: usize },
    Gap { reason: GapReason },
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotKind::Copied => write!(f, "copied"),
            SlotKind::Snapped => write!(f, "snapped"),
            SlotKind::ForceAligned => write!(f, "force_aligned"),
            SlotKind::Interpolated { .. } => write!(f, "interpolated"),
            SlotKind::Gap { .. } => write!(f, "gap"),
        }
    }
}

/// Per-slot outcome of a reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructionStats {
    pub slots: BTreeMap<i64, SlotKind>,
}

impl ReconstructionStats {
    /// Number of slots per fill kind, keyed by the kind's display name.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.slots.values() {
            *counts.entry(kind.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn gaps(&self) -> usize {
        self.slots
            .values()
            .filter(|kind| matches!(kind, SlotKind::Gap { .. }))
            .count()
    }

    /// Entities that took the upper sample after a counter reset.
    pub fn resets(&self) -> usize {
        self.slots
            .values()
            .map(|kind| match kind {
                SlotKind::Interpolated { resets } => *resets,
                _ => 0,
            })
            .sum()
    }
}

/// Reconstructed hourly history.
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub history: BatteryHistoryMap,
    pub stats: ReconstructionStats,
    pub is_from_full_charge: bool,
}

/// Latest raw timestamp `<= target` and earliest raw timestamp `>= target`.
pub fn find_nearest_timestamps(timestamps: &[i64], target: i64) -> (Option<i64>, Option<i64>) {
    let mut lower = None;
    let mut upper = None;
    for &ts in timestamps {
        if ts <= target && lower.map_or(true, |l| ts > l) {
            lower = Some(ts);
        }
        if ts >= target && upper.map_or(true, |u| ts < u) {
            upper = Some(ts);
        }
    }
    (lower, upper)
}

/// Whether the bucket at `timestamp` was recorded while fully charged. All
/// samples in a bucket share the device state, so the first one decides.
pub fn is_from_full_charge(history: &BatteryHistoryMap, timestamp: i64) -> bool {
    history
        .get(timestamp)
        .and_then(|bucket| bucket.values().next())
        .is_some_and(BatteryHistEntry::is_charged)
}

fn restamp(bucket: &Bucket, timestamp: i64) -> Bucket {
    bucket
        .iter()
        .map(|(key, entry)| (key.clone(), entry.restamped(timestamp)))
        .collect()
}

/// Reconstructs raw history into hourly slots in the device's time zone.
#[derive(Debug, Clone)]
pub struct DataProcessor<Tz: TimeZone> {
    tz: Tz,
    thresholds: InterpolationThresholds,
}

impl<Tz: TimeZone> DataProcessor<Tz> {
    pub fn new(tz: Tz, thresholds: InterpolationThresholds) -> Self {
        Self { tz, thresholds }
    }

    pub fn time_zone(&self) -> &Tz {
        &self.tz
    }

    pub fn thresholds(&self) -> InterpolationThresholds {
        self.thresholds
    }

    /// Hourly slots from the even hour nearest above `raw_start` to the even
    /// hour at or below `raw_end`, inclusive. Empty when that range is empty.
    pub fn expected_timestamp_slots(&self, raw_start: i64, raw_end: i64) -> Vec<i64> {
        let start = nearest_even_hour(&self.tz, raw_start, Rounding::Up);
        let end = nearest_even_hour(&self.tz, raw_end, Rounding::Down);
        if start >= end {
            return Vec::new();
        }
        (0..)
            .map(|i| start + i * HOUR_IN_MILLIS)
            .take_while(|slot| *slot <= end)
            .collect()
    }

    /// Maps `raw` onto the expected hourly slots.
    pub fn process_history(&self, raw: &BatteryHistoryMap) -> Reconstruction {
        let raw_timestamps = raw.timestamps();
        let (Some(&raw_start), Some(&raw_end)) = (raw_timestamps.first(), raw_timestamps.last()) else {
            return Reconstruction::default();
        };

        let expected = self.expected_timestamp_slots(raw_start, raw_end);
        let from_full_charge = is_from_full_charge(raw, raw_start);
        let mut result = Reconstruction {
            is_from_full_charge: from_full_charge,
            ..Default::default()
        };
        let Some(&first_slot) = expected.first() else {
            tracing::debug!(raw_start, raw_end, "Raw history spans no expected slot");
            return result;
        };

        let mut remaining = &expected[..];
        if from_full_charge || first_slot < raw_start {
            let bucket = raw.get(raw_start).map(|b| restamp(b, first_slot)).unwrap_or_default();
            self.put(&mut result, first_slot, bucket, SlotKind::Copied);
            remaining = &expected[1..];
        }

        for &slot in remaining {
            let (bucket, kind) = self.reconstruct_slot(raw, &raw_timestamps, slot);
            self.put(&mut result, slot, bucket, kind);
        }

        tracing::debug!(
            slots = result.history.len(),
            gaps = result.stats.gaps(),
            resets = result.stats.resets(),
            from_full_charge,
            "Reconstructed battery history"
        );
        result
    }

    /// Level series for reconstructed history.
    pub fn level_data(&self, processed: &BatteryHistoryMap) -> Option<BatteryLevelData> {
        BatteryLevelData::from_processed_history(processed, &self.tz)
    }

    fn put(&self, result: &mut Reconstruction, slot: i64, bucket: Bucket, kind: SlotKind) {
        // Every bucket is restamped to its slot above.
        if let Err(error) = result.history.insert_bucket(slot, bucket) {
            tracing::warn!(slot, %error, "Reconstructed bucket rejected, leaving slot empty");
            result.history.insert_empty(slot);
        }
        result.stats.slots.insert(slot, kind);
    }

    fn reconstruct_slot(&self, raw: &BatteryHistoryMap, raw_timestamps: &[i64], slot: i64) -> (Bucket, SlotKind) {
        let (lower, upper) = find_nearest_timestamps(raw_timestamps, slot);

        let Some(upper_ts) = upper else {
            tracing::warn!(slot, "No raw data after slot, collection may be delayed");
            return (Bucket::new(), SlotKind::Gap { reason: GapReason::SchedulerDelayed });
        };
        let upper_bucket = raw.get(upper_ts).cloned().unwrap_or_default();

        if upper_ts == slot || upper_ts - slot < self.thresholds.snap_to_upper_ms {
            tracing::debug!(slot, upper_ts, "Snapping slot to raw data");
            return (restamp(&upper_bucket, slot), SlotKind::Snapped);
        }

        let Some(lower_ts) = lower else {
            tracing::debug!(slot, upper_ts, "No raw data before slot");
            return (Bucket::new(), SlotKind::Gap { reason: GapReason::NoLowerBound });
        };
        let lower_bucket = raw.get(lower_ts).cloned().unwrap_or_default();

        if let Some(boot_anchor) = upper_bucket.values().next().map(BatteryHistEntry::boot_anchor) {
            if lower_ts < boot_anchor {
                if upper_ts - slot < self.thresholds.reboot_force_align_ms {
                    tracing::debug!(slot, upper_ts, boot_anchor, "Aligning slot to data after reboot");
                    return (restamp(&upper_bucket, slot), SlotKind::ForceAligned);
                }
                tracing::debug!(slot, lower_ts, boot_anchor, "Device rebooted between samples");
                return (
                    Bucket::new(),
                    SlotKind::Gap {
                        reason: GapReason::DifferentBootSession,
                    },
                );
            }
        }

        let ratio = (slot - lower_ts) as f64 / (upper_ts - lower_ts) as f64;
        let mut resets = 0;
        let bucket = upper_bucket
            .iter()
            .map(|(key, upper_entry)| {
                let lower_entry = lower_bucket.get(key);
                let reset = lower_entry.is_some_and(|lower_entry| {
                    upper_entry.foreground_usage_time_ms < lower_entry.foreground_usage_time_ms
                        || upper_entry.background_usage_time_ms < lower_entry.background_usage_time_ms
                });
                let entry = if reset {
                    resets += 1;
                    tracing::warn!(slot, key = %key, "Usage time decreased, using later sample");
                    upper_entry.restamped(slot)
                } else {
                    BatteryHistEntry::interpolate(slot, upper_ts, ratio, lower_entry, upper_entry)
                };
                (key.clone(), entry)
            })
            .collect();

        (bucket, SlotKind::Interpolated { resets })
    }
}
