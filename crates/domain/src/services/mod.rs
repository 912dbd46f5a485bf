//! Domain services for the battery usage engine.
//!
//! Services reconstruct raw history into hourly slots and aggregate usage
//! per slot, day and overall.

pub mod battery_usage;
pub mod data_processor;
pub mod entry_info_cache;
pub mod usage_map;
pub mod usage_policy;

pub use battery_usage::{BatteryUsageEngine, BatteryUsageReport};
pub use data_processor::{
    find_nearest_timestamps, is_from_full_charge, DataProcessor, GapReason, InterpolationThresholds,
    Reconstruction, ReconstructionStats, SlotKind,
};
pub use entry_info_cache::{AppInfoResolver, EntryInfoCache};
pub use usage_map::{compute_slot_usage, BatteryUsageMap, SlotSelector, SlotUsage};
pub use usage_policy::{PowerUsagePolicy, UsagePolicy, FIRST_CUSTOM_POWER_COMPONENT_ID};
