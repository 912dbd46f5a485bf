//! Domain models for the battery usage engine.

pub mod battery_diff_data;
pub mod battery_diff_entry;
pub mod battery_hist_entry;
pub mod battery_level_data;
pub mod history_map;

pub use battery_diff_data::{process_and_sort_entries, AggregationContext, BatteryDiffData, SlotMetadata};
pub use battery_diff_entry::{BatteryDiffEntry, DiffEntryKind, NameAndIcon};
pub use battery_hist_entry::{
    BatteryHealth, BatteryHistEntry, BatteryHistRecord, BatteryStatus, Consumer, ConsumerType,
};
pub use battery_level_data::{BatteryLevelData, HighlightIndex, PeriodBatteryLevelData};
pub use history_map::{BatteryHistoryMap, Bucket};
