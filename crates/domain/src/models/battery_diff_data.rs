//! Aggregated usage of one time slot.
//!
//! Construction purges negligible and hidden entries, merges entries into
//! the system-apps, uninstalled-apps and others buckets, and normalizes each
//! list so the displayed percentages add up to 100. Accumulated snapshots
//! (built from already aggregated slots) skip purging and merging.

use serde::Serialize;

use crate::models::battery_diff_entry::{BatteryDiffEntry, DiffEntryKind};
use crate::models::battery_hist_entry::FAKE_PACKAGE_NAME;
use crate::services::entry_info_cache::EntryInfoCache;
use crate::services::usage_policy::{PowerUsagePolicy, FIRST_CUSTOM_POWER_COMPONENT_ID};

/// Time range and battery levels of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMetadata {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub start_battery_level: Option<i32>,
    pub end_battery_level: Option<i32>,
    pub screen_on_time_ms: i64,
}

/// Collaborators consulted while aggregating a slot.
#[derive(Clone, Copy)]
pub struct AggregationContext<'a> {
    pub policy: &'a dyn PowerUsagePolicy,
    pub cache: &'a EntryInfoCache,
}

/// App and system usage for one slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryDiffData {
    #[serde(flatten)]
    metadata: SlotMetadata,
    app_entries: Vec<BatteryDiffEntry>,
    system_entries: Vec<BatteryDiffEntry>,
    is_accumulated: bool,
}

impl BatteryDiffData {
    pub fn new(
        metadata: SlotMetadata,
        app_entries: Vec<BatteryDiffEntry>,
        system_entries: Vec<BatteryDiffEntry>,
        ctx: AggregationContext<'_>,
        is_accumulated: bool,
    ) -> Self {
        let mut app_entries = app_entries;
        let mut system_entries = system_entries;

        if !is_accumulated {
            purge_entries(&mut app_entries, ctx.policy);
            purge_entries(&mut system_entries, ctx.policy);
            combine_into_uninstalled_apps(&mut app_entries, ctx.cache);
            combine_into_system_apps(&mut app_entries, ctx.policy);
            combine_into_others(&mut system_entries, ctx);
        }

        Self {
            metadata,
            app_entries: process_and_sort_entries(app_entries),
            system_entries: process_and_sort_entries(system_entries),
            is_accumulated,
        }
    }

    pub fn metadata(&self) -> &SlotMetadata {
        &self.metadata
    }

    pub fn start_timestamp(&self) -> i64 {
        self.metadata.start_timestamp
    }

    pub fn end_timestamp(&self) -> i64 {
        self.metadata.end_timestamp
    }

    pub fn start_battery_level(&self) -> Option<i32> {
        self.metadata.start_battery_level
    }

    pub fn end_battery_level(&self) -> Option<i32> {
        self.metadata.end_battery_level
    }

    pub fn screen_on_time_ms(&self) -> i64 {
        self.metadata.screen_on_time_ms
    }

    pub fn app_diff_entry_list(&self) -> &[BatteryDiffEntry] {
        &self.app_entries
    }

    pub fn system_diff_entry_list(&self) -> &[BatteryDiffEntry] {
        &self.system_entries
    }

    pub fn is_accumulated(&self) -> bool {
        self.is_accumulated
    }

    pub fn is_empty(&self) -> bool {
        self.app_entries.is_empty() && self.system_entries.is_empty()
    }
}

/// Drops negligible, placeholder and hidden entries and clears background
/// usage for packages that hide it.
fn purge_entries(entries: &mut Vec<BatteryDiffEntry>, policy: &dyn PowerUsagePolicy) {
    let screen_on_threshold = policy.screen_on_time_threshold_ms();
    let power_threshold = policy.consume_power_threshold();
    let before = entries.len();

    entries.retain(|entry| {
        let screen_on_time_ms = if entry.is_system_entry() {
            entry.foreground_usage_time_ms
        } else {
            entry.screen_on_time_ms
        };
        let package_name = entry.package_name();

        let negligible = (screen_on_time_ms as f64) < screen_on_threshold
            && entry.consume_power < power_threshold;
        let hidden = package_name == Some(FAKE_PACKAGE_NAME)
            || entry
                .component_id()
                .is_some_and(|id| policy.is_hidden_component(id))
            || package_name.is_some_and(|name| policy.is_hidden_package(name));
        !(negligible || hidden)
    });

    for entry in entries.iter_mut() {
        if entry
            .package_name()
            .is_some_and(|name| policy.hides_background_usage(name))
        {
            entry.background_usage_time_ms = 0;
        }
    }

    if entries.len() != before {
        tracing::debug!(purged = before - entries.len(), "Purged diff entries");
    }
}

/// Moves every entry matching `belongs` into one merged entry of `kind`,
/// appended at the end of the list.
fn combine_into(
    entries: &mut Vec<BatteryDiffEntry>,
    kind: DiffEntryKind,
    belongs: impl Fn(&BatteryDiffEntry) -> bool,
) {
    let mut merged: Option<BatteryDiffEntry> = None;
    let mut kept = Vec::with_capacity(entries.len());

    for entry in entries.drain(..) {
        if belongs(&entry) {
            let bucket = merged.get_or_insert_with(|| BatteryDiffEntry::new(kind.clone()));
            bucket.consume_power += entry.consume_power;
            bucket.foreground_usage_time_ms += entry.foreground_usage_time_ms;
        } else {
            kept.push(entry);
        }
    }

    kept.extend(merged);
    *entries = kept;
}

fn combine_into_uninstalled_apps(entries: &mut Vec<BatteryDiffEntry>, cache: &EntryInfoCache) {
    combine_into(entries, DiffEntryKind::UninstalledApps, |entry| {
        entry.is_uninstalled_entry(cache)
    });
}

fn combine_into_system_apps(entries: &mut Vec<BatteryDiffEntry>, policy: &dyn PowerUsagePolicy) {
    combine_into(entries, DiffEntryKind::SystemApps, |entry| {
        if !matches!(entry.kind, DiffEntryKind::Entity(_)) {
            return false;
        }
        entry.is_hidden()
            || entry.package_name().is_some_and(|name| {
                policy.is_system_app_allowlisted(name) || policy.is_system_package(name)
            })
            || entry.uid().is_some_and(|uid| policy.is_system_uid(uid))
    });
}

fn combine_into_others(entries: &mut Vec<BatteryDiffEntry>, ctx: AggregationContext<'_>) {
    combine_into(entries, DiffEntryKind::Others, |entry| {
        entry.component_id().is_some_and(|id| {
            ctx.policy.is_others_component(id)
                || (id >= FIRST_CUSTOM_POWER_COMPONENT_ID
                    && ctx
                        .policy
                        .is_others_custom_component_name(&entry.app_label(ctx.cache)))
        })
    });
}

/// Sets every entry's percentage against the list total, reconciles rounding
/// so the displayed percentages sum to 100, and sorts by sorting key,
/// highest first.
pub fn process_and_sort_entries(entries: Vec<BatteryDiffEntry>) -> Vec<BatteryDiffEntry> {
    if entries.is_empty() {
        return entries;
    }

    let total: f64 = entries.iter().map(|e| e.consume_power).sum();
    let mut entries: Vec<BatteryDiffEntry> = entries
        .into_iter()
        .map(|e| e.with_total_consume_power(total))
        .collect();

    let (mut lower_bound, mut upper_bound) = (0i64, 0i64);
    for entry in &entries {
        let percentage = entry.percentage();
        if percentage < 1.0 {
            upper_bound += 1;
        } else {
            let rounded = percentage.round() as i64;
            lower_bound += rounded;
            upper_bound += rounded;
        }
    }

    if lower_bound > 100 || upper_bound < 100 {
        sort_by_sorting_key(&mut entries);
        let decrease = usize::try_from(lower_bound - 100).unwrap_or(0);
        for entry in entries.iter_mut().take(decrease) {
            entry.set_adjust_percentage_offset(-1);
        }
        let increase = usize::try_from(100 - upper_bound).unwrap_or(0);
        for entry in entries.iter_mut().take(increase) {
            entry.set_adjust_percentage_offset(1);
        }
        tracing::debug!(lower_bound, upper_bound, "Adjusted percentage rounding");
    }

    sort_by_sorting_key(&mut entries);
    entries
}

fn sort_by_sorting_key(entries: &mut [BatteryDiffEntry]) {
    entries.sort_by(|a, b| b.sorting_key().total_cmp(&a.sorting_key()));
}
