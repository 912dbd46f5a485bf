//! Per-entity usage contribution within one time slot.

use std::sync::OnceLock;

use serde::Serialize;

use crate::models::battery_hist_entry::Consumer;
use crate::services::entry_info_cache::EntryInfoCache;

/// Key of the merged system-apps bucket.
pub const SYSTEM_APPS_KEY: &str = "A|SystemApps";
/// Key of the merged uninstalled-apps bucket.
pub const UNINSTALLED_APPS_KEY: &str = "A|UninstalledApps";
/// Key of the merged "others" system bucket.
pub const OTHERS_KEY: &str = "S|Others";

/// Sorting key of the uninstalled-apps and others buckets.
pub const OTHERS_SORTING_KEY: f64 = -1.0;
/// Sorting key of the system-apps bucket.
pub const SYSTEM_APPS_SORTING_KEY: f64 = -2.0;

/// Resolved display label and icon reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NameAndIcon {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// What a diff entry represents: one entity or a merged bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffEntryKind {
    Entity(Consumer),
    SystemApps,
    UninstalledApps,
    Others,
}

/// Percentage of `total` that `consume_power` represents; zero when `total`
/// is zero.
pub fn compute_percentage(consume_power: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        consume_power / total * 100.0
    }
}

/// One entity's power and usage contribution to a slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryDiffEntry {
    pub kind: DiffEntryKind,
    pub foreground_usage_time_ms: i64,
    pub foreground_service_usage_time_ms: i64,
    pub background_usage_time_ms: i64,
    pub screen_on_time_ms: i64,
    pub consume_power: f64,
    pub foreground_usage_consume_power: f64,
    pub foreground_service_usage_consume_power: f64,
    pub background_usage_consume_power: f64,
    pub cached_usage_consume_power: f64,
    total_consume_power: f64,
    percentage: f64,
    adjust_percentage_offset: i32,
    #[serde(skip)]
    name_and_icon: OnceLock<NameAndIcon>,
    #[serde(skip)]
    valid_for_restriction: OnceLock<bool>,
}

impl BatteryDiffEntry {
    /// Creates an all-zero entry of the given kind.
    pub fn new(kind: DiffEntryKind) -> Self {
        Self {
            kind,
            foreground_usage_time_ms: 0,
            foreground_service_usage_time_ms: 0,
            background_usage_time_ms: 0,
            screen_on_time_ms: 0,
            consume_power: 0.0,
            foreground_usage_consume_power: 0.0,
            foreground_service_usage_consume_power: 0.0,
            background_usage_consume_power: 0.0,
            cached_usage_consume_power: 0.0,
            total_consume_power: 0.0,
            percentage: 0.0,
            adjust_percentage_offset: 0,
            name_and_icon: OnceLock::new(),
            valid_for_restriction: OnceLock::new(),
        }
    }

    pub fn for_consumer(consumer: Consumer) -> Self {
        Self::new(DiffEntryKind::Entity(consumer))
    }

    pub fn key(&self) -> String {
        match &self.kind {
            DiffEntryKind::Entity(consumer) => consumer.key(),
            DiffEntryKind::SystemApps => SYSTEM_APPS_KEY.to_string(),
            DiffEntryKind::UninstalledApps => UNINSTALLED_APPS_KEY.to_string(),
            DiffEntryKind::Others => OTHERS_KEY.to_string(),
        }
    }

    pub fn consumer(&self) -> Option<&Consumer> {
        match &self.kind {
            DiffEntryKind::Entity(consumer) => Some(consumer),
            _ => None,
        }
    }

    /// Returns the entry with percentage recomputed against `total` and the
    /// rounding offset cleared.
    pub fn with_total_consume_power(self, total: f64) -> Self {
        Self {
            percentage: compute_percentage(self.consume_power, total),
            total_consume_power: total,
            adjust_percentage_offset: 0,
            ..self
        }
    }

    pub(crate) fn set_adjust_percentage_offset(&mut self, offset: i32) {
        self.adjust_percentage_offset = offset;
    }

    pub fn total_consume_power(&self) -> f64 {
        self.total_consume_power
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    pub fn adjust_percentage_offset(&self) -> i32 {
        self.adjust_percentage_offset
    }

    /// Displayed percentage after rounding reconciliation.
    pub fn rounded_percentage(&self) -> i64 {
        (self.percentage + f64::from(self.adjust_percentage_offset)).round() as i64
    }

    /// Rank for display; merged buckets use fixed negative keys.
    pub fn sorting_key(&self) -> f64 {
        match self.kind {
            DiffEntryKind::SystemApps => SYSTEM_APPS_SORTING_KEY,
            DiffEntryKind::UninstalledApps | DiffEntryKind::Others => OTHERS_SORTING_KEY,
            DiffEntryKind::Entity(_) => self.percentage + f64::from(self.adjust_percentage_offset),
        }
    }

    /// User profiles, system components and the others bucket.
    pub fn is_system_entry(&self) -> bool {
        match &self.kind {
            DiffEntryKind::Entity(Consumer::Uid { .. })
            | DiffEntryKind::SystemApps
            | DiffEntryKind::UninstalledApps => false,
            DiffEntryKind::Entity(_) | DiffEntryKind::Others => true,
        }
    }

    /// Whether the entry belongs in the system list rather than the app list.
    pub fn is_system_component(&self) -> bool {
        matches!(
            self.kind,
            DiffEntryKind::Entity(Consumer::System { .. }) | DiffEntryKind::Others
        )
    }

    pub fn uid(&self) -> Option<i64> {
        match &self.kind {
            DiffEntryKind::Entity(Consumer::Uid { uid, .. }) => Some(*uid),
            _ => None,
        }
    }

    pub fn component_id(&self) -> Option<i32> {
        match &self.kind {
            DiffEntryKind::Entity(Consumer::System { component_id, .. }) => Some(*component_id),
            _ => None,
        }
    }

    /// Package name without any process suffix.
    pub fn package_name(&self) -> Option<&str> {
        self.consumer().and_then(Consumer::package_name)
    }

    /// Label recorded with the sample, if any.
    pub fn recorded_label(&self) -> Option<&str> {
        match &self.kind {
            DiffEntryKind::Entity(Consumer::Uid { app_label, .. }) => app_label.as_deref(),
            DiffEntryKind::Entity(Consumer::System { label, .. }) => label.as_deref(),
            _ => None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(
            self.kind,
            DiffEntryKind::Entity(Consumer::Uid {
                is_hidden: true,
                ..
            })
        )
    }

    /// An app whose package no longer resolves to an installed uid. Always
    /// false when the cache has no complete app catalog.
    pub fn is_uninstalled_entry(&self, cache: &EntryInfoCache) -> bool {
        if !cache.knows_installed_apps() {
            return false;
        }
        match (self.uid(), self.package_name()) {
            (Some(uid), Some(package)) if uid != 0 && !package.is_empty() => {
                cache.package_uid(package).is_none()
            }
            _ => false,
        }
    }

    pub fn app_label(&self, cache: &EntryInfoCache) -> String {
        self.name_and_icon(cache).name.clone()
    }

    pub fn app_icon(&self, cache: &EntryInfoCache) -> Option<String> {
        self.name_and_icon(cache).icon.clone()
    }

    /// Whether the entry can be opened for drill-down and restriction.
    pub fn is_valid_for_restriction(&self, cache: &EntryInfoCache) -> bool {
        *self
            .valid_for_restriction
            .get_or_init(|| cache.is_valid_for_restriction(self))
    }

    fn name_and_icon(&self, cache: &EntryInfoCache) -> &NameAndIcon {
        self.name_and_icon.get_or_init(|| cache.name_and_icon(self))
    }

    /// Adds another entry's usage and power into this one.
    pub(crate) fn accumulate(&mut self, other: &BatteryDiffEntry) {
        self.foreground_usage_time_ms += other.foreground_usage_time_ms;
        self.foreground_service_usage_time_ms += other.foreground_service_usage_time_ms;
        self.background_usage_time_ms += other.background_usage_time_ms;
        self.screen_on_time_ms += other.screen_on_time_ms;
        self.consume_power += other.consume_power;
        self.foreground_usage_consume_power += other.foreground_usage_consume_power;
        self.foreground_service_usage_consume_power += other.foreground_service_usage_consume_power;
        self.background_usage_consume_power += other.background_usage_consume_power;
        self.cached_usage_consume_power += other.cached_usage_consume_power;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{app, system};
    use super::*;

    #[test]
    fn test_compute_percentage() {
        assert_eq!(compute_percentage(25.0, 100.0), 25.0);
        assert_eq!(compute_percentage(25.0, 0.0), 0.0);
    }

    #[test]
    fn test_with_total_consume_power_resets_offset() {
        let mut entry = app(1, 30.0);
        entry.set_adjust_percentage_offset(1);
        let entry = entry.with_total_consume_power(120.0);
        assert_eq!(entry.percentage(), 25.0);
        assert_eq!(entry.total_consume_power(), 120.0);
        assert_eq!(entry.adjust_percentage_offset(), 0);
    }

    #[test]
    fn test_sorting_key() {
        let mut entry = app(1, 33.0).with_total_consume_power(100.0);
        entry.set_adjust_percentage_offset(1);
        assert_eq!(entry.sorting_key(), 34.0);
        assert_eq!(entry.rounded_percentage(), 34);

        let system_apps = BatteryDiffEntry::new(DiffEntryKind::SystemApps);
        let uninstalled = BatteryDiffEntry::new(DiffEntryKind::UninstalledApps);
        let others = BatteryDiffEntry::new(DiffEntryKind::Others);
        assert!(uninstalled.sorting_key() > system_apps.sorting_key());
        assert!(others.sorting_key() > system_apps.sorting_key());
        assert!(app(2, 0.0).sorting_key() > others.sorting_key());
    }

    #[test]
    fn test_keys() {
        assert_eq!(app(10123, 0.0).key(), "10123");
        assert_eq!(system(3, 0.0).key(), "S|3");
        assert_eq!(BatteryDiffEntry::new(DiffEntryKind::SystemApps).key(), SYSTEM_APPS_KEY);
        assert_eq!(
            BatteryDiffEntry::new(DiffEntryKind::UninstalledApps).key(),
            UNINSTALLED_APPS_KEY
        );
        assert_eq!(BatteryDiffEntry::new(DiffEntryKind::Others).key(), OTHERS_KEY);
    }

    #[test]
    fn test_system_entry_classification() {
        assert!(!app(1, 0.0).is_system_entry());
        assert!(system(1, 0.0).is_system_entry());
        assert!(BatteryDiffEntry::for_consumer(Consumer::User { user_id: 10 }).is_system_entry());
        assert!(BatteryDiffEntry::new(DiffEntryKind::Others).is_system_entry());
        assert!(!BatteryDiffEntry::new(DiffEntryKind::SystemApps).is_system_entry());

        assert!(system(1, 0.0).is_system_component());
        assert!(!BatteryDiffEntry::for_consumer(Consumer::User { user_id: 10 }).is_system_component());
    }

    #[test]
    fn test_accumulate() {
        let mut total = app(1, 10.0);
        let other = app(1, 5.0);
        total.accumulate(&other);
        assert_eq!(total.consume_power, 15.0);
        assert_eq!(total.foreground_usage_time_ms, 120_000);
    }
}
