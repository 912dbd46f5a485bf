//! Policy hooks for usage aggregation.
//!
//! Purge thresholds and the entity sets that decide which entries are hidden
//! or merged into the system-apps and others buckets.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Custom power components are numbered from this id upwards.
pub const FIRST_CUSTOM_POWER_COMPONENT_ID: i32 = 1000;

/// Policy consulted while aggregating one slot's usage.
pub trait PowerUsagePolicy: Send + Sync {
    /// Entries with less screen-on time than this (and less power than
    /// [`Self::consume_power_threshold`]) are purged.
    fn screen_on_time_threshold_ms(&self) -> f64;

    fn consume_power_threshold(&self) -> f64;

    fn is_hidden_component(&self, component_id: i32) -> bool;

    fn is_hidden_package(&self, package_name: &str) -> bool;

    /// Packages whose background usage time is not shown.
    fn hides_background_usage(&self, package_name: &str) -> bool;

    fn is_system_app_allowlisted(&self, package_name: &str) -> bool;

    fn is_system_package(&self, package_name: &str) -> bool;

    fn is_system_uid(&self, uid: i64) -> bool;

    fn is_others_component(&self, component_id: i32) -> bool;

    fn is_others_custom_component_name(&self, label: &str) -> bool;
}

/// Set-backed policy, loadable from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsagePolicy {
    pub screen_on_time_threshold_ms: f64,
    pub consume_power_threshold: f64,
    pub hide_system_components: HashSet<i32>,
    pub hide_applications: HashSet<String>,
    pub hide_background_usage: HashSet<String>,
    pub system_apps_allowlist: HashSet<String>,
    pub system_app_packages: HashSet<String>,
    pub system_app_uids: HashSet<i64>,
    pub others_system_components: HashSet<i32>,
    pub others_custom_component_names: HashSet<String>,
}

impl PowerUsagePolicy for UsagePolicy {
    fn screen_on_time_threshold_ms(&self) -> f64 {
        self.screen_on_time_threshold_ms
    }

    fn consume_power_threshold(&self) -> f64 {
        self.consume_power_threshold
    }

    fn is_hidden_component(&self, component_id: i32) -> bool {
        self.hide_system_components.contains(&component_id)
    }

    fn is_hidden_package(&self, package_name: &str) -> bool {
        self.hide_applications.contains(package_name)
    }

    fn hides_background_usage(&self, package_name: &str) -> bool {
        self.hide_background_usage.contains(package_name)
    }

    fn is_system_app_allowlisted(&self, package_name: &str) -> bool {
        self.system_apps_allowlist.contains(package_name)
    }

    fn is_system_package(&self, package_name: &str) -> bool {
        self.system_app_packages.contains(package_name)
    }

    fn is_system_uid(&self, uid: i64) -> bool {
        self.system_app_uids.contains(&uid)
    }

    fn is_others_component(&self, component_id: i32) -> bool {
        self.others_system_components.contains(&component_id)
    }

    fn is_others_custom_component_name(&self, label: &str) -> bool {
        self.others_custom_component_names.contains(label)
    }
}
