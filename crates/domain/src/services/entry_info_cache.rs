//! Shared label, icon and restriction-eligibility cache for diff entries.
//!
//! Lookups go through an [`AppInfoResolver`] at most once per entity key and
//! locale. Changing the locale drops every cached value.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::battery_diff_entry::{
    BatteryDiffEntry, DiffEntryKind, NameAndIcon, OTHERS_KEY, SYSTEM_APPS_KEY, UNINSTALLED_APPS_KEY,
};
use crate::models::battery_hist_entry::Consumer;

lazy_static::lazy_static! {
    static ref SPECIAL_LABELS: HashMap<&'static str, &'static str> = HashMap::from([
        (SYSTEM_APPS_KEY, "System apps"),
        (UNINSTALLED_APPS_KEY, "Removed apps"),
        (OTHERS_KEY, "Others"),
    ]);
}

/// Source of installed-app metadata.
pub trait AppInfoResolver: Send + Sync {
    /// Label and icon for an entity, `None` when unknown.
    fn resolve_name_and_icon(&self, consumer: &Consumer) -> Option<NameAndIcon>;

    /// Whether the app may be opened for drill-down and restriction.
    fn is_valid_for_restriction(&self, consumer: &Consumer) -> bool;

    /// Installed uid of a package, `None` when not installed.
    fn package_uid(&self, package_name: &str) -> Option<i64>;

    /// Whether [`package_uid`](Self::package_uid) covers every installed
    /// package. Without a complete catalog no app is reported as uninstalled.
    fn knows_installed_apps(&self) -> bool {
        true
    }
}

/// Process-wide cache of resolved entry metadata.
pub struct EntryInfoCache {
    resolver: Arc<dyn AppInfoResolver>,
    locale: Mutex<Option<String>>,
    names: Mutex<HashMap<String, NameAndIcon>>,
    restrictions: Mutex<HashMap<String, bool>>,
}

impl std::fmt::Debug for EntryInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryInfoCache")
            .field("locale", &self.locale)
            .field("names", &self.cached_names())
            .finish_non_exhaustive()
    }
}

impl EntryInfoCache {
    pub fn new(resolver: Arc<dyn AppInfoResolver>) -> Self {
        Self {
            resolver,
            locale: Mutex::new(None),
            names: Mutex::new(HashMap::new()),
            restrictions: Mutex::new(HashMap::new()),
        }
    }

    /// Clears all cached values when `locale` differs from the last one seen.
    /// Returns whether the cache was cleared.
    pub fn invalidate_on_locale_change(&self, locale: &str) -> bool {
        let mut current = self.locale.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() == Some(locale) {
            return false;
        }
        let changed = current.is_some();
        *current = Some(locale.to_string());
        drop(current);

        if changed {
            self.clear();
            tracing::info!(locale = %locale, "Locale changed, entry info cache cleared");
        }
        changed
    }

    pub fn clear(&self) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.restrictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn locale(&self) -> Option<String> {
        self.locale
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of cached labels.
    pub fn cached_names(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn package_uid(&self, package_name: &str) -> Option<i64> {
        self.resolver.package_uid(package_name)
    }

    pub fn knows_installed_apps(&self) -> bool {
        self.resolver.knows_installed_apps()
    }

    pub fn name_and_icon(&self, entry: &BatteryDiffEntry) -> NameAndIcon {
        let key = entry.key();
        if let Some(label) = SPECIAL_LABELS.get(key.as_str()) {
            return NameAndIcon {
                name: (*label).to_string(),
                icon: None,
            };
        }

        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = names.get(&key) {
            return cached.clone();
        }
        let resolved = self.resolve(entry);
        names.insert(key, resolved.clone());
        resolved
    }

    pub fn is_valid_for_restriction(&self, entry: &BatteryDiffEntry) -> bool {
        let consumer = match &entry.kind {
            DiffEntryKind::Entity(consumer @ Consumer::Uid { .. }) => consumer,
            _ => return false,
        };
        let mut restrictions = self
            .restrictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *restrictions
            .entry(entry.key())
            .or_insert_with(|| self.resolver.is_valid_for_restriction(consumer))
    }

    fn resolve(&self, entry: &BatteryDiffEntry) -> NameAndIcon {
        let Some(consumer) = entry.consumer() else {
            return NameAndIcon::default();
        };
        if let Some(resolved) = self.resolver.resolve_name_and_icon(consumer) {
            return resolved;
        }

        let name = match consumer {
            Consumer::Uid { uid, .. } => entry
                .recorded_label()
                .or_else(|| entry.package_name())
                .map(str::to_string)
                .unwrap_or_else(|| uid.to_string()),
            Consumer::User { user_id } => format!("User {}", user_id),
            Consumer::System { component_id, .. } => entry
                .recorded_label()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Component {}", component_id)),
        };
        NameAndIcon { name, icon: None }
    }
}
