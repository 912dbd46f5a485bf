//! App metadata resolver backed by the configured app catalog.

use std::collections::HashMap;

use domain::models::{Consumer, NameAndIcon};
use domain::services::AppInfoResolver;

use crate::config::InstalledApp;

/// Resolves labels, icons and install state from a fixed list of apps.
#[derive(Debug, Clone, Default)]
pub struct StaticAppInfoResolver {
    by_package: HashMap<String, InstalledApp>,
    by_uid: HashMap<i64, String>,
}

impl StaticAppInfoResolver {
    pub fn new(apps: &[InstalledApp]) -> Self {
        let mut resolver = Self::default();
        for app in apps {
            resolver
                .by_uid
                .entry(app.uid)
                .or_insert_with(|| app.package_name.clone());
            resolver
                .by_package
                .insert(app.package_name.clone(), app.clone());
        }
        resolver
    }

    fn find(&self, consumer: &Consumer) -> Option<&InstalledApp> {
        let Consumer::Uid { uid, .. } = consumer else {
            return None;
        };
        consumer
            .package_name()
            .and_then(|package| self.by_package.get(package))
            .or_else(|| {
                self.by_uid
                    .get(uid)
                    .and_then(|package| self.by_package.get(package))
            })
    }
}

impl AppInfoResolver for StaticAppInfoResolver {
    fn resolve_name_and_icon(&self, consumer: &Consumer) -> Option<NameAndIcon> {
        let app = self.find(consumer)?;
        let name = app.label.clone()?;
        Some(NameAndIcon {
            name,
            icon: app.icon.clone(),
        })
    }

    fn is_valid_for_restriction(&self, consumer: &Consumer) -> bool {
        self.find(consumer).is_some_and(|app| app.restrictable)
    }

    fn package_uid(&self, package_name: &str) -> Option<i64> {
        self.by_package.get(package_name).map(|app| app.uid)
    }

    /// An empty catalog means no app list was configured.
    fn knows_installed_apps(&self) -> bool {
        !self.by_package.is_empty()
    }
}
