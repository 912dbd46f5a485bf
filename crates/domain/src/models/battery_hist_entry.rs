//! Battery history sample domain model.
//!
//! A [`BatteryHistEntry`] is one entity's cumulative battery statistics at a
//! single wall-clock timestamp. Samples are read from stored rows
//! ([`BatteryHistRecord`]) or synthesized by linear interpolation between two
//! real samples, and are never mutated afterwards.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::BatteryError;

/// Placeholder package name used by the collector for synthetic rows.
pub const FAKE_PACKAGE_NAME: &str = "fake_package";

/// Stored consumer type tag for per-app rows.
pub const CONSUMER_TYPE_UID_BATTERY: i32 = 1;
/// Stored consumer type tag for per-user-profile rows.
pub const CONSUMER_TYPE_USER_BATTERY: i32 = 2;
/// Stored consumer type tag for system component rows.
pub const CONSUMER_TYPE_SYSTEM_BATTERY: i32 = 3;

/// Category of a power-consuming entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerType {
    Uid,
    User,
    System,
}

impl std::fmt::Display for ConsumerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerType::Uid => write!(f, "uid"),
            ConsumerType::User => write!(f, "user"),
            ConsumerType::System => write!(f, "system"),
        }
    }
}

/// Identity of a power-consuming entity, carrying only the fields relevant
/// to its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consumer {
    /// An application, identified by its kernel uid.
    Uid {
        uid: i64,
        user_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        package_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        app_label: Option<String>,
        #[serde(default)]
        is_hidden: bool,
    },
    /// A user profile other than the current one.
    User { user_id: i64 },
    /// A hardware or software system component (screen, radio, ...).
    System {
        component_id: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl Consumer {
    /// Stable key identifying this entity across buckets.
    pub fn key(&self) -> String {
        match self {
            Consumer::Uid { uid, .. } => uid.to_string(),
            Consumer::User { user_id } => format!("U|{}", user_id),
            Consumer::System { component_id, .. } => format!("S|{}", component_id),
        }
    }

    pub fn consumer_type(&self) -> ConsumerType {
        match self {
            Consumer::Uid { .. } => ConsumerType::Uid,
            Consumer::User { .. } => ConsumerType::User,
            Consumer::System { .. } => ConsumerType::System,
        }
    }

    /// Package name with any `:process` suffix removed.
    pub fn package_name(&self) -> Option<&str> {
        match self {
            Consumer::Uid {
                package_name: Some(name),
                ..
            } => name.split(':').next(),
            _ => None,
        }
    }
}

/// Charging status reported with every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryStatus {
    #[default]
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
}

impl BatteryStatus {
    /// Maps the platform status code; unrecognised codes become `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => BatteryStatus::Charging,
            3 => BatteryStatus::Discharging,
            4 => BatteryStatus::NotCharging,
            5 => BatteryStatus::Full,
            _ => BatteryStatus::Unknown,
        }
    }
}

/// Battery health reported with every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryHealth {
    #[default]
    Unknown,
    Good,
    Overheat,
    Dead,
    OverVoltage,
    UnspecifiedFailure,
    Cold,
}

impl BatteryHealth {
    /// Maps the platform health code; unrecognised codes become `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => BatteryHealth::Good,
            3 => BatteryHealth::Overheat,
            4 => BatteryHealth::Dead,
            5 => BatteryHealth::OverVoltage,
            6 => BatteryHealth::UnspecifiedFailure,
            7 => BatteryHealth::Cold,
            _ => BatteryHealth::Unknown,
        }
    }
}

/// One entity's cumulative battery statistics at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryHistEntry {
    pub consumer: Consumer,
    /// Elapsed milliseconds since device boot when the sample was taken.
    pub boot_timestamp: i64,
    /// Wall-clock sample time in UTC milliseconds.
    pub timestamp: i64,
    pub total_power: f64,
    pub consume_power: f64,
    pub foreground_usage_consume_power: f64,
    pub foreground_service_usage_consume_power: f64,
    pub background_usage_consume_power: f64,
    pub cached_usage_consume_power: f64,
    pub percent_of_total: f64,
    pub foreground_usage_time_ms: i64,
    pub foreground_service_usage_time_ms: i64,
    pub background_usage_time_ms: i64,
    pub battery_level: i32,
    pub battery_status: BatteryStatus,
    pub battery_health: BatteryHealth,
}

fn lerp(lower: f64, upper: f64, ratio: f64) -> f64 {
    lower + ratio * (upper - lower)
}

impl BatteryHistEntry {
    pub fn key(&self) -> String {
        self.consumer.key()
    }

    pub fn consumer_type(&self) -> ConsumerType {
        self.consumer.consumer_type()
    }

    pub fn is_app_entry(&self) -> bool {
        matches!(self.consumer, Consumer::Uid { .. })
    }

    pub fn is_user_entry(&self) -> bool {
        matches!(self.consumer, Consumer::User { .. })
    }

    pub fn is_system_entry(&self) -> bool {
        matches!(self.consumer, Consumer::System { .. })
    }

    /// Wall-clock time at which the device booted for this sample's session.
    pub fn boot_anchor(&self) -> i64 {
        self.timestamp - self.boot_timestamp
    }

    /// Whether the device was fully charged when this sample was taken.
    pub fn is_charged(&self) -> bool {
        self.battery_status == BatteryStatus::Full || self.battery_level >= 100
    }

    /// Copies this sample onto another timestamp, keeping the boot anchor.
    pub fn restamped(&self, timestamp: i64) -> Self {
        Self {
            boot_timestamp: (self.boot_timestamp - (self.timestamp - timestamp)).max(0),
            timestamp,
            ..self.clone()
        }
    }

    /// Builds a synthetic sample at `slot_timestamp` by linear interpolation
    /// between `lower` and `upper` with the given `ratio`.
    ///
    /// A missing `lower` sample interpolates power and usage from zero and
    /// keeps the upper battery level. Usage times and the battery level are
    /// rounded to the nearest integer.
    pub fn interpolate(
        slot_timestamp: i64,
        upper_timestamp: i64,
        ratio: f64,
        lower: Option<&BatteryHistEntry>,
        upper: &BatteryHistEntry,
    ) -> Self {
        let power = |pick: fn(&BatteryHistEntry) -> f64| {
            lerp(lower.map_or(0.0, pick), pick(upper), ratio)
        };
        let millis = |pick: fn(&BatteryHistEntry) -> i64| {
            lerp(lower.map_or(0, pick) as f64, pick(upper) as f64, ratio).round() as i64
        };
        let battery_level = match lower {
            Some(lower) => lerp(
                f64::from(lower.battery_level),
                f64::from(upper.battery_level),
                ratio,
            )
            .round() as i32,
            None => upper.battery_level,
        };

        Self {
            consumer: upper.consumer.clone(),
            boot_timestamp: (upper.boot_timestamp - (upper_timestamp - slot_timestamp)).max(0),
            timestamp: slot_timestamp,
            total_power: power(|e| e.total_power),
            consume_power: power(|e| e.consume_power),
            foreground_usage_consume_power: power(|e| e.foreground_usage_consume_power),
            foreground_service_usage_consume_power: power(|e| {
                e.foreground_service_usage_consume_power
            }),
            background_usage_consume_power: power(|e| e.background_usage_consume_power),
            cached_usage_consume_power: power(|e| e.cached_usage_consume_power),
            percent_of_total: upper.percent_of_total,
            foreground_usage_time_ms: millis(|e| e.foreground_usage_time_ms),
            foreground_service_usage_time_ms: millis(|e| e.foreground_service_usage_time_ms),
            background_usage_time_ms: millis(|e| e.background_usage_time_ms),
            battery_level,
            battery_status: upper.battery_status,
            battery_health: upper.battery_health,
        }
    }
}

/// Stored-row form of a battery history sample.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatteryHistRecord {
    #[serde(default)]
    pub uid: i64,

    #[serde(default)]
    pub user_id: i64,

    #[validate(custom(function = "shared::validation::validate_package_name"))]
    pub package_name: Option<String>,

    pub app_label: Option<String>,

    #[serde(default)]
    pub is_hidden: bool,

    /// System component id (drain type) for system rows.
    #[serde(default)]
    pub component_id: i32,

    /// 1 = app (uid), 2 = user profile, 3 = system component.
    pub consumer_type: i32,

    #[validate(custom(function = "shared::validation::validate_epoch_millis"))]
    pub timestamp: i64,

    #[validate(custom(function = "shared::validation::validate_duration_millis"))]
    pub boot_timestamp: i64,

    #[validate(custom(function = "shared::validation::validate_power"))]
    #[serde(default)]
    pub total_power: f64,

    #[validate(custom(function = "shared::validation::validate_power"))]
    #[serde(default)]
    pub consume_power: f64,

    #[validate(custom(function = "shared::validation::validate_power"))]
    #[serde(default)]
    pub foreground_usage_consume_power: f64,

    #[validate(custom(function = "shared::validation::validate_power"))]
    #[serde(default)]
    pub foreground_service_usage_consume_power: f64,

    #[validate(custom(function = "shared::validation::validate_power"))]
    #[serde(default)]
    pub background_usage_consume_power: f64,

    #[validate(custom(function = "shared::validation::validate_power"))]
    #[serde(default)]
    pub cached_usage_consume_power: f64,

    #[serde(default)]
    pub percent_of_total: f64,

    #[validate(custom(function = "shared::validation::validate_duration_millis"))]
    #[serde(default)]
    pub foreground_usage_time_ms: i64,

    #[validate(custom(function = "shared::validation::validate_duration_millis"))]
    #[serde(default)]
    pub foreground_service_usage_time_ms: i64,

    #[validate(custom(function = "shared::validation::validate_duration_millis"))]
    #[serde(default)]
    pub background_usage_time_ms: i64,

    #[validate(custom(function = "shared::validation::validate_battery_level"))]
    pub battery_level: i32,

    #[serde(default)]
    pub battery_status: i32,

    #[serde(default)]
    pub battery_health: i32,
}

impl TryFrom<BatteryHistRecord> for BatteryHistEntry {
    type Error = BatteryError;

    fn try_from(record: BatteryHistRecord) -> Result<Self, Self::Error> {
        record.validate()?;

        let consumer = match record.consumer_type {
            CONSUMER_TYPE_UID_BATTERY => Consumer::Uid {
                uid: record.uid,
                user_id: record.user_id,
                package_name: record.package_name,
                app_label: record.app_label,
                is_hidden: record.is_hidden,
            },
            CONSUMER_TYPE_USER_BATTERY => Consumer::User {
                user_id: record.user_id,
            },
            CONSUMER_TYPE_SYSTEM_BATTERY => Consumer::System {
                component_id: record.component_id,
                label: record.app_label,
            },
            other => return Err(BatteryError::UnknownConsumerType(other)),
        };

        Ok(Self {
            consumer,
            boot_timestamp: record.boot_timestamp,
            timestamp: record.timestamp,
            total_power: record.total_power,
            consume_power: record.consume_power,
            foreground_usage_consume_power: record.foreground_usage_consume_power,
            foreground_service_usage_consume_power: record.foreground_service_usage_consume_power,
            background_usage_consume_power: record.background_usage_consume_power,
            cached_usage_consume_power: record.cached_usage_consume_power,
            percent_of_total: record.percent_of_total,
            foreground_usage_time_ms: record.foreground_usage_time_ms,
            foreground_service_usage_time_ms: record.foreground_service_usage_time_ms,
            background_usage_time_ms: record.background_usage_time_ms,
            battery_level: record.battery_level,
            battery_status: BatteryStatus::from_code(record.battery_status),
            battery_health: BatteryHealth::from_code(record.battery_health),
        })
    }
}
