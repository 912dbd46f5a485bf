use chrono::{FixedOffset, Offset, Utc};
use domain::services::{InterpolationThresholds, UsagePolicy};
use serde::Deserialize;
use shared::time_slots::DeviceTimeZone;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
    /// Snap and reboot alignment distances for slot reconstruction
    #[serde(default)]
    pub thresholds: InterpolationThresholds,
    /// Purge thresholds and hide/merge sets for usage aggregation
    #[serde(default)]
    pub policy: UsagePolicy,
    /// Installed-app catalog used to resolve labels and uninstalled apps
    #[serde(default)]
    pub apps: Vec<InstalledApp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// JSON snapshot of stored history rows. Periodic refresh is disabled
    /// when empty.
    #[serde(default)]
    pub snapshot_path: String,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u64,

    /// Offset of local time from UTC. Falls back to the host offset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    /// Raw samples older than this before the latest one are ignored
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

/// One installed application known to the service.
#[derive(Debug, Clone, Deserialize)]
pub struct InstalledApp {
    pub package_name: String,
    pub uid: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_restrictable")]
    pub restrictable: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_refresh_interval() -> u64 {
    60
}
fn default_window_days() -> u32 {
    6
}
fn default_restrictable() -> bool {
    true
}

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with BU__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("BU").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// This method creates a config entirely from defaults and overrides,
    /// without relying on config files (which may not be accessible during tests).
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [logging]
            level = "info"
            format = "json"

            [history]
            snapshot_path = ""
            refresh_interval_minutes = 60
            window_days = 6

            [thresholds]
            snap_to_upper_ms = 5000
            reboot_force_align_ms = 600000

            [policy]
            screen_on_time_threshold_ms = 0.0
            consume_power_threshold = 0.0
            hide_system_components = [17]
            hide_applications = ["com.example.hidden"]

            [[apps]]
            package_name = "com.example.maps"
            uid = 10001
            label = "Maps"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.host.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "BU__SERVER__HOST must not be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.history.refresh_interval_minutes == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "history.refresh_interval_minutes must be positive".to_string(),
            ));
        }

        if self.history.window_days == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "history.window_days must be positive".to_string(),
            ));
        }

        if let Some(offset) = self.history.utc_offset_minutes {
            if offset.abs() > MAX_UTC_OFFSET_MINUTES {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "history.utc_offset_minutes {} is outside +/-{}",
                    offset, MAX_UTC_OFFSET_MINUTES
                )));
            }
        }

        if self.thresholds.snap_to_upper_ms <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "thresholds.snap_to_upper_ms must be positive".to_string(),
            ));
        }

        if self.thresholds.reboot_force_align_ms < 0 {
            return Err(ConfigValidationError::InvalidValue(
                "thresholds cannot be negative".to_string(),
            ));
        }

        if self.policy.screen_on_time_threshold_ms < 0.0 || self.policy.consume_power_threshold < 0.0
        {
            return Err(ConfigValidationError::InvalidValue(
                "policy thresholds cannot be negative".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ConfigValidationError::InvalidValue(format!(
                    "Invalid socket address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }

    /// Time zone used for calendar slotting. Without a configured offset the
    /// host's local zone is used, daylight-saving transitions included.
    pub fn time_zone(&self) -> DeviceTimeZone {
        match self.history.utc_offset_minutes {
            Some(minutes) => DeviceTimeZone::Fixed(
                FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix()),
            ),
            None => DeviceTimeZone::Local,
        }
    }

    pub fn history_window_millis(&self) -> i64 {
        i64::from(self.history.window_days) * shared::time_slots::DAY_IN_MILLIS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load_with_defaults() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.history.refresh_interval_minutes, 60);
        assert_eq!(config.history.window_days, 6);
        assert_eq!(config.thresholds, InterpolationThresholds::default());
        assert!(config.policy.hide_system_components.contains(&17));
        assert_eq!(config.apps.len(), 1);
        assert!(config.apps[0].restrictable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_env_override() {
        let config = Config::load_for_test(&[
            ("server.port", "9000"),
            ("logging.level", "debug"),
            ("history.utc_offset_minutes", "120"),
        ])
        .expect("Failed to load config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.time_zone(),
            DeviceTimeZone::Fixed(FixedOffset::east_opt(7200).unwrap())
        );
    }

    #[test]
    fn test_config_validation_zero_refresh_interval() {
        let config = Config::load_for_test(&[("history.refresh_interval_minutes", "0")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("refresh_interval_minutes"));
    }

    #[test]
    fn test_config_validation_offset_out_of_range() {
        let config = Config::load_for_test(&[("history.utc_offset_minutes", "900")])
            .expect("Failed to load config");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_negative_threshold() {
        let config = Config::load_for_test(&[("thresholds.snap_to_upper_ms", "-1")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("thresholds"));
    }

    #[test]
    fn test_config_validation_zero_snap_threshold() {
        let config = Config::load_for_test(&[("thresholds.snap_to_upper_ms", "0")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("snap_to_upper_ms"));
    }

    #[test]
    fn test_time_zone_defaults_to_host_zone() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");
        assert_eq!(config.history.utc_offset_minutes, None);
        assert_eq!(config.time_zone(), DeviceTimeZone::Local);
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::load_for_test(&[
            ("server.host", "127.0.0.1"),
            ("server.port", "3000"),
        ])
        .expect("Failed to load config");

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_socket_addr_invalid_host() {
        let config = Config::load_for_test(&[("server.host", "not a host")])
            .expect("Failed to load config");
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_history_window_millis() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");
        assert_eq!(config.history_window_millis(), 6 * 24 * 3_600_000);
    }
}
