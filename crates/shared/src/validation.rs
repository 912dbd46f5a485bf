//! Common validation utilities for stored battery samples.

use chrono::DateTime;
use validator::ValidationError;

lazy_static::lazy_static! {
    /// Java-style package name with an optional `:process` suffix.
    pub static ref PACKAGE_NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*(:[A-Za-z0-9_.]+)?$").unwrap();
}

/// Validates that battery level is within valid range (0 to 100).
pub fn validate_battery_level(level: i32) -> Result<(), ValidationError> {
    if (0..=100).contains(&level) {
        Ok(())
    } else {
        let mut err = ValidationError::new("battery_range");
        err.message = Some("Battery level must be between 0 and 100".into());
        Err(err)
    }
}

/// Validates that a timestamp (in milliseconds since epoch) is positive and
/// representable as a calendar date.
pub fn validate_epoch_millis(timestamp_millis: i64) -> Result<(), ValidationError> {
    if timestamp_millis > 0 && DateTime::from_timestamp_millis(timestamp_millis).is_some() {
        Ok(())
    } else {
        let mut err = ValidationError::new("timestamp_invalid");
        err.message = Some("Timestamp must be a positive epoch millisecond value".into());
        Err(err)
    }
}

/// Validates that a usage duration in milliseconds is non-negative.
pub fn validate_duration_millis(duration: i64) -> Result<(), ValidationError> {
    if duration >= 0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("duration_range");
        err.message = Some("Usage duration must be non-negative".into());
        Err(err)
    }
}

/// Validates that a consumed power value is finite and non-negative.
pub fn validate_power(power: f64) -> Result<(), ValidationError> {
    if power.is_finite() && power >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("power_range");
        err.message = Some("Consumed power must be a finite, non-negative value".into());
        Err(err)
    }
}

/// Validates the shape of an application package name.
pub fn validate_package_name(package_name: &str) -> Result<(), ValidationError> {
    if PACKAGE_NAME_REGEX.is_match(package_name) {
        Ok(())
    } else {
        let mut err = ValidationError::new("package_name_format");
        err.message = Some("Package name must look like com.example.app".into());
        Err(err)
    }
}
