//! Domain error types.
//!
//! Data-quality problems in the history (gaps, counter resets, reboots) are
//! recovered locally by the engine and never surface here. These variants
//! cover malformed input that must not be processed further.

use thiserror::Error;

/// Error type for battery history ingestion.
#[derive(Debug, Error)]
pub enum BatteryError {
    #[error("Invalid battery history record: {0}")]
    InvalidRecord(String),

    #[error("Unknown consumer type: {0}")]
    UnknownConsumerType(i32),

    #[error("Sample timestamp {sample} does not match bucket timestamp {bucket}")]
    TimestampMismatch { bucket: i64, sample: i64 },

    #[error("Duplicate entity {key} in bucket {bucket}")]
    DuplicateEntity { bucket: i64, key: String },
}

impl From<validator::ValidationErrors> for BatteryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{}: {}", field, message)
                })
            })
            .collect();
        details.sort();
        BatteryError::InvalidRecord(details.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BatteryError::InvalidRecord("batteryLevel: out of range".to_string()).to_string(),
            "Invalid battery history record: batteryLevel: out of range"
        );
        assert_eq!(
            BatteryError::UnknownConsumerType(9).to_string(),
            "Unknown consumer type: 9"
        );
        assert_eq!(
            BatteryError::TimestampMismatch {
                bucket: 10,
                sample: 11
            }
            .to_string(),
            "Sample timestamp 11 does not match bucket timestamp 10"
        );
        assert_eq!(
            BatteryError::DuplicateEntity {
                bucket: 10,
                key: "1001".to_string()
            }
            .to_string(),
            "Duplicate entity 1001 in bucket 10"
        );
    }

    #[test]
    fn test_from_validation_errors() {
        let mut errors = validator::ValidationErrors::new();
        let mut err = validator::ValidationError::new("battery_range");
        err.message = Some("Battery level must be between 0 and 100".into());
        errors.add("battery_level", err);

        let converted: BatteryError = errors.into();
        assert_eq!(
            converted.to_string(),
            "Invalid battery history record: battery_level: Battery level must be between 0 and 100"
        );
    }
}
