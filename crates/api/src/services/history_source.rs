//! Sources of stored battery history rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domain::models::BatteryHistRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistorySourceError {
    #[error("Failed to read history snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed history snapshot {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Provides the raw rows of the recent history window.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> String;

    async fn load(&self) -> Result<Vec<BatteryHistRecord>, HistorySourceError>;
}

/// Reads a JSON array of history rows from disk.
#[derive(Debug, Clone)]
pub struct JsonFileHistorySource {
    path: PathBuf,
}

impl JsonFileHistorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistorySource for JsonFileHistorySource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Vec<BatteryHistRecord>, HistorySourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| HistorySourceError::Io {
                path: self.name(),
                source,
            })?;

        let records: Vec<BatteryHistRecord> =
            serde_json::from_slice(&bytes).map_err(|source| HistorySourceError::Parse {
                path: self.name(),
                source,
            })?;

        tracing::debug!(path = %self.name(), rows = records.len(), "Loaded history snapshot");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let path = temp_path("history");
        let rows = serde_json::json!([
            {
                "uid": 10001,
                "packageName": "com.example.maps",
                "consumerType": 1,
                "timestamp": 1_700_000_000_000i64,
                "bootTimestamp": 3_600_000,
                "batteryLevel": 80,
                "consumePower": 1.5,
                "foregroundUsageTimeMs": 60000
            },
            {
                "componentId": 0,
                "consumerType": 3,
                "timestamp": 1_700_000_000_000i64,
                "bootTimestamp": 3_600_000,
                "batteryLevel": 80
            }
        ]);
        tokio::fs::write(&path, rows.to_string()).await.unwrap();

        let records = JsonFileHistorySource::new(&path).load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].uid, 10001);
        assert_eq!(records[0].foreground_usage_time_ms, 60000);
        assert_eq!(records[1].consumer_type, 3);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = JsonFileHistorySource::new(temp_path("missing"));
        let result = source.load().await;
        assert!(matches!(result, Err(HistorySourceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let path = temp_path("malformed");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result = JsonFileHistorySource::new(&path).load().await;
        assert!(matches!(result, Err(HistorySourceError::Parse { .. })));

        tokio::fs::remove_file(&path).await.ok();
    }
}
