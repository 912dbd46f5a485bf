//! Health check endpoint handlers.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub usage: UsageHealth,
    pub locale: Option<String>,
}

/// State of the published usage snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UsageHealth {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub raw_timestamps: usize,
}

/// Simple status response for liveness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint.
///
/// The service is healthy without a snapshot; `usage.available` reports
/// whether one has been published.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let usage = match state.latest.get().await {
        Some(snapshot) => UsageHealth {
            available: true,
            computed_at: Some(snapshot.computed_at),
            source: Some(snapshot.source.clone()),
            raw_timestamps: snapshot.report.raw_timestamps,
        },
        None => UsageHealth {
            available: false,
            computed_at: None,
            source: None,
            raw_timestamps: 0,
        },
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        usage,
        locale: state.cache.locale(),
    })
}

/// Liveness probe endpoint.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.3.0".to_string(),
            usage: UsageHealth {
                available: false,
                computed_at: None,
                source: None,
                raw_timestamps: 0,
            },
            locale: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["usage"]["available"], false);
        assert!(json["usage"].get("computed_at").is_none());
    }

    #[test]
    fn test_live() {
        let Json(response) = tokio_test::block_on(live());
        assert_eq!(response.status, "alive");
    }
}
