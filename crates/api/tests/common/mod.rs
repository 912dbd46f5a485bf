//! Common test utilities for integration tests.
//!
//! Builds the router over an in-memory configuration and provides request
//! helpers and history fixtures.

#![allow(dead_code)]

use axum::Router;
use battery_usage_api::{
    app::{create_app, AppState},
    config::{Config, HistoryConfig, InstalledApp, LoggingConfig, ServerConfig},
};
use chrono::{TimeZone, Utc};
use domain::services::{InterpolationThresholds, UsagePolicy};

/// Configuration with a UTC clock and two installed apps.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "compact".to_string(),
        },
        history: HistoryConfig {
            snapshot_path: String::new(),
            refresh_interval_minutes: 60,
            utc_offset_minutes: Some(0),
            window_days: 6,
        },
        thresholds: InterpolationThresholds::default(),
        policy: UsagePolicy::default(),
        apps: vec![
            InstalledApp {
                package_name: "com.example.maps".to_string(),
                uid: 10001,
                label: Some("Maps".to_string()),
                icon: Some("icon://maps".to_string()),
                restrictable: true,
            },
            InstalledApp {
                package_name: "com.example.chat".to_string(),
                uid: 10002,
                label: Some("Chat".to_string()),
                icon: None,
                restrictable: false,
            },
        ],
    }
}

/// Configuration shipped in `config/default.toml`, pinned to UTC.
pub fn default_config() -> Config {
    let mut config: Config = config::Config::builder()
        .add_source(config::File::from_str(
            include_str!("../../../../config/default.toml"),
            config::FileFormat::Toml,
        ))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap();
    config.history.utc_offset_minutes = Some(0);
    config
}

/// Create the application state and router for testing.
pub fn create_test_app() -> (AppState, Router) {
    let state = AppState::new(test_config());
    let app = create_app(state.clone());
    (state, app)
}

/// Epoch millis of 2024-07-01 `hour:minute` UTC.
pub fn ts(hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 7, 1, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

/// Stored-row JSON for one app sample. Boot time is a day before the
/// sample day so no reboot is seen.
pub fn app_record(
    uid: i64,
    package_name: &str,
    timestamp: i64,
    foreground_ms: i64,
    consume_power: f64,
    battery_level: i32,
) -> serde_json::Value {
    serde_json::json!({
        "uid": uid,
        "packageName": package_name,
        "consumerType": 1,
        "timestamp": timestamp,
        "bootTimestamp": timestamp - ts(0, 0) + 86_400_000,
        "batteryLevel": battery_level,
        "batteryStatus": 3,
        "consumePower": consume_power,
        "foregroundUsageConsumePower": consume_power,
        "foregroundUsageTimeMs": foreground_ms
    })
}

/// Two apps sampled at 01:10 and 15:40, splitting power 70/30.
pub fn two_app_history() -> Vec<serde_json::Value> {
    vec![
        app_record(10001, "com.example.maps", ts(1, 10), 0, 0.0, 95),
        app_record(10002, "com.example.chat", ts(1, 10), 0, 0.0, 95),
        app_record(10001, "com.example.maps", ts(15, 40), 3_480_000, 70.0, 60),
        app_record(10002, "com.example.chat", ts(15, 40), 1_740_000, 30.0, 60),
    ]
}

/// Build a JSON request.
pub fn json_request(
    method: axum::http::Method,
    uri: &str,
    body: serde_json::Value,
) -> axum::http::Request<axum::body::Body> {
    use axum::{
        body::Body,
        http::{header, Request},
    };

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request.
pub fn get_request(uri: &str) -> axum::http::Request<axum::body::Body> {
    use axum::{body::Body, http::Request};

    Request::builder()
        .method(axum::http::Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Parse response body as JSON.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}
