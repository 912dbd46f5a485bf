//! Battery level and usage route handlers.
//!
//! Read endpoints serve the most recently published snapshot. `compute`
//! runs the engine over rows supplied in the request body.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError};

use domain::models::{BatteryDiffEntry, BatteryHistRecord, BatteryLevelData, HighlightIndex};
use domain::services::{EntryInfoCache, ReconstructionStats, SlotSelector};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{ValidatedJson, ValidatedQuery};
use crate::middleware::RequestId;
use crate::services::{ComputationOutcome, UsageComputation, UsageSnapshot};

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_usage_query"))]
pub struct UsageQuery {
    pub daily: Option<usize>,
    pub hourly: Option<usize>,
}

fn validate_usage_query(query: &UsageQuery) -> Result<(), ValidationError> {
    if query.daily.is_none() && query.hourly.is_some() {
        let mut err = ValidationError::new("hourly_without_daily");
        err.message = Some("hourly requires daily".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_highlight_query"))]
pub struct HighlightQuery {
    #[validate(custom(function = "shared::validation::validate_epoch_millis"))]
    pub start: i64,
    #[validate(custom(function = "shared::validation::validate_epoch_millis"))]
    pub end: i64,
}

fn validate_highlight_query(query: &HighlightQuery) -> Result<(), ValidationError> {
    if query.start > query.end {
        let mut err = ValidationError::new("inverted_range");
        err.message = Some("start must not be after end".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ComputeRequest {
    #[validate(length(min = 1, max = 200000))]
    pub records: Vec<BatteryHistRecord>,
    /// Publish the result as the latest snapshot.
    #[serde(default = "default_publish")]
    pub publish: bool,
}

fn default_publish() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelsResponse {
    pub computed_at: DateTime<Utc>,
    pub is_from_full_charge: bool,
    /// `None` when the history is too short to chart.
    pub level_data: Option<BatteryLevelData>,
    pub slot_counts: BTreeMap<String, usize>,
    pub stats: ReconstructionStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntryView {
    pub key: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub percentage: f64,
    pub rounded_percentage: i64,
    pub consume_power: f64,
    pub foreground_usage_time_ms: i64,
    pub foreground_service_usage_time_ms: i64,
    pub background_usage_time_ms: i64,
    pub screen_on_time_ms: i64,
    pub valid_for_restriction: bool,
}

impl UsageEntryView {
    fn from_entry(entry: &BatteryDiffEntry, cache: &EntryInfoCache) -> Self {
        Self {
            key: entry.key(),
            label: entry.app_label(cache),
            icon: entry.app_icon(cache),
            percentage: entry.percentage(),
            rounded_percentage: entry.rounded_percentage(),
            consume_power: entry.consume_power,
            foreground_usage_time_ms: entry.foreground_usage_time_ms,
            foreground_service_usage_time_ms: entry.foreground_service_usage_time_ms,
            background_usage_time_ms: entry.background_usage_time_ms,
            screen_on_time_ms: entry.screen_on_time_ms,
            valid_for_restriction: entry.is_valid_for_restriction(cache),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub daily: String,
    pub hourly: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub start_battery_level: Option<i32>,
    pub end_battery_level: Option<i32>,
    pub screen_on_time_ms: i64,
    pub accumulated: bool,
    pub app_entries: Vec<UsageEntryView>,
    pub system_entries: Vec<UsageEntryView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResponse {
    pub raw_timestamps: usize,
    pub chartable: bool,
    pub days: usize,
    pub is_from_full_charge: bool,
    pub slot_counts: BTreeMap<String, usize>,
    pub gaps: usize,
    pub resets: usize,
    pub published: bool,
}

async fn latest_snapshot(state: &AppState) -> Result<Arc<UsageSnapshot>, ApiError> {
    state.latest.get().await.ok_or_else(|| {
        ApiError::ServiceUnavailable("No battery usage has been computed yet".to_string())
    })
}

/// GET /api/v1/battery/levels
pub async fn get_levels(State(state): State<AppState>) -> Result<Json<LevelsResponse>, ApiError> {
    let snapshot = latest_snapshot(&state).await?;
    let report = &snapshot.report;

    Ok(Json(LevelsResponse {
        computed_at: snapshot.computed_at,
        is_from_full_charge: report.is_from_full_charge,
        level_data: report.level_data.clone(),
        slot_counts: report.stats.counts(),
        stats: report.stats.clone(),
    }))
}

/// GET /api/v1/battery/usage?daily=&hourly=
///
/// Omitted indices select the whole range.
pub async fn get_usage(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<UsageQuery>,
) -> Result<Json<UsageResponse>, ApiError> {
    let snapshot = latest_snapshot(&state).await?;
    let daily = SlotSelector::from(query.daily);
    let hourly = SlotSelector::from(query.hourly);

    let data = snapshot
        .report
        .usage_map
        .get(daily, hourly)
        .ok_or_else(|| ApiError::NotFound(format!("No usage for slot ({}, {})", daily, hourly)))?;

    let cache = state.cache.as_ref();
    Ok(Json(UsageResponse {
        daily: daily.to_string(),
        hourly: hourly.to_string(),
        start_timestamp: data.start_timestamp(),
        end_timestamp: data.end_timestamp(),
        start_battery_level: data.start_battery_level(),
        end_battery_level: data.end_battery_level(),
        screen_on_time_ms: data.screen_on_time_ms(),
        accumulated: data.is_accumulated(),
        app_entries: data
            .app_diff_entry_list()
            .iter()
            .map(|entry| UsageEntryView::from_entry(entry, cache))
            .collect(),
        system_entries: data
            .system_diff_entry_list()
            .iter()
            .map(|entry| UsageEntryView::from_entry(entry, cache))
            .collect(),
    }))
}

/// GET /api/v1/battery/highlight?start=&end=
pub async fn get_highlight(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<HighlightQuery>,
) -> Result<Json<HighlightIndex>, ApiError> {
    let snapshot = latest_snapshot(&state).await?;
    let level_data = snapshot
        .report
        .level_data
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("No chartable battery history".to_string()))?;

    Ok(Json(level_data.index_by_timestamps(query.start, query.end)))
}

/// POST /api/v1/battery/compute
pub async fn compute(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidatedJson(request): ValidatedJson<ComputeRequest>,
) -> Result<Json<ComputeResponse>, ApiError> {
    let rows = request.records.len();
    let computation = UsageComputation::spawn_records(
        Arc::clone(&state.engine),
        request.records,
        Some(state.config.history_window_millis()),
    );
    // Client disconnects cancel the run.
    let _cancel_on_drop = computation.cancellation_token().drop_guard();

    let report = match computation.join().await? {
        ComputationOutcome::Completed(report) => report,
        ComputationOutcome::Cancelled => return Err(ApiError::Cancelled),
    };

    let response = ComputeResponse {
        raw_timestamps: report.raw_timestamps,
        chartable: report.level_data.is_some(),
        days: report
            .level_data
            .as_ref()
            .map(|data| data.hourly_battery_levels_per_day().len())
            .unwrap_or(0),
        is_from_full_charge: report.is_from_full_charge,
        slot_counts: report.stats.counts(),
        gaps: report.stats.gaps(),
        resets: report.stats.resets(),
        published: request.publish,
    };

    if request.publish {
        let source = format!("request:{}", request_id.as_str());
        state.latest.publish(report, source).await;
    }

    info!(
        request_id = %request_id.as_str(),
        rows = rows,
        raw_timestamps = response.raw_timestamps,
        published = response.published,
        "Computed battery usage from request"
    );

    Ok(Json(response))
}
