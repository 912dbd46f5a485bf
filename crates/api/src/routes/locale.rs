//! Display locale updates.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ValidatedJson;

#[derive(Debug, Deserialize, Validate)]
pub struct LocaleRequest {
    /// BCP 47 language tag, e.g. `en-US`.
    #[validate(length(min = 2, max = 35, message = "locale must be 2 to 35 characters"))]
    pub locale: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleResponse {
    pub locale: String,
    pub cache_cleared: bool,
}

/// POST /api/v1/locale
///
/// Cached labels are dropped when the locale differs from the last one
/// seen.
pub async fn update_locale(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LocaleRequest>,
) -> Result<Json<LocaleResponse>, ApiError> {
    let locale = request.locale.trim().to_string();
    let cache_cleared = state.cache.invalidate_on_locale_change(&locale);

    Ok(Json(LocaleResponse {
        locale,
        cache_cleared,
    }))
}
