use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::BatteryError;
use serde::Serialize;
use thiserror::Error;

use crate::services::computation::ComputationError;
use crate::services::history_source::HistorySourceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Cancelled => (
                StatusCode::CONFLICT,
                "cancelled",
                "The computation was cancelled".into(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BatteryError> for ApiError {
    fn from(err: BatteryError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        BatteryError::from(errors).into()
    }
}

impl From<ComputationError> for ApiError {
    fn from(err: ComputationError) -> Self {
        match err {
            ComputationError::Battery(err) => err.into(),
            ComputationError::Worker(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<HistorySourceError> for ApiError {
    fn from(err: HistorySourceError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}
