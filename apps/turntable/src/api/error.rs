//! Mapping of stage errors onto HTTP responses.

use super::types::ActionResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use turntable_core::StageError;

/// A failed control action, rendered as `{success: false, error}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// A blocking task died before producing a result.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

/// HTTP status for each error kind.
#[must_use]
pub fn status_for(error: &StageError) -> StatusCode {
    if error.is_device_fault() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match error {
        StageError::Unsupported { .. } | StageError::Config(_) => StatusCode::BAD_REQUEST,
        StageError::HomingTimeout { .. } | StageError::CalibrationTimeout(_) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        StageError::AlreadyInitialized => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StageError> for ApiError {
    fn from(error: StageError) -> Self {
        Self {
            status: status_for(&error),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Control action failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "Control action rejected");
        }
        (self.status, Json(ActionResponse::error(self.message))).into_response()
    }
}
