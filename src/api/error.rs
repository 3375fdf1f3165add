use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::handlers::{ErrorCode, Outcome, VideoError};

/// Failures raised by the front end itself, before or after dispatch
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("an internal backend service is unavailable")]
    StoreUnavailable,
    /// Request processing panicked outside any handler task
    #[error("an unknown error, thought to be impossible, has occurred")]
    Panicked,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StoreUnavailable | ApiError::Panicked => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::InvalidPayload(_) | ApiError::PayloadTooLarge(_) => ErrorCode::InvalidPayload,
            ApiError::StoreUnavailable => ErrorCode::StoreUnavailable,
            ApiError::Panicked => ErrorCode::AssertionError,
        }
    }
}

/// Rendered in the same shape as dispatch results: a one-element outcome list
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error = match self {
            ApiError::StoreUnavailable => VideoError::store_unavailable(),
            ApiError::Panicked => VideoError::assertion(),
            other => VideoError::new(other.code(), other.to_string()),
        };

        (status, Json(vec![Outcome::Error(error)])).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}
