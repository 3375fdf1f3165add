//! Pure helpers for HTTP request processing

use axum::http::StatusCode;

use crate::api::error::ApiError;
use crate::handlers::{ErrorCode, Outcome};

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `application/json-patch+json`
/// - `text/json`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// How a reconciled outcome list is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Outcomes(StatusCode),
    StoreUnavailable,
}

pub fn classify_outcomes(outcomes: &[Outcome]) -> Reply {
    if outcomes.iter().any(Outcome::is_response) {
        return Reply::Outcomes(StatusCode::OK);
    }

    if outcomes
        .iter()
        .any(|o| o.error_code() == Some(ErrorCode::StoreUnavailable))
    {
        return Reply::StoreUnavailable;
    }

    Reply::Outcomes(StatusCode::INTERNAL_SERVER_ERROR)
}
