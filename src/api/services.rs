use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::collections::BTreeMap;
use tracing::info;

use super::{
    models::{HealthResponse, StatsResponse, VideoRequestBody},
    state::AppState,
    utils::{Reply, classify_outcomes},
    validation::validate_request,
};
use crate::api::error::ApiError;

/// Resolve a URL into embeddable videos (POST /video)
///
/// ## Flow:
/// 1. Validate Content-Type (application/json, optional charset)
/// 2. Read the body up to `server.max_payload_bytes` (gzip handled by middleware)
/// 3. Deserialize and validate the request
/// 4. Dispatch to every matching handler and reconcile
/// 5. 200 with responses, or 500 with the error list
///
/// When no handler succeeded and the object store was the cause, the error
/// list collapses into a single `store-unavailable` error.
pub async fn submit_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let body = read_body(body, state.config.server.max_payload_bytes).await?;
    let payload: VideoRequestBody = serde_json::from_slice(&body)?;
    let req = validate_request(payload).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let outcomes = state.worker.handle_request(req).await;

    match classify_outcomes(&outcomes) {
        Reply::Outcomes(status) => {
            info!(status = status.as_u16(), outcomes = outcomes.len(), "Request answered");
            Ok((status, Json(outcomes)).into_response())
        }
        Reply::StoreUnavailable => Err(ApiError::StoreUnavailable),
    }
}

/// Reads the request body, refusing anything past `limit` bytes
async fn read_body(body: axum::body::Body, limit: usize) -> Result<Bytes, ApiError> {
    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::InvalidPayload(format!("failed to read body: {err}"))
        }
    })?;

    Ok(collected.to_bytes())
}

/// Health check endpoint (GET /health)
///
/// Always 200: direct-link handlers keep working without the object store,
/// so a missing store only degrades the service.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage_connected = state.worker.storage().is_connected();

    let mut components = BTreeMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "storage".to_string(),
        if storage_connected { "connected" } else { "unavailable" }.to_string(),
    );

    let response = HealthResponse {
        status: if storage_connected { "healthy" } else { "degraded" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (axum::http::StatusCode::OK, Json(response))
}

/// Operator counters (GET /operators/stats)
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let worker = &state.worker;

    Json(StatsResponse {
        handlers: worker.registry().names(),
        max_inflight_handlers: state.config.worker.max_inflight_handlers,
        storage_connected: worker.storage().is_connected(),
        metrics: worker.metrics().snapshot(),
    })
}
