use super::models::Config;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_inflight_handlers must be positive")]
    NoHandlerCapacity,

    #[error("max_payload_bytes must be positive")]
    ZeroPayloadLimit,

    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

/// Validate the configuration. Object store settings are deliberately left
/// alone: a broken store only disables re-upload at runtime.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.worker.max_inflight_handlers == 0 {
        return Err(ValidationError::NoHandlerCapacity);
    }

    if config.server.max_payload_bytes == 0 {
        return Err(ValidationError::ZeroPayloadLimit);
    }

    validate_url("handlers.aaas_endpoint", config.handlers.aaas_endpoint.as_deref())?;
    validate_url("handlers.proxy_url", config.handlers.proxy_url.as_deref())?;

    Ok(())
}

fn validate_url(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Ok(());
    };

    match Url::parse(value) {
        Ok(url) if url.has_host() => Ok(()),
        _ => Err(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}
