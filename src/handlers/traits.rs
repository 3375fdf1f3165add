use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use thiserror::Error;

use super::types::{ErrorCode, VideoError, VideoRequest, VideoResponse};
use crate::storage::StorageError;
use crate::worker::http::HttpError;
use crate::worker::media::MediaError;

/// Failures a handler may return across its boundary
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    NoDataElement(String),
    #[error("{0}")]
    Parse(String),
    #[error("no video found in playlist")]
    EmptyPlaylist,
    #[error("playlist detected, but unable to process")]
    UnknownPlaylist,
    #[error("unknown media type: {0}")]
    UnknownType(String),
    #[error("{0}")]
    Download(String),
    #[error("transport error: {0}")]
    Transport(#[from] HttpError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::Config(_) => ErrorCode::ConfigError,
            HandlerError::NoDataElement(_) => ErrorCode::NoDataElement,
            HandlerError::Parse(_) => ErrorCode::ParseError,
            HandlerError::EmptyPlaylist => ErrorCode::EmptyPlaylist,
            HandlerError::UnknownPlaylist => ErrorCode::UnknownPlaylist,
            HandlerError::UnknownType(_) => ErrorCode::UnknownType,
            HandlerError::Download(_) | HandlerError::Transport(_) => ErrorCode::DownloadError,
            HandlerError::Media(MediaError::StreamCount(_)) => ErrorCode::AssertionError,
            HandlerError::Media(_) => ErrorCode::ConversionError,
            HandlerError::Storage(StorageError::NotConnected) => ErrorCode::StoreUnavailable,
            HandlerError::Storage(_) => ErrorCode::UploadError,
            HandlerError::Assertion(_) => ErrorCode::AssertionError,
            HandlerError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<HandlerError> for VideoError {
    fn from(err: HandlerError) -> Self {
        match err.code() {
            ErrorCode::StoreUnavailable => VideoError::store_unavailable(),
            code => VideoError::new(code, err.to_string()),
        }
    }
}

/// Extraction strategy bound to a URL-matching rule
///
/// `can_handle` must be a cheap, pure predicate. `handle` may perform network
/// and subprocess I/O; every failure is returned as a [`HandlerError`].
#[async_trait]
pub trait VideoHandler: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    fn can_handle(&self, req: &VideoRequest) -> bool;

    async fn handle(&self, req: VideoRequest) -> Result<VideoResponse, HandlerError>;
}

/// URL matching rule: an optional full-string pattern and an optional
/// hostname allow-list. Both must pass when both are set.
#[derive(Debug, Clone, Default)]
pub struct UrlMatch {
    pattern: Option<Regex>,
    hostnames: Vec<String>,
}

impl UrlMatch {
    pub fn hostnames<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: None,
            hostnames: hosts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pattern(pattern: Regex) -> Self {
        Self {
            pattern: Some(pattern),
            hostnames: Vec::new(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(url) {
                return false;
            }
        }

        if !self.hostnames.is_empty() {
            let host = Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
            return match host {
                Some(host) => self.hostnames.iter().any(|h| *h == host),
                None => false,
            };
        }

        true
    }
}
