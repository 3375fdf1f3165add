use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A request to turn a content URL into a playable embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub url: String,
}

impl VideoRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Stable hex identifier of this request, used as object-store key prefix.
    ///
    /// The digest covers a canonical JSON rendering of the request fields
    /// (`{"url": <json string>}`), so it only depends on the URL text.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{{\"url\": {}}}",
            serde_json::Value::from(self.url.as_str())
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Logical sub-request for an indirection (e.g. a playlist entry)
    pub fn redirected(&self, url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Provenance fields, never required for a response to be valid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub site: Option<String>,
}

/// Pixel dimensions of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Both sides present and non-zero
    pub fn from_parts(width: Option<u64>, height: Option<u64>) -> Option<Self> {
        match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Self {
                width: u32::try_from(w).ok()?,
                height: u32::try_from(h).ok()?,
            }),
            _ => None,
        }
    }
}

/// Successful result of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResponse {
    #[serde(flatten)]
    pub metadata: ResponseMetadata,
    pub video_url: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub reuploaded: bool,
}

impl VideoResponse {
    pub fn direct(metadata: ResponseMetadata, video_url: String, dim: Dimensions) -> Self {
        Self {
            metadata,
            video_url,
            width: dim.width,
            height: dim.height,
            reuploaded: false,
        }
    }

    pub fn reuploaded(metadata: ResponseMetadata, video_url: String, dim: Dimensions) -> Self {
        Self {
            reuploaded: true,
            ..Self::direct(metadata, video_url, dim)
        }
    }
}

/// Stable error codes exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NoHandler,
    ConfigError,
    NoDataElement,
    ParseError,
    EmptyPlaylist,
    UnknownPlaylist,
    UnknownType,
    DownloadError,
    ConversionError,
    UploadError,
    AssertionError,
    StoreUnavailable,
    InternalError,
    InvalidPayload,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoHandler => "no-handler",
            ErrorCode::ConfigError => "config-error",
            ErrorCode::NoDataElement => "no-data-element",
            ErrorCode::ParseError => "parse-error",
            ErrorCode::EmptyPlaylist => "empty-playlist",
            ErrorCode::UnknownPlaylist => "unknown-playlist",
            ErrorCode::UnknownType => "unknown-type",
            ErrorCode::DownloadError => "download-error",
            ErrorCode::ConversionError => "conversion-error",
            ErrorCode::UploadError => "upload-error",
            ErrorCode::AssertionError => "assertion-error",
            ErrorCode::StoreUnavailable => "store-unavailable",
            ErrorCode::InternalError => "internal-error",
            ErrorCode::InvalidPayload => "invalid-payload",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed result of one strategy attempt. A regular value, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoError {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

impl VideoError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_handler() -> Self {
        Self::new(ErrorCode::NoHandler, "no handler is able to process this url")
    }

    pub fn assertion() -> Self {
        Self::new(
            ErrorCode::AssertionError,
            "an unknown error, thought to be impossible, has occurred",
        )
    }

    pub fn store_unavailable() -> Self {
        Self::new(
            ErrorCode::StoreUnavailable,
            "an internal backend service is unavailable",
        )
    }
}

/// Tagged result of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Response(VideoResponse),
    Error(VideoError),
}

impl Outcome {
    pub fn is_response(&self) -> bool {
        matches!(self, Outcome::Response(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Outcome::Error(e) => Some(e.code),
            Outcome::Response(_) => None,
        }
    }
}

impl From<VideoResponse> for Outcome {
    fn from(value: VideoResponse) -> Self {
        Outcome::Response(value)
    }
}

impl From<VideoError> for Outcome {
    fn from(value: VideoError) -> Self {
        Outcome::Error(value)
    }
}
