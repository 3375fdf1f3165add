use thiserror::Error;

use super::models::VideoRequestBody;
use crate::handlers::VideoRequest;

const MAX_URL_LENGTH: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("url exceeds {} characters", MAX_URL_LENGTH)]
    UrlTooLong,
}

/// Turn the wire body into a dispatchable request. The url is trimmed but
/// otherwise passed through; handlers decide whether they accept it.
pub fn validate_request(body: VideoRequestBody) -> Result<VideoRequest, RequestValidationError> {
    let url = body.url.trim();

    if url.is_empty() {
        return Err(RequestValidationError::EmptyUrl);
    }

    if url.len() > MAX_URL_LENGTH {
        return Err(RequestValidationError::UrlTooLong);
    }

    Ok(VideoRequest::new(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(url: &str) -> VideoRequestBody {
        VideoRequestBody {
            url: url.to_string(),
        }
    }

    #[test]
    fn validate_request_trims_url() {
        let req = validate_request(body("  https://example.com/v \n")).unwrap();
        assert_eq!(req.url, "https://example.com/v");
    }

    #[test]
    fn validate_request_rejects_blank_url() {
        assert_eq!(
            validate_request(body("")).unwrap_err(),
            RequestValidationError::EmptyUrl
        );
        assert_eq!(
            validate_request(body("   ")).unwrap_err(),
            RequestValidationError::EmptyUrl
        );
    }

    #[test]
    fn validate_request_limits_length() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert_eq!(
            validate_request(body(&long)).unwrap_err(),
            RequestValidationError::UrlTooLong
        );
    }
}
