use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::traits::{HandlerError, UrlMatch, VideoHandler};
use super::types::{ResponseMetadata, VideoRequest, VideoResponse};
use crate::worker::Toolkit;

const SITE_BASE: &str = "https://asciinema.org";
const SITE_NAME: &str = "asciinema";

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("static regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});

static AUTHOR_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)class\s*=\s*["'][^"']*\bauthor-avatar\b[^"']*["'][^>]*>.*?<a\b[^>]*?href\s*=\s*["']([^"']+)["']"#)
        .expect("static regex")
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>\s*([^<]*?)\s*<").expect("static regex"));

/// Recording id from `/a/<id>` paths
pub fn recording_id(url: &str) -> Result<String, HandlerError> {
    let parsed =
        Url::parse(url).map_err(|e| HandlerError::Parse(format!("invalid url {url}: {e}")))?;

    parsed
        .path()
        .strip_prefix("/a/")
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .map(str::to_string)
        .ok_or_else(|| HandlerError::Parse(format!("not a recording url: {url}")))
}

/// `content` of the first `<meta property=...>` tag matching `property`
fn meta_property(html: &str, property: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let mut matched = false;
        let mut content = None;

        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
            match (attr[1].to_ascii_lowercase().as_str(), value) {
                ("property", Some(v)) if v == property => matched = true,
                ("content", Some(v)) => content = Some(v),
                _ => {}
            }
        }

        matched.then(|| content.map(decode_entities)).flatten()
    })
}

fn author_href(html: &str) -> Option<String> {
    AUTHOR_LINK.captures(html).map(|c| c[1].to_string())
}

fn heading_text(html: &str) -> Option<String> {
    HEADING
        .captures(html)
        .map(|c| decode_entities(&c[1]))
        .filter(|s| !s.is_empty())
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Renders terminal recordings through an external GIF service and
/// re-uploads them as MP4
pub struct AsciinemaHandler {
    rule: UrlMatch,
    toolkit: Toolkit,
    aaas_endpoint: Option<String>,
}

impl AsciinemaHandler {
    pub fn new(toolkit: Toolkit, aaas_endpoint: Option<String>) -> Self {
        Self {
            rule: UrlMatch::hostnames(["asciinema.org"]),
            toolkit,
            aaas_endpoint,
        }
    }

    async fn render_gif(&self, endpoint: &str, id: &str) -> Result<Bytes, HandlerError> {
        let cast = self
            .toolkit
            .http
            .get_bytes(&format!("{SITE_BASE}/a/{id}.cast?dl=1"))
            .await?;
        debug!(id, bytes = cast.len(), "Fetched recording");

        Ok(self.toolkit.http.post_bytes(endpoint, cast).await?)
    }

    /// Title and author are cosmetic; failures leave them unset
    async fn scrape_metadata(&self, id: &str) -> ResponseMetadata {
        let mut metadata = ResponseMetadata {
            site: Some(SITE_NAME.to_string()),
            ..Default::default()
        };

        let page = match self.toolkit.http.get_text(&format!("{SITE_BASE}/a/{id}")).await {
            Ok(page) => page,
            Err(e) => {
                warn!(id, error = %e, "Failed to fetch recording page");
                return metadata;
            }
        };

        metadata.title = meta_property(&page, "og:title");

        if let Some(href) = author_href(&page) {
            match self.toolkit.http.get_text(&format!("{SITE_BASE}{href}")).await {
                Ok(profile) => metadata.creator = heading_text(&profile),
                Err(e) => warn!(id, error = %e, "Failed to fetch author profile"),
            }
        }

        metadata
    }
}

#[async_trait]
impl VideoHandler for AsciinemaHandler {
    fn name(&self) -> &'static str {
        "asciinema"
    }

    fn can_handle(&self, req: &VideoRequest) -> bool {
        self.rule.matches(&req.url)
    }

    async fn handle(&self, req: VideoRequest) -> Result<VideoResponse, HandlerError> {
        let id = recording_id(&req.url)?;
        let endpoint = self
            .aaas_endpoint
            .as_deref()
            .ok_or_else(|| HandlerError::Config("AAAS_ENDPOINT not set".to_string()))?;

        // Rendering is expensive; nothing to do with the result without a store
        self.toolkit.storage.ensure_connected()?;

        let gif_bytes = self.render_gif(endpoint, &id).await?;

        let workdir = tempfile::Builder::new()
            .prefix("ufys-cast-")
            .tempdir()
            .map_err(|e| HandlerError::Internal(format!("failed to create temp dir: {e}")))?;
        let gif = workdir.path().join("render.gif");
        let mp4 = workdir.path().join("render.mp4");

        tokio::fs::write(&gif, &gif_bytes)
            .await
            .map_err(|e| HandlerError::Internal(format!("failed to write render: {e}")))?;

        self.toolkit.media.convert_to_delivery_format(&gif, &mp4).await?;
        let dim = self.toolkit.media.probe(&mp4).await?;
        let metadata = self.scrape_metadata(&id).await;

        self.toolkit
            .reupload(&mp4, &req.fingerprint(), metadata, dim)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlersConfig;
    use crate::handlers::ErrorCode;
    use crate::storage::StorageClient;
    use std::sync::Arc;

    fn handler(endpoint: Option<&str>, storage: StorageClient) -> AsciinemaHandler {
        let toolkit = Toolkit::from_config(&HandlersConfig::default(), Arc::new(storage)).unwrap();
        AsciinemaHandler::new(toolkit, endpoint.map(str::to_string))
    }

    #[test]
    fn test_recording_id() {
        assert_eq!(recording_id("https://asciinema.org/a/abc123").unwrap(), "abc123");
        assert_eq!(recording_id("https://asciinema.org/a/42/").unwrap(), "42");
        assert!(recording_id("https://asciinema.org/~someone").is_err());
        assert!(recording_id("https://asciinema.org/a/").is_err());
        assert!(recording_id("https://asciinema.org/a/1/embed").is_err());
    }

    #[test]
    fn test_can_handle() {
        let h = handler(None, StorageClient::unavailable());
        assert!(h.can_handle(&VideoRequest::new("https://asciinema.org/a/abc123")));
        assert!(!h.can_handle(&VideoRequest::new("https://example.com/a/abc123")));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_config_error() {
        let h = handler(None, StorageClient::in_memory());
        let err = h
            .handle(VideoRequest::new("https://asciinema.org/a/abc123"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ConfigError);
        assert_eq!(err.to_string(), "AAAS_ENDPOINT not set");
    }

    #[tokio::test]
    async fn test_missing_endpoint_through_dispatcher() {
        use crate::config::WorkerConfig;
        use crate::handlers::{HandlerRegistry, Outcome};
        use crate::worker::Worker;

        let storage = Arc::new(StorageClient::unavailable());
        let toolkit = Toolkit::from_config(&HandlersConfig::default(), storage.clone()).unwrap();
        let registry = HandlerRegistry::new().with(Arc::new(AsciinemaHandler::new(toolkit, None)));
        let worker = Worker::new(registry, storage, &WorkerConfig::default());

        let outcomes = worker
            .handle_request(VideoRequest::new("https://asciinema.org/a/abc123"))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].error_code(), Some(ErrorCode::ConfigError));
        assert!(!outcomes.iter().any(Outcome::is_response));
    }

    #[tokio::test]
    async fn test_bad_path_is_parse_error() {
        let h = handler(Some("http://127.0.0.1:9/render"), StorageClient::in_memory());
        let err = h
            .handle(VideoRequest::new("https://asciinema.org/explore"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
    }

    #[tokio::test]
    async fn test_store_checked_before_rendering() {
        let h = handler(Some("http://127.0.0.1:9/render"), StorageClient::unavailable());
        let err = h
            .handle(VideoRequest::new("https://asciinema.org/a/abc123"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
    }

    #[test]
    fn test_scrape_helpers() {
        let page = r#"
<meta content="Tom &amp; Jerry demo" property="og:title">
<span class="author-avatar"><a href="/~tom"><img src="x.png"></a></span>
"#;
        assert_eq!(meta_property(page, "og:title").as_deref(), Some("Tom & Jerry demo"));
        assert_eq!(meta_property(page, "og:image"), None);
        assert_eq!(author_href(page).as_deref(), Some("/~tom"));

        let profile = "<h1 class=\"name\">\n  Tom Cat\n  <small>@tom</small></h1>";
        assert_eq!(heading_text(profile).as_deref(), Some("Tom Cat"));
    }
}
