use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

use super::traits::{HandlerError, UrlMatch, VideoHandler};
use super::types::{Dimensions, ResponseMetadata, VideoRequest, VideoResponse};
use crate::worker::Toolkit;

static LD_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("static regex")
});

/// Video located in a page's structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedVideo {
    pub url: String,
    pub dim: Option<Dimensions>,
    pub metadata: ResponseMetadata,
}

/// Find the embedded `application/ld+json` block and the video it describes
pub fn extract_video(html: &str) -> Result<ScrapedVideo, HandlerError> {
    let blocks: Vec<&str> = LD_JSON
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    if blocks.is_empty() {
        return Err(HandlerError::NoDataElement(
            "page contains no structured data element".to_string(),
        ));
    }

    for block in blocks {
        let Ok(value) = serde_json::from_str::<Value>(block.trim()) else {
            debug!("Skipping unparsable structured data block");
            continue;
        };

        if let Some((video, url)) = find_video_object(&value) {
            return Ok(ScrapedVideo {
                url: url.to_string(),
                dim: Dimensions::from_parts(lenient_u64(video.get("width")), lenient_u64(video.get("height"))),
                metadata: ResponseMetadata {
                    title: first_str(video, &["caption", "name", "description"]),
                    creator: video.get("author").and_then(author_name),
                    site: Some("Instagram".to_string()),
                },
            });
        }
    }

    Err(HandlerError::Parse(
        "structured data does not describe a video".to_string(),
    ))
}

/// First `VideoObject` with a string `contentUrl`, searched depth-first
fn find_video_object(value: &Value) -> Option<(&Map<String, Value>, &str)> {
    match value {
        Value::Object(map) => video_content_url(map)
            .map(|url| (map, url))
            .or_else(|| map.values().find_map(find_video_object)),
        Value::Array(items) => items.iter().find_map(find_video_object),
        _ => None,
    }
}

fn video_content_url(map: &Map<String, Value>) -> Option<&str> {
    let typed = match map.get("@type") {
        Some(Value::String(t)) => t == "VideoObject",
        Some(Value::Array(types)) => types.iter().any(|t| t == "VideoObject"),
        _ => false,
    };
    map.get("contentUrl").and_then(Value::as_str).filter(|_| typed)
}

fn author_name(author: &Value) -> Option<String> {
    match author {
        Value::Object(map) => first_str(map, &["alternateName", "name"]),
        Value::Array(items) => items.iter().find_map(author_name),
        Value::String(name) => Some(name.clone()),
        _ => None,
    }
}

fn first_str(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Structured data carries sizes as numbers or numeric strings
fn lenient_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Scrapes the post page of a social network for its embedded video
pub struct InstagramHandler {
    rule: UrlMatch,
    toolkit: Toolkit,
}

impl InstagramHandler {
    pub fn new(toolkit: Toolkit) -> Self {
        Self {
            rule: UrlMatch::hostnames(["instagram.com", "www.instagram.com"]),
            toolkit,
        }
    }
}

#[async_trait]
impl VideoHandler for InstagramHandler {
    fn name(&self) -> &'static str {
        "instagram"
    }

    fn can_handle(&self, req: &VideoRequest) -> bool {
        self.rule.matches(&req.url)
    }

    async fn handle(&self, req: VideoRequest) -> Result<VideoResponse, HandlerError> {
        let html = self.toolkit.proxied_http.get_text(&req.url).await?;
        let scraped = extract_video(&html)?;

        let dim = match scraped.dim {
            Some(dim) => dim,
            None => self.toolkit.dimensions_from_url(&scraped.url).await?,
        };

        Ok(VideoResponse::direct(scraped.metadata, scraped.url, dim))
    }
}
