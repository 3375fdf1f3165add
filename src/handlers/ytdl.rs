//! Generic extraction backed by the `yt-dlp` command line tool

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::traits::{HandlerError, UrlMatch, VideoHandler};
use super::types::{Dimensions, ResponseMetadata, VideoRequest, VideoResponse};
use crate::worker::Toolkit;

/// Playlists may point at other pages; stop following them after this many hops
const MAX_PLAYLIST_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yt-dlp failed to download this video: {0}")]
    Failed(String),

    #[error("unreadable extractor output: {0}")]
    InvalidOutput(String),
}

impl From<ExtractorError> for HandlerError {
    fn from(err: ExtractorError) -> Self {
        match err {
            ExtractorError::InvalidOutput(_) => HandlerError::Parse(err.to_string()),
            _ => HandlerError::Download(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    pub url: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistEntry {
    pub url: Option<String>,
    pub original_url: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedDownload {
    pub filepath: Option<PathBuf>,
    pub width: Option<u64>,
    pub height: Option<u64>,
}

/// Subset of the extractor's info document the handler reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub extractor_key: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
    #[serde(default)]
    pub entries: Vec<PlaylistEntry>,
    #[serde(default)]
    pub requested_downloads: Vec<RequestedDownload>,
}

impl MediaInfo {
    pub fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            title: self.title.clone(),
            creator: self.uploader.clone(),
            site: self
                .extractor_key
                .clone()
                .filter(|key| key != "Generic"),
        }
    }
}

/// Resolves page URLs into media information
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Inspect `url` without downloading anything
    async fn extract_info(&self, url: &str) -> Result<MediaInfo, ExtractorError>;

    /// Download the best rendition of `url` into `dir`
    async fn download(&self, url: &str, dir: &Path) -> Result<MediaInfo, ExtractorError>;
}

pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&OsStr]) -> Result<MediaInfo, ExtractorError> {
        let output = Command::new(&self.binary)
            .args(["--dump-single-json", "--no-warnings", "--no-progress"])
            .args(["--playlist-items", "1"])
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractorError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(ExtractorError::Failed(reason));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractorError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn extract_info(&self, url: &str) -> Result<MediaInfo, ExtractorError> {
        debug!(url, "Extracting media info");
        self.run(&[OsStr::new("--"), OsStr::new(url)]).await
    }

    async fn download(&self, url: &str, dir: &Path) -> Result<MediaInfo, ExtractorError> {
        debug!(url, dir = %dir.display(), "Downloading media");
        self.run(&[
            OsStr::new("--no-simulate"),
            OsStr::new("--paths"),
            dir.as_os_str(),
            OsStr::new("--output"),
            OsStr::new("%(id)s.%(ext)s"),
            OsStr::new("--"),
            OsStr::new(url),
        ])
        .await
    }
}

fn is_h264(vcodec: &str) -> bool {
    vcodec == "h264" || vcodec.starts_with("avc1")
}

/// Best directly linkable format: h264 video with audio in an mp4 container.
/// Formats are listed worst to best.
pub fn select_format(formats: &[MediaFormat]) -> Option<(&MediaFormat, &str)> {
    formats.iter().rev().find_map(|fmt| {
        let acodec = fmt.acodec.as_deref()?;
        let vcodec = fmt.vcodec.as_deref()?;
        let url = fmt.url.as_deref().filter(|u| !u.is_empty())?;

        let usable = acodec != "none" && is_h264(vcodec) && fmt.ext.as_deref() == Some("mp4");
        usable.then_some((fmt, url))
    })
}

/// Catch-all handler: links directly when a usable format exists,
/// otherwise downloads and re-uploads
pub struct YtdlHandler {
    rule: UrlMatch,
    extractor: Arc<dyn Extractor>,
    toolkit: Toolkit,
}

impl YtdlHandler {
    pub fn new(toolkit: Toolkit, extractor: Arc<dyn Extractor>) -> Self {
        let any = Regex::new(".*").expect("static regex");
        Self {
            rule: UrlMatch::pattern(any),
            extractor,
            toolkit,
        }
    }

    async fn handle_video(
        &self,
        req: &VideoRequest,
        info: &MediaInfo,
    ) -> Result<VideoResponse, HandlerError> {
        if let Some((fmt, url)) = select_format(&info.formats) {
            debug!(format_id = ?fmt.format_id, "Linking format directly");
            let known = Dimensions::from_parts(fmt.width, fmt.height);
            return self.handle_direct_url(url, known, info).await;
        }

        self.reupload(req).await
    }

    async fn handle_direct_url(
        &self,
        url: &str,
        known: Option<Dimensions>,
        info: &MediaInfo,
    ) -> Result<VideoResponse, HandlerError> {
        let dim = match known.or_else(|| Dimensions::from_parts(info.width, info.height)) {
            Some(dim) => dim,
            None => self.toolkit.dimensions_from_url(url).await?,
        };

        Ok(VideoResponse::direct(info.metadata(), url.to_string(), dim))
    }

    async fn reupload(&self, req: &VideoRequest) -> Result<VideoResponse, HandlerError> {
        // Downloads are expensive; fail before starting one
        self.toolkit.storage.ensure_connected()?;

        let workdir = tempfile::Builder::new()
            .prefix("ufys-ytdl-")
            .tempdir()
            .map_err(|e| HandlerError::Internal(format!("failed to create temp dir: {e}")))?;

        let info = self.extractor.download(&req.url, workdir.path()).await?;

        let [download] = info.requested_downloads.as_slice() else {
            return Err(HandlerError::Assertion(format!(
                "expected exactly one download, got {}",
                info.requested_downloads.len()
            )));
        };
        let path = download
            .filepath
            .as_deref()
            .ok_or_else(|| HandlerError::Assertion("download has no file path".to_string()))?;

        let dim = match Dimensions::from_parts(download.width, download.height) {
            Some(dim) => dim,
            None => self.toolkit.media.probe(path).await?,
        };

        info!(path = %path.display(), "Re-uploading download");
        self.toolkit
            .reupload(path, &req.fingerprint(), info.metadata(), dim)
            .await
    }
}

#[async_trait]
impl VideoHandler for YtdlHandler {
    fn name(&self) -> &'static str {
        "ytdl"
    }

    fn can_handle(&self, req: &VideoRequest) -> bool {
        self.rule.matches(&req.url)
    }

    async fn handle(&self, req: VideoRequest) -> Result<VideoResponse, HandlerError> {
        let mut req = req;

        for depth in 0..=MAX_PLAYLIST_DEPTH {
            let info = self.extractor.extract_info(&req.url).await?;

            match info.kind.as_deref().unwrap_or("video") {
                "video" => return self.handle_video(&req, &info).await,
                "playlist" => {
                    let entry = info.entries.first().ok_or(HandlerError::EmptyPlaylist)?;

                    if let Some(url) = entry.url.as_deref().filter(|u| !u.is_empty()) {
                        let known = Dimensions::from_parts(entry.width, entry.height);
                        return self.handle_direct_url(url, known, &info).await;
                    }

                    match entry.original_url.as_deref().filter(|u| !u.is_empty()) {
                        Some(next) => {
                            debug!(depth, next, "Following playlist entry");
                            req = req.redirected(next);
                        }
                        None => return Err(HandlerError::UnknownPlaylist),
                    }
                }
                other => return Err(HandlerError::UnknownType(other.to_string())),
            }
        }

        Err(HandlerError::UnknownPlaylist)
    }
}
