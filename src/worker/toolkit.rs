//! Owned resources handed to every handler at construction

use std::path::Path;
use std::sync::Arc;

use super::http::{HttpClient, HttpConfig, HttpError};
use super::media::MediaTools;
use crate::config::HandlersConfig;
use crate::handlers::{Dimensions, HandlerError, ResponseMetadata, VideoResponse};
use crate::storage::StorageClient;

#[derive(Clone)]
pub struct Toolkit {
    pub http: HttpClient,
    /// Same as `http`, routed through the configured outbound proxy if any
    pub proxied_http: HttpClient,
    pub media: MediaTools,
    pub storage: Arc<StorageClient>,
}

impl Toolkit {
    pub fn new(
        http: HttpClient,
        proxied_http: HttpClient,
        media: MediaTools,
        storage: Arc<StorageClient>,
    ) -> Self {
        Self {
            http,
            proxied_http,
            media,
            storage,
        }
    }

    pub fn from_config(
        config: &HandlersConfig,
        storage: Arc<StorageClient>,
    ) -> Result<Self, HttpError> {
        let http_config = HttpConfig {
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            ..HttpConfig::default()
        };

        let http = HttpClient::new(&http_config, None)?;
        let proxied_http = match config.proxy_url.as_deref() {
            Some(proxy) => HttpClient::new(&http_config, Some(proxy))?,
            None => http.clone(),
        };
        let media = MediaTools::new(&config.ffmpeg_path, &config.ffprobe_path);

        Ok(Self::new(http, proxied_http, media, storage))
    }

    /// Download `url` to a scoped temp file and probe it
    pub async fn dimensions_from_url(&self, url: &str) -> Result<Dimensions, HandlerError> {
        let download = self.http.download(url).await?;
        Ok(self.media.probe(download.path()).await?)
    }

    /// Push `path` to the object store under `fingerprint` and describe the result
    pub async fn reupload(
        &self,
        path: &Path,
        fingerprint: &str,
        metadata: ResponseMetadata,
        dim: Dimensions,
    ) -> Result<VideoResponse, HandlerError> {
        let url = self.storage.upload_file(path, fingerprint).await?;
        Ok(VideoResponse::reuploaded(metadata, url, dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reupload_builds_response() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("render.mp4");
        std::fs::write(&file, b"video").unwrap();

        let storage = Arc::new(StorageClient::in_memory());
        let toolkit = Toolkit::from_config(&HandlersConfig::default(), storage).unwrap();

        let meta = ResponseMetadata {
            title: Some("demo".to_string()),
            ..Default::default()
        };
        let response = toolkit
            .reupload(&file, "abc", meta, Dimensions { width: 2, height: 4 })
            .await
            .unwrap();

        assert!(response.reuploaded);
        assert_eq!(response.video_url, "http://localhost:9000/ufys-local/abc.mp4");
        assert_eq!((response.width, response.height), (2, 4));
        assert_eq!(response.metadata.title.as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn test_reupload_without_store() {
        let toolkit = Toolkit::from_config(
            &HandlersConfig::default(),
            Arc::new(StorageClient::unavailable()),
        )
        .unwrap();

        let err = toolkit
            .reupload(
                Path::new("/nonexistent/render.mp4"),
                "abc",
                ResponseMetadata::default(),
                Dimensions { width: 2, height: 2 },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), crate::handlers::ErrorCode::StoreUnavailable);
    }
}
