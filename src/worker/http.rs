//! HTTP client shared by handlers: page fetches, API calls and streamed
//! downloads into scoped temporary storage

use bytes::Bytes;
use reqwest::{Client, Proxy, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            user_agent: format!("ufys/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// File fetched into its own temporary directory.
/// The directory and everything in it is removed on drop.
#[derive(Debug)]
pub struct TempDownload {
    dir: TempDir,
    path: PathBuf,
}

impl TempDownload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client, optionally routed through a proxy
    pub fn new(config: &HttpConfig, proxy_url: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = proxy_url {
            let proxy = Proxy::all(url)
                .map_err(|e| HttpError::InvalidUrl(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(self.client.get(url), url).await?;
        response.text().await.map_err(map_body_error)
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self.send(self.client.get(url), url).await?;
        response.bytes().await.map_err(map_body_error)
    }

    pub async fn post_bytes(&self, url: &str, body: Bytes) -> Result<Bytes> {
        let response = self.send(self.client.post(url).body(body), url).await?;
        response.bytes().await.map_err(map_body_error)
    }

    /// Stream `url` into `dest`, returning the number of bytes written
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.send(self.client.get(url), url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(map_body_error)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url, size = written, "Download completed");
        Ok(written)
    }

    /// Stream `url` into a fresh scoped temporary directory
    pub async fn download(&self, url: &str) -> Result<TempDownload> {
        let dir = tempfile::Builder::new().prefix("ufys-dl-").tempdir()?;
        let path = dir.path().join("video");
        self.download_to(url, &path).await?;
        Ok(TempDownload { dir, path })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Response> {
        debug!(url, "Sending request");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else if e.is_redirect() {
                HttpError::TooManyRedirects
            } else if e.is_builder() {
                HttpError::InvalidUrl(e.to_string())
            } else {
                HttpError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

fn map_body_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout
    } else {
        HttpError::RequestFailed(format!("Failed to read body: {}", e))
    }
}
