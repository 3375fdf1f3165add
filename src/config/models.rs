use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5004))
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

/// Dispatcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Upper bound on handler invocations running at the same time
    #[serde(default = "default_max_inflight_handlers")]
    pub max_inflight_handlers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_inflight_handlers: default_max_inflight_handlers(),
        }
    }
}

fn default_max_inflight_handlers() -> usize {
    32
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// `host[:port]` without scheme
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default = "default_region")]
    pub region: String,
    /// Canonical public prefix for uploaded objects (e.g. a CDN)
    pub public_base_url: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// Secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: None,
            secure: default_secure(),
            region: default_region(),
            public_base_url: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_secure() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// Settings consumed by the extraction handlers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlersConfig {
    /// Rendering service turning terminal recordings into GIFs
    pub aaas_endpoint: Option<String>,
    /// Outbound proxy for handlers that need one
    pub proxy_url: Option<String>,
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl HandlersConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            aaas_endpoint: None,
            proxy_url: None,
            ytdlp_path: default_ytdlp_path(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_user_agent() -> String {
    format!("ufys/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    120
}
