//! Wire models for the HTTP front end
//!
//! `POST /video` accepts a [`VideoRequestBody`]:
//!
//! ```json
//! { "url": "https://asciinema.org/a/335480" }
//! ```
//!
//! and answers with a list of outcomes, each tagged with `type`:
//!
//! ```json
//! [
//!   {
//!     "type": "response",
//!     "title": "demo", "creator": "someone", "site": "asciinema",
//!     "video_url": "https://media.example.com/ufys/3f2a....mp4",
//!     "width": 1280, "height": 720, "reuploaded": true
//!   }
//! ]
//! ```
//!
//! Error outcomes carry `code` and `message` instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::observability::MetricsSnapshot;

#[derive(Debug, Clone, Deserialize)]
pub struct VideoRequestBody {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub handlers: Vec<&'static str>,
    pub max_inflight_handlers: usize,
    pub storage_connected: bool,
    pub metrics: MetricsSnapshot,
}
