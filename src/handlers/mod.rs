//! Extraction strategies for video URLs
//!
//! Every strategy implements [`VideoHandler`]: a cheap URL predicate plus an
//! async `handle` that produces either a [`VideoResponse`] or a
//! [`HandlerError`]. Strategies are held in a [`HandlerRegistry`] in
//! registration order; the dispatcher in [`crate::worker`] runs all the ones
//! that match and reconciles their outcomes.
//!
//! ## Built-in strategies
//!
//! - [`InstagramHandler`] - reads the `application/ld+json` block of a post page
//! - [`AsciinemaHandler`] - renders terminal recordings and re-uploads them as MP4
//! - [`YtdlHandler`] - catch-all backed by `yt-dlp`, registered last
//!
//! ## Example
//!
//! ```rust,ignore
//! use ufys::handlers::{HandlerRegistry, VideoRequest};
//!
//! let registry = HandlerRegistry::with_defaults(toolkit, &config.handlers);
//! let matched = registry.matching(&VideoRequest::new("https://asciinema.org/a/1"));
//! ```

pub mod asciinema;
pub mod instagram;
mod registry;
mod traits;
pub(crate) mod types;
pub mod ytdl;

pub use asciinema::AsciinemaHandler;
pub use instagram::InstagramHandler;
pub use registry::HandlerRegistry;
pub use traits::{HandlerError, UrlMatch, VideoHandler};
pub use types::{
    Dimensions, ErrorCode, Outcome, ResponseMetadata, VideoError, VideoRequest, VideoResponse,
};
pub use ytdl::{Extractor, YtDlp, YtdlHandler};
