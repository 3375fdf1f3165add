use std::sync::Arc;

use super::asciinema::AsciinemaHandler;
use super::instagram::InstagramHandler;
use super::traits::VideoHandler;
use super::types::VideoRequest;
use super::ytdl::{YtDlp, YtdlHandler};
use crate::config::HandlersConfig;
use crate::worker::Toolkit;

/// Ordered list of handlers. Registration order is the order in which
/// outcomes are reported, never a priority filter.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn VideoHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn VideoHandler>) {
        self.handlers.push(handler);
    }

    pub fn with(mut self, handler: Arc<dyn VideoHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Handlers accepting `req`, in registration order
    pub fn matching(&self, req: &VideoRequest) -> Vec<Arc<dyn VideoHandler>> {
        self.handlers
            .iter()
            .filter(|h| h.can_handle(req))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Built-in handlers; the catch-all extractor goes last
    pub fn with_defaults(toolkit: Toolkit, config: &HandlersConfig) -> Self {
        let extractor = Arc::new(YtDlp::new(&config.ytdlp_path));

        Self::new()
            .with(Arc::new(InstagramHandler::new(toolkit.clone())))
            .with(Arc::new(AsciinemaHandler::new(
                toolkit.clone(),
                config.aaas_endpoint.clone(),
            )))
            .with(Arc::new(YtdlHandler::new(toolkit, extractor)))
    }
}
