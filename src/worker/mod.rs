//! Request dispatcher
//!
//! Runs every matching handler as its own task, bounded by a worker-wide
//! semaphore, and reconciles their outcomes into the reply.

pub mod http;
pub mod media;
pub mod toolkit;

pub use toolkit::Toolkit;

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::handlers::{
    ErrorCode, HandlerRegistry, Outcome, VideoError, VideoHandler, VideoRequest,
};
use crate::observability::Metrics;
use crate::storage::StorageClient;

/// Keep responses if any exist, otherwise every error as-is.
/// Input order is preserved in both cases.
pub fn reconcile(outcomes: Vec<Outcome>) -> Vec<Outcome> {
    if outcomes.is_empty() {
        return vec![VideoError::no_handler().into()];
    }

    if outcomes.iter().any(Outcome::is_response) {
        outcomes.into_iter().filter(Outcome::is_response).collect()
    } else {
        outcomes
    }
}

#[derive(Clone)]
pub struct Worker {
    registry: Arc<HandlerRegistry>,
    storage: Arc<StorageClient>,
    limiter: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl Worker {
    pub fn new(registry: HandlerRegistry, storage: Arc<StorageClient>, config: &WorkerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            storage,
            limiter: Arc::new(Semaphore::new(config.max_inflight_handlers)),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run all matching handlers for `req` and reconcile their outcomes.
    /// The result is never empty.
    pub async fn handle_request(&self, req: VideoRequest) -> Vec<Outcome> {
        let span = info_span!("dispatch", request_id = %Uuid::now_v7(), url = %req.url);
        self.dispatch(req).instrument(span).await
    }

    async fn dispatch(&self, req: VideoRequest) -> Vec<Outcome> {
        self.metrics.request_dispatched();

        let matched = self.registry.matching(&req);
        if matched.is_empty() {
            info!("No handler accepts this url");
            self.metrics.request_failed();
            return vec![VideoError::no_handler().into()];
        }

        debug!(
            handlers = ?matched.iter().map(|h| h.name()).collect::<Vec<_>>(),
            "Dispatching"
        );

        let tasks: Vec<(&'static str, JoinHandle<Outcome>)> = matched
            .into_iter()
            .map(|handler| {
                let name = handler.name();
                let span = info_span!("handler", name);
                let task = run_handler(handler, req.clone(), self.limiter.clone());
                (name, tokio::spawn(task.instrument(span)))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    error!(handler = name, "Handler panicked");
                    self.metrics.handler_panicked();
                    VideoError::assertion().into()
                }
                Err(e) => {
                    error!(handler = name, error = %e, "Handler task did not complete");
                    VideoError::new(ErrorCode::InternalError, e.to_string()).into()
                }
            };
            outcomes.push(outcome);
        }

        let outcomes = reconcile(outcomes);
        if outcomes.iter().any(Outcome::is_response) {
            self.metrics.request_succeeded();
        } else {
            self.metrics.request_failed();
        }

        outcomes
    }
}

async fn run_handler(
    handler: Arc<dyn VideoHandler>,
    req: VideoRequest,
    limiter: Arc<Semaphore>,
) -> Outcome {
    let Ok(_permit) = limiter.acquire_owned().await else {
        return VideoError::new(ErrorCode::InternalError, "dispatcher is shutting down").into();
    };

    match handler.handle(req).await {
        Ok(response) => {
            info!(
                video_url = %response.video_url,
                reuploaded = response.reuploaded,
                "Handler succeeded"
            );
            Outcome::Response(response)
        }
        Err(e) => {
            warn!(code = %e.code(), error = %e, "Handler failed");
            Outcome::Error(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{
        Dimensions, HandlerError, ResponseMetadata, UrlMatch, VideoResponse,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    enum Behaviour {
        Succeed(&'static str),
        Fail(fn() -> HandlerError),
        Panic,
        Rendezvous(Arc<Barrier>),
    }

    struct FakeHandler {
        name: &'static str,
        rule: UrlMatch,
        delay: Duration,
        behaviour: Behaviour,
        calls: AtomicUsize,
        running: Option<Arc<(AtomicUsize, AtomicUsize)>>,
    }

    impl FakeHandler {
        fn new(name: &'static str, behaviour: Behaviour) -> Self {
            Self {
                name,
                rule: UrlMatch::hostnames(["video.test"]),
                delay: Duration::ZERO,
                behaviour,
                calls: AtomicUsize::new(0),
                running: None,
            }
        }

        fn delayed(mut self, ms: u64) -> Self {
            self.delay = Duration::from_millis(ms);
            self
        }

        fn on_host(mut self, host: &str) -> Self {
            self.rule = UrlMatch::hostnames([host]);
            self
        }
    }

    #[async_trait]
    impl VideoHandler for FakeHandler {
        fn name(&self) -> &'static str {
            self.name
        }

        fn can_handle(&self, req: &VideoRequest) -> bool {
            self.rule.matches(&req.url)
        }

        async fn handle(&self, _req: VideoRequest) -> Result<VideoResponse, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(gauge) = &self.running {
                let now = gauge.0.fetch_add(1, Ordering::SeqCst) + 1;
                gauge.1.fetch_max(now, Ordering::SeqCst);
            }
            tokio::time::sleep(self.delay).await;
            if let Some(gauge) = &self.running {
                gauge.0.fetch_sub(1, Ordering::SeqCst);
            }

            match &self.behaviour {
                Behaviour::Succeed(url) => Ok(VideoResponse::direct(
                    ResponseMetadata::default(),
                    url.to_string(),
                    Dimensions { width: 16, height: 9 },
                )),
                Behaviour::Fail(make) => Err(make()),
                Behaviour::Panic => panic!("handler exploded"),
                Behaviour::Rendezvous(barrier) => {
                    barrier.wait().await;
                    Ok(VideoResponse::direct(
                        ResponseMetadata::default(),
                        self.name.to_string(),
                        Dimensions { width: 1, height: 1 },
                    ))
                }
            }
        }
    }

    fn worker(handlers: Vec<Arc<dyn VideoHandler>>, max_inflight: usize) -> Worker {
        let mut registry = HandlerRegistry::new();
        for h in handlers {
            registry.register(h);
        }
        let config = WorkerConfig {
            max_inflight_handlers: max_inflight,
        };
        Worker::new(registry, Arc::new(StorageClient::unavailable()), &config)
    }

    fn codes(outcomes: &[Outcome]) -> Vec<Option<ErrorCode>> {
        outcomes.iter().map(Outcome::error_code).collect()
    }

    fn urls(outcomes: &[Outcome]) -> Vec<String> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Response(r) => Some(r.video_url.clone()),
                Outcome::Error(_) => None,
            })
            .collect()
    }

    const URL: &str = "https://video.test/clip";

    #[test]
    fn test_reconcile_rules() {
        let ok: Outcome = VideoResponse::direct(
            ResponseMetadata::default(),
            "u".to_string(),
            Dimensions { width: 1, height: 1 },
        )
        .into();
        let err: Outcome = VideoError::new(ErrorCode::ParseError, "x").into();

        assert_eq!(codes(&reconcile(vec![])), vec![Some(ErrorCode::NoHandler)]);
        assert_eq!(reconcile(vec![err.clone(), ok.clone()]), vec![ok.clone()]);
        assert_eq!(reconcile(vec![err.clone(), err.clone()]).len(), 2);
    }

    #[tokio::test]
    async fn test_no_matching_handler() {
        let w = worker(
            vec![Arc::new(FakeHandler::new("a", Behaviour::Succeed("x")).on_host("other.test"))],
            4,
        );
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(codes(&outcomes), vec![Some(ErrorCode::NoHandler)]);
        assert_eq!(w.metrics().snapshot().requests_failed, 1);
    }

    #[tokio::test]
    async fn test_success_hides_errors() {
        let w = worker(
            vec![
                Arc::new(FakeHandler::new("a", Behaviour::Fail(|| HandlerError::EmptyPlaylist))),
                Arc::new(FakeHandler::new("b", Behaviour::Succeed("https://cdn/b.mp4"))),
            ],
            4,
        );
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(urls(&outcomes), vec!["https://cdn/b.mp4"]);
        assert_eq!(w.metrics().snapshot().requests_succeeded, 1);
    }

    #[tokio::test]
    async fn test_errors_keep_registration_order() {
        let w = worker(
            vec![
                Arc::new(
                    FakeHandler::new("slow", Behaviour::Fail(|| HandlerError::UnknownPlaylist))
                        .delayed(50),
                ),
                Arc::new(FakeHandler::new("fast", Behaviour::Fail(|| {
                    HandlerError::Parse("bad page".to_string())
                }))),
            ],
            4,
        );
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(
            codes(&outcomes),
            vec![Some(ErrorCode::UnknownPlaylist), Some(ErrorCode::ParseError)]
        );
    }

    #[tokio::test]
    async fn test_responses_keep_registration_order() {
        let w = worker(
            vec![
                Arc::new(FakeHandler::new("a", Behaviour::Succeed("https://cdn/a")).delayed(40)),
                Arc::new(FakeHandler::new("b", Behaviour::Fail(|| HandlerError::EmptyPlaylist))),
                Arc::new(FakeHandler::new("c", Behaviour::Succeed("https://cdn/c"))),
            ],
            4,
        );
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(urls(&outcomes), vec!["https://cdn/a", "https://cdn/c"]);
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let w = worker(
            vec![
                Arc::new(FakeHandler::new("boom", Behaviour::Panic)),
                Arc::new(FakeHandler::new("ok", Behaviour::Succeed("https://cdn/ok"))),
            ],
            4,
        );
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(urls(&outcomes), vec!["https://cdn/ok"]);
        assert_eq!(w.metrics().snapshot().handler_panics, 1);
    }

    #[tokio::test]
    async fn test_panic_reported_as_assertion_error() {
        let w = worker(
            vec![
                Arc::new(FakeHandler::new("boom", Behaviour::Panic)),
                Arc::new(FakeHandler::new("cfg", Behaviour::Fail(|| {
                    HandlerError::Config("AAAS_ENDPOINT not set".to_string())
                }))),
            ],
            4,
        );
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(
            codes(&outcomes),
            vec![Some(ErrorCode::AssertionError), Some(ErrorCode::ConfigError)]
        );
    }

    #[tokio::test]
    async fn test_non_matching_handlers_not_invoked() {
        let skipped = Arc::new(FakeHandler::new("skip", Behaviour::Panic).on_host("elsewhere.test"));
        let w = worker(
            vec![
                skipped.clone() as Arc<dyn VideoHandler>,
                Arc::new(FakeHandler::new("ok", Behaviour::Succeed("https://cdn/ok"))),
            ],
            4,
        );
        w.handle_request(VideoRequest::new(URL)).await;
        assert_eq!(skipped.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handlers_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let w = worker(
            vec![
                Arc::new(FakeHandler::new("a", Behaviour::Rendezvous(barrier.clone()))),
                Arc::new(FakeHandler::new("b", Behaviour::Rendezvous(barrier))),
            ],
            4,
        );

        let outcomes = tokio::time::timeout(
            Duration::from_secs(5),
            w.handle_request(VideoRequest::new(URL)),
        )
        .await
        .expect("handlers should meet at the barrier");
        assert_eq!(urls(&outcomes), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_inflight_limit() {
        let gauge = Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)));
        let handlers: Vec<Arc<dyn VideoHandler>> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let mut h = FakeHandler::new(name, Behaviour::Succeed("https://cdn/x")).delayed(20);
                h.running = Some(gauge.clone());
                Arc::new(h) as Arc<dyn VideoHandler>
            })
            .collect();

        let w = worker(handlers, 1);
        let outcomes = w.handle_request(VideoRequest::new(URL)).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(gauge.1.load(Ordering::SeqCst), 1);
    }
}
