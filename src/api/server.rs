use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info};

use super::{
    error::ApiError,
    services::{health, stats, submit_video},
    state::AppState,
};
use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::storage::StorageClient;
use crate::worker::{Toolkit, Worker};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/video", post(submit_video))
        .route("/health", get(health))
        .route("/operators/stats", get(stats))
        .with_state(state)
        // gzip request bodies are decoded before the size limit applies
        .layer(RequestDecompressionLayer::new())
        .layer(CatchPanicLayer::custom(request_panicked))
}

/// Handler tasks are isolated by the dispatcher; anything else that panics
/// while serving a request ends up here
fn request_panicked(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    error!(panic = %detail, "Request processing panicked");

    ApiError::Panicked.into_response()
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    // A missing store degrades the service instead of stopping it
    let storage = Arc::new(StorageClient::connect(&config.storage).await);

    let toolkit = Toolkit::from_config(&config.handlers, storage.clone())
        .map_err(|e| format!("Failed to build HTTP clients: {e}"))?;
    let registry = HandlerRegistry::with_defaults(toolkit, &config.handlers);
    info!(handlers = ?registry.names(), "Handlers registered");

    let worker = Worker::new(registry, storage, &config.worker);
    let app = router(AppState::new(config, worker));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "ufys listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
