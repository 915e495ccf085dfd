/// Tubeproxy API Server
///
/// Looks up stream variants for a video URL through yt-dlp and relays
/// downloads of a chosen variant, with optional live progress events.
mod config;
mod errors;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use tubeproxy_downloader::progress::ProgressHub;
use tubeproxy_downloader::{Resolver, YtDlpResolver};

use config::Config;

/// Shared application state for all API handlers.
pub struct AppState {
    pub resolver: Arc<dyn Resolver>,
    pub progress: ProgressHub,
    pub chunk_size: usize,
    pub container: String,
}

impl AppState {
    pub fn new(resolver: Arc<dyn Resolver>, config: &Config) -> Self {
        Self {
            resolver,
            progress: ProgressHub::new(),
            chunk_size: config.chunk_size,
            container: config.container.clone(),
        }
    }
}

/// Build the HTTP router. Each endpoint is also mounted under its legacy path.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/get_video_info", post(routes::get_video_info))
        .route("/get_video_info", post(routes::get_video_info))
        .route("/api/video-info", post(routes::get_format_listing))
        .route("/api/download", get(routes::download))
        .route("/download", get(routes::download))
        .route("/api/download/progress/:id", get(routes::download_progress))
        .route("/download/progress/:id", get(routes::download_progress))
        .route("/api/health", get(routes::health))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubeproxy_api=info,tubeproxy_downloader=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    info!(
        "Config: container={} chunk_size={} resolve_timeout={}s",
        config.container, config.chunk_size, config.resolve_timeout_secs
    );

    let resolver = YtDlpResolver::discover(config.ytdlp_path.as_deref(), config.resolve_timeout_secs)
        .context("yt-dlp is required; install it or set YTDLP_PATH")?;
    let resolver: Arc<dyn Resolver> = Arc::new(resolver);
    info!("Resolver: {}", resolver.id());

    let state = Arc::new(AppState::new(resolver, &config));
    let app = router(state);

    // Bind
    let addr = config.bind_addr();
    info!("Tubeproxy API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
