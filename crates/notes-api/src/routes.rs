//! Router setup with all API routes and middleware.

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use notes_core::config::NotesConfig;
use notes_core::error::{NotesError, Result};

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // The dashboard is served from localhost on the API port or the next one.
    let port = state.config.monitor.port;
    let origins: Vec<HeaderValue> = [port, port.saturating_add(1)]
        .iter()
        .flat_map(|p| {
            [
                format!("http://127.0.0.1:{}", p),
                format!("http://localhost:{}", p),
            ]
        })
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/all", get(handlers::health_all))
        .route("/count", get(handlers::count))
        .route("/count/html", get(handlers::count_html))
        .route("/stats", get(handlers::stats))
        .route("/backend", get(handlers::backend))
        .route("/backend/switch", post(handlers::switch_backend))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C, then close the active backend.
///
/// Binds to 127.0.0.1 (localhost only) on the configured port.
pub async fn start_server(config: &NotesConfig, state: AppState) -> Result<()> {
    let addr = format!("127.0.0.1:{}", config.monitor.port);
    let selector = state.selector.clone();
    let router = create_router(state);

    tracing::info!("Starting monitoring API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NotesError::Connection(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
        })
        .await
        .map_err(|e| NotesError::Backend(format!("Server error: {}", e)))?;

    selector.shutdown().await
}
