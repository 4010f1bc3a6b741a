use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::accounting;
use crate::AppState;

/// Builds the full Axum `Router`.
///
/// Routing happens *inside* the accounting layer so that an internal
/// redirect is dispatched through the routes again.
pub fn create_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        // ── Workload endpoints ──────────────────────────────────
        .route("/api/work/:iterations", get(handlers::work::burn_cpu))
        .route("/api/redirect/:hops", get(handlers::redirect::redirect_hops))
        .route("/api/child/:count", get(handlers::child::spawn_children))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        .route("/api/metrics/reset", post(stream::reset_metrics))
        .with_state(state.clone())
        // ── Serve the static dashboard directory ────────────────
        .fallback_service(ServeDir::new(&state.config.static_dir));

    Router::new()
        .fallback_service(routes)
        .layer(axum_mw::from_fn_with_state(
            state,
            accounting::accounting_middleware,
        ))
        .layer(CorsLayer::permissive())
}
