//! Axum router construction.
//!
//! Assembles all routes (REST + SSE) into a single [`Router`] with CORS
//! middleware enabled so the stream can be consumed cross-origin.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::sse;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- live text page
/// - `GET /api/events` -- SSE text update stream
/// - `POST /api/update` -- replace the text
/// - `GET /api/text` -- current text
/// - `GET /api/stats` -- connected viewer diagnostics
///
/// CORS allows any origin, matching the public demo deployment.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Page
        .route("/", get(handlers::index))
        // SSE
        .route("/api/events", get(sse::events))
        // REST API
        .route("/api/update", post(handlers::update_text))
        .route("/api/text", get(handlers::get_text))
        .route("/api/stats", get(handlers::get_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
