//! API routes.

pub mod health;
pub mod query;
pub mod track;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use beacon_core::limits::MAX_BODY_BYTES;

use crate::state::AppState;

/// Creates the API router. CORS is enabled on all routes; the CORS
/// layer answers OPTIONS pre-flights with headers only.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/track", post(track::track_handler))
        .route("/track/batch", post(track::track_batch_handler))
        .route("/stats", get(query::stats_handler))
        .route("/events", get(query::events_handler))
        .route("/query", post(query::query_handler))
        .route("/properties", get(query::properties_handler))
        .route("/health", get(health::health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
