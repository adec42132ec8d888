//! Ingestion endpoints.
//!
//! The response goes out as soon as validation, authorization, and the
//! rate-limit check pass; persistence and usage accounting complete as
//! deferred tasks. A 200 is an accepted-for-processing acknowledgement,
//! not a durability guarantee.

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use tracing::debug;

use beacon_core::{BatchRequest, TrackRequest};

use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub ok: bool,
    pub count: usize,
}

/// POST /track - ingest a single event.
pub async fn track_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TrackResponse>, ApiError> {
    let req: TrackRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON: {}", e)))?;

    let accepted = state.pipeline.track(req).await.map_err(ApiError::from)?;
    debug!(count = accepted.count, "event accepted");
    state.run_deferred(accepted.deferred).await;

    Ok(Json(TrackResponse { ok: true }))
}

/// POST /track/batch - ingest up to 100 events in one request.
pub async fn track_batch_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchResponse>, ApiError> {
    let req: BatchRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON: {}", e)))?;

    let accepted = state.pipeline.track_batch(req).await.map_err(ApiError::from)?;
    debug!(count = accepted.count, "batch accepted");
    let count = accepted.count;
    state.run_deferred(accepted.deferred).await;

    Ok(Json(BatchResponse { ok: true, count }))
}
