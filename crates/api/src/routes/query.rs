//! Read endpoints: stats overview, raw events, allowlisted queries,
//! and property discovery. All require a read key and account
//! `usage.read_count` best-effort.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use beacon_core::limits::DEFAULT_WINDOW_DAYS;
use beacon_engine::{today_utc, DateWindow, EventsQuery, Granularity, PropertySummary, QueryRequest,
    QueryResponse, StatsResponse};

use crate::extractors::ReadAuth;
use crate::response::ApiError;
use crate::state::AppState;

fn today_str() -> String {
    today_utc().format("%Y-%m-%d").to_string()
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub project: Option<String>,
    pub days: Option<u32>,
    /// Epoch milliseconds; wins over `days` when both are present.
    pub since: Option<i64>,
    /// Series granularity: hour/day/week/month.
    #[serde(rename = "groupBy", alias = "granularity")]
    pub group_by: Option<String>,
}

/// GET /stats - the fixed overview shape.
pub async fn stats_handler(
    State(state): State<AppState>,
    auth: ReadAuth,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let project_id = auth.scope(params.project.as_deref())?;
    state.check_read_limit(&auth.access, &today_str()).await?;

    let today = today_utc();
    let window = match params.since {
        Some(since) => DateWindow::since_ms(since, today)?,
        None => DateWindow::last_days(params.days.unwrap_or(DEFAULT_WINDOW_DAYS), today),
    };
    let granularity = Granularity::parse_lenient(params.group_by.as_deref());

    let stats = state.query.stats(&project_id, &window, granularity).await?;
    state.account_read(&project_id).await;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub project: Option<String>,
    pub event: Option<String>,
    pub session_id: Option<String>,
    /// Epoch milliseconds; wins over `days` when both are present.
    pub since: Option<i64>,
    pub days: Option<u32>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub project: String,
    pub events: Vec<serde_json::Value>,
}

/// GET /events - raw event listing, newest first.
pub async fn events_handler(
    State(state): State<AppState>,
    auth: ReadAuth,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsResponse>, ApiError> {
    let project_id = auth.scope(params.project.as_deref())?;
    state.check_read_limit(&auth.access, &today_str()).await?;

    let since_ms = match params.since {
        Some(since) => since,
        None => {
            DateWindow::last_days(params.days.unwrap_or(DEFAULT_WINDOW_DAYS), today_utc()).start_ms()
        }
    };
    let query = EventsQuery {
        event: params.event,
        session_id: params.session_id,
        since_ms,
        limit: params.limit,
    };

    let events = state.query.events(&project_id, &query).await?;
    state.account_read(&project_id).await;
    Ok(Json(EventsResponse { project: project_id, events }))
}

/// POST /query - allowlisted aggregate queries.
pub async fn query_handler(
    State(state): State<AppState>,
    auth: ReadAuth,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    let req: QueryRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON: {}", e)))?;

    let project_id = auth.scope(Some(req.project.as_str()))?;
    state.check_read_limit(&auth.access, &today_str()).await?;

    let response = state.query.query(&project_id, &req).await?;
    state.account_read(&project_id).await;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct PropertiesParams {
    pub project: Option<String>,
    pub since: Option<i64>,
    pub days: Option<u32>,
}

/// GET /properties - event names and property keys seen in the window.
pub async fn properties_handler(
    State(state): State<AppState>,
    auth: ReadAuth,
    Query(params): Query<PropertiesParams>,
) -> Result<Json<PropertySummary>, ApiError> {
    let project_id = auth.scope(params.project.as_deref())?;
    state.check_read_limit(&auth.access, &today_str()).await?;

    let today = today_utc();
    let window = match params.since {
        Some(since) => DateWindow::since_ms(since, today)?,
        None => DateWindow::last_days(params.days.unwrap_or(DEFAULT_WINDOW_DAYS), today),
    };

    let summary = state.query.properties(&project_id, &window).await?;
    state.account_read(&project_id).await;
    Ok(Json(summary))
}
