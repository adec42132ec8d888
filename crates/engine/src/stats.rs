//! The fixed overview ("stats") shape: window totals, a time-bucketed
//! series, top events, and session statistics.

use serde::Serialize;

use beacon_core::limits::TOP_EVENTS_LIMIT;
use beacon_core::Result;
use beacon_storage::Statement;

use crate::query::QueryEngine;
use crate::window::{DateWindow, Period};

/// Series bucket granularity. Unrecognized values silently fall back
/// to day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn parse_lenient(s: Option<&str>) -> Self {
        match s {
            Some("hour") => Self::Hour,
            Some("week") => Self::Week,
            Some("month") => Self::Month,
            _ => Self::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsTotals {
    pub unique_users: i64,
    pub total_events: i64,
}

#[derive(Debug, Serialize)]
pub struct SeriesPoint {
    pub bucket: String,
    pub events: i64,
    pub unique_users: i64,
}

#[derive(Debug, Serialize)]
pub struct TopEvent {
    pub event: String,
    pub count: i64,
    pub unique_users: i64,
}

/// Session statistics, derived from the sessions table rather than
/// recomputed from raw events.
#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub total_sessions: i64,
    /// Percentage of sessions with a single event.
    pub bounce_rate: f64,
    /// Mean session duration in milliseconds.
    pub avg_duration: f64,
    pub pages_per_session: f64,
    pub sessions_per_user: f64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub project: String,
    pub period: Period,
    pub granularity: &'static str,
    pub totals: StatsTotals,
    pub series: Vec<SeriesPoint>,
    pub top_events: Vec<TopEvent>,
    pub sessions: SessionStats,
}

impl QueryEngine {
    /// Build the stats overview for one project and window.
    pub async fn stats(
        &self,
        project_id: &str,
        window: &DateWindow,
        granularity: Granularity,
    ) -> Result<StatsResponse> {
        let date_params = || -> Vec<beacon_storage::SqlValue> {
            vec![project_id.into(), window.from_str().into(), window.to_str().into()]
        };

        let totals_row = self
            .storage
            .fetch_one(Statement::new(
                "SELECT COUNT(*) AS total_events, COUNT(DISTINCT user_id) AS unique_users \
                 FROM events WHERE project_id = ? AND date >= ? AND date <= ?",
                date_params(),
            ))
            .await?;
        let totals = StatsTotals {
            unique_users: totals_row.as_ref().and_then(|r| r.get_i64("unique_users")).unwrap_or(0),
            total_events: totals_row.as_ref().and_then(|r| r.get_i64("total_events")).unwrap_or(0),
        };

        let series_stmt = match granularity {
            // Hour resolution needs the raw timestamp; the denormalized
            // date only carries whole days.
            Granularity::Hour => Statement::new(
                "SELECT strftime('%Y-%m-%dT%H:00:00Z', timestamp / 1000, 'unixepoch') AS bucket, \
                 COUNT(*) AS events, COUNT(DISTINCT user_id) AS unique_users \
                 FROM events WHERE project_id = ? AND timestamp >= ? AND timestamp < ? \
                 GROUP BY bucket ORDER BY bucket",
                vec![project_id.into(), window.start_ms().into(), window.end_ms_exclusive().into()],
            ),
            Granularity::Day => Statement::new(
                "SELECT date AS bucket, COUNT(*) AS events, COUNT(DISTINCT user_id) AS unique_users \
                 FROM events WHERE project_id = ? AND date >= ? AND date <= ? \
                 GROUP BY date ORDER BY date",
                date_params(),
            ),
            // Weeks truncate to their Monday.
            Granularity::Week => Statement::new(
                "SELECT date(date, 'weekday 0', '-6 days') AS bucket, \
                 COUNT(*) AS events, COUNT(DISTINCT user_id) AS unique_users \
                 FROM events WHERE project_id = ? AND date >= ? AND date <= ? \
                 GROUP BY bucket ORDER BY bucket",
                date_params(),
            ),
            Granularity::Month => Statement::new(
                "SELECT strftime('%Y-%m', date) AS bucket, \
                 COUNT(*) AS events, COUNT(DISTINCT user_id) AS unique_users \
                 FROM events WHERE project_id = ? AND date >= ? AND date <= ? \
                 GROUP BY bucket ORDER BY bucket",
                date_params(),
            ),
        };
        let series = self
            .storage
            .fetch_all(series_stmt)
            .await?
            .iter()
            .map(|row| SeriesPoint {
                bucket: row.get_str("bucket").unwrap_or_default().to_string(),
                events: row.get_i64("events").unwrap_or(0),
                unique_users: row.get_i64("unique_users").unwrap_or(0),
            })
            .collect();

        let top_events = self
            .storage
            .fetch_all(Statement::new(
                "SELECT event, COUNT(*) AS count, COUNT(DISTINCT user_id) AS unique_users \
                 FROM events WHERE project_id = ? AND date >= ? AND date <= ? \
                 GROUP BY event ORDER BY count DESC LIMIT ?",
                {
                    let mut p = date_params();
                    p.push(i64::from(TOP_EVENTS_LIMIT).into());
                    p
                },
            ))
            .await?
            .iter()
            .map(|row| TopEvent {
                event: row.get_str("event").unwrap_or_default().to_string(),
                count: row.get_i64("count").unwrap_or(0),
                unique_users: row.get_i64("unique_users").unwrap_or(0),
            })
            .collect();

        let sessions_row = self
            .storage
            .fetch_one(Statement::new(
                "SELECT COUNT(*) AS total_sessions, \
                 ROUND(100.0 * AVG(is_bounce), 2) AS bounce_rate, \
                 ROUND(AVG(duration), 2) AS avg_duration, \
                 ROUND(AVG(event_count), 2) AS pages_per_session, \
                 ROUND(CAST(COUNT(*) AS REAL) / NULLIF(COUNT(DISTINCT user_id), 0), 2) AS sessions_per_user \
                 FROM sessions WHERE project_id = ? AND date >= ? AND date <= ?",
                date_params(),
            ))
            .await?;
        let sessions = match sessions_row {
            Some(row) => SessionStats {
                total_sessions: row.get_i64("total_sessions").unwrap_or(0),
                bounce_rate: row.get_f64("bounce_rate").unwrap_or(0.0),
                avg_duration: row.get_f64("avg_duration").unwrap_or(0.0),
                pages_per_session: row.get_f64("pages_per_session").unwrap_or(0.0),
                sessions_per_user: row.get_f64("sessions_per_user").unwrap_or(0.0),
            },
            None => SessionStats {
                total_sessions: 0,
                bounce_rate: 0.0,
                avg_duration: 0.0,
                pages_per_session: 0.0,
                sessions_per_user: 0.0,
            },
        };

        Ok(StatsResponse {
            project: project_id.to_string(),
            period: Period::from(window),
            granularity: granularity.as_str(),
            totals,
            series,
            top_events,
            sessions,
        })
    }
}
