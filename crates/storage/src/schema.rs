//! Table schemas.
//!
//! All statements are idempotent (`IF NOT EXISTS`) so they are safe to
//! re-run on every startup. Both adapters speak the same dialect, so
//! one set of DDL covers embedded and remote deployments.

use std::sync::Arc;

use beacon_core::Result;

use crate::adapter::{Statement, StorageAdapter};

/// Tenant registry. Tokens and keys are unique across the whole set.
pub const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    owner_email         TEXT NOT NULL,
    project_token       TEXT NOT NULL UNIQUE,
    api_key             TEXT NOT NULL UNIQUE,
    allowed_origins     TEXT,
    tier                TEXT NOT NULL DEFAULT 'free',
    rate_limit_events   INTEGER,
    rate_limit_reads    INTEGER,
    data_retention_days INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
)
"#;

/// Main analytics table. Rows are immutable once written; only
/// project deletion and retention cleanup remove them in bulk.
/// `date` is the denormalized UTC calendar date of `timestamp`.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    event       TEXT NOT NULL,
    properties  TEXT,
    user_id     TEXT,
    session_id  TEXT,
    timestamp   INTEGER NOT NULL,
    date        TEXT NOT NULL
)
"#;

/// Derived session rows, merged incrementally as events arrive.
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id  TEXT PRIMARY KEY,
    user_id     TEXT,
    project_id  TEXT NOT NULL,
    start_time  INTEGER NOT NULL,
    end_time    INTEGER NOT NULL,
    duration    INTEGER NOT NULL DEFAULT 0,
    entry_page  TEXT,
    exit_page   TEXT,
    event_count INTEGER NOT NULL DEFAULT 1,
    is_bounce   INTEGER NOT NULL DEFAULT 1,
    date        TEXT NOT NULL
)
"#;

/// Per-project per-day counters, created lazily on first increment.
/// Counters never decrease.
pub const CREATE_USAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS usage (
    project_id  TEXT NOT NULL,
    date        TEXT NOT NULL,
    event_count INTEGER NOT NULL DEFAULT 0,
    read_count  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, date)
)
"#;

/// Indexes for the hot read paths: date-window scans and raw
/// timestamp scans (hour-granularity buckets).
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_events_project_date ON events(project_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_events_project_ts ON events(project_id, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_events_project_session ON events(project_id, session_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_project_date ON sessions(project_id, date)",
];

/// Create all tables and indexes if they don't exist.
pub async fn init_schema(storage: &Arc<dyn StorageAdapter>) -> Result<()> {
    for sql in [
        CREATE_PROJECTS_TABLE,
        CREATE_EVENTS_TABLE,
        CREATE_SESSIONS_TABLE,
        CREATE_USAGE_TABLE,
    ] {
        storage.execute(Statement::new(sql, vec![])).await?;
    }
    for sql in CREATE_INDEXES {
        storage.execute(Statement::new(*sql, vec![])).await?;
    }
    Ok(())
}
