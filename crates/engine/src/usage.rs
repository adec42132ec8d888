//! Per-project per-day usage counters.
//!
//! Counters are monotonically increasing and created lazily on first
//! increment. The daily-limit check reads the counter before the write
//! path runs; check and increment are deliberately two operations, so
//! concurrent bursts can briefly overshoot the limit. That overage is
//! an accepted tradeoff, not a bug.

use std::sync::Arc;

use beacon_core::{Error, Result};
use beacon_storage::{Statement, StorageAdapter};

/// Which counter a usage operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCounter {
    Events,
    Reads,
}

impl UsageCounter {
    fn column(&self) -> &'static str {
        match self {
            Self::Events => "event_count",
            Self::Reads => "read_count",
        }
    }
}

/// Statement incrementing one counter by one, creating the row lazily.
pub fn increment_stmt(project_id: &str, date: &str, counter: UsageCounter) -> Statement {
    let sql = match counter {
        UsageCounter::Events => {
            "INSERT INTO usage (project_id, date, event_count, read_count) VALUES (?, ?, 1, 0) \
             ON CONFLICT(project_id, date) DO UPDATE SET event_count = event_count + 1"
        }
        UsageCounter::Reads => {
            "INSERT INTO usage (project_id, date, event_count, read_count) VALUES (?, ?, 0, 1) \
             ON CONFLICT(project_id, date) DO UPDATE SET read_count = read_count + 1"
        }
    };
    Statement::new(sql, vec![project_id.into(), date.into()])
}

/// Current value of one counter for a project/date, zero if the row
/// does not exist yet.
pub async fn counter_value(
    storage: &Arc<dyn StorageAdapter>,
    project_id: &str,
    date: &str,
    counter: UsageCounter,
) -> Result<i64> {
    let stmt = Statement::new(
        format!(
            "SELECT {} AS n FROM usage WHERE project_id = ? AND date = ?",
            counter.column()
        ),
        vec![project_id.into(), date.into()],
    );
    Ok(storage
        .fetch_one(stmt)
        .await?
        .and_then(|row| row.get_i64("n"))
        .unwrap_or(0))
}

/// Fail with a rate-limit error when today's counter has reached the
/// configured limit. `None` (or a non-positive limit) disables the check.
pub async fn check_daily_limit(
    storage: &Arc<dyn StorageAdapter>,
    project_id: &str,
    date: &str,
    limit: Option<i64>,
    counter: UsageCounter,
) -> Result<()> {
    let Some(limit) = limit.filter(|l| *l > 0) else {
        return Ok(());
    };
    let used = counter_value(storage, project_id, date, counter).await?;
    if used >= limit {
        return Err(Error::RateLimit { limit });
    }
    Ok(())
}
