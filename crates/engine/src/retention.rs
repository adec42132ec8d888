//! Retention sweeper: bulk-deletes events and sessions older than each
//! project's configured retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tokio::time::interval;
use tracing::{info, warn};

use beacon_core::Result;
use beacon_storage::{Statement, StorageAdapter};

use crate::auth_cache::AuthCache;
use crate::window::today_utc;

/// Background worker enforcing per-project data retention.
pub struct RetentionSweeper {
    storage: Arc<dyn StorageAdapter>,
    auth: Arc<AuthCache>,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(storage: Arc<dyn StorageAdapter>, auth: Arc<AuthCache>, sweep_interval: Duration) -> Self {
        Self { storage, auth, sweep_interval }
    }

    /// Start the sweep loop. Failures are logged and the loop keeps
    /// running.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run().await {
                    warn!(error = %e, "retention sweep failed");
                }
            }
        })
    }

    /// Run one sweep across all projects.
    pub async fn run(&self) -> Result<()> {
        let today = today_utc();
        for project in self.auth.projects().await? {
            let Some(days) = project.data_retention_days.filter(|d| *d > 0) else {
                continue;
            };
            let cutoff = cutoff_date(today, days);

            let mut removed = 0u64;
            for table in ["events", "sessions"] {
                let stmt = Statement::new(
                    format!("DELETE FROM {} WHERE project_id = ? AND date < ?", table),
                    vec![project.id.as_str().into(), cutoff.as_str().into()],
                );
                match self.storage.execute(stmt).await {
                    Ok(n) => removed += n,
                    Err(e) => {
                        warn!(project_id = %project.id, table, error = %e, "retention delete failed")
                    }
                }
            }

            if removed > 0 {
                info!(
                    project_id = %project.id,
                    cutoff = %cutoff,
                    removed,
                    "retention sweep removed expired rows"
                );
            }
        }
        Ok(())
    }
}

/// Rows dated strictly before this survive `days` more days.
fn cutoff_date(today: NaiveDate, days: i64) -> String {
    (today - Days::new(days.max(0) as u64)).format("%Y-%m-%d").to_string()
}
