//! Application state shared across handlers.

use std::sync::Arc;

use tracing::warn;

use beacon_core::{utc_date, Result};
use beacon_engine::usage::{self, UsageCounter};
use beacon_engine::{AuthCache, DeferredTask, IngestionPipeline, QueryEngine, ReadAccess};
use beacon_storage::StorageAdapter;
use chrono::Utc;

/// How deferred persistence tasks run: spawned fire-and-forget in
/// production, awaited inline by tests (the transport layer owns this
/// choice, not the pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Background,
    Inline,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageAdapter>,
    pub auth: Arc<AuthCache>,
    pub pipeline: Arc<IngestionPipeline>,
    pub query: Arc<QueryEngine>,
    write_mode: WriteMode,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageAdapter>, auth: Arc<AuthCache>) -> Self {
        Self {
            pipeline: Arc::new(IngestionPipeline::new(storage.clone(), auth.clone())),
            query: Arc::new(QueryEngine::new(storage.clone())),
            storage,
            auth,
            write_mode: WriteMode::Background,
        }
    }

    /// Await deferred tasks before responding instead of spawning them.
    pub fn with_inline_writes(mut self) -> Self {
        self.write_mode = WriteMode::Inline;
        self
    }

    /// Complete the pipeline's pending tasks per the configured mode.
    pub async fn run_deferred(&self, tasks: Vec<DeferredTask>) {
        match self.write_mode {
            WriteMode::Background => {
                for task in tasks {
                    tokio::spawn(task);
                }
            }
            WriteMode::Inline => {
                for task in tasks {
                    task.await;
                }
            }
        }
    }

    /// Enforce the daily read limit when the key resolved to a project
    /// with one configured.
    pub async fn check_read_limit(&self, access: &ReadAccess, today: &str) -> Result<()> {
        if let ReadAccess::Project(project) = access {
            usage::check_daily_limit(
                &self.storage,
                &project.id,
                today,
                project.rate_limit_reads,
                UsageCounter::Reads,
            )
            .await?;
        }
        Ok(())
    }

    /// Best-effort read accounting; failures are logged, never surfaced.
    pub async fn account_read(&self, project_id: &str) {
        let Ok(today) = utc_date(Utc::now().timestamp_millis()) else {
            return;
        };
        let stmt = usage::increment_stmt(project_id, &today, UsageCounter::Reads);
        let storage = self.storage.clone();
        let task = async move {
            if let Err(e) = storage.execute(stmt).await {
                warn!(error = %e, "failed to increment read counter");
            }
        };
        match self.write_mode {
            WriteMode::Background => {
                tokio::spawn(task);
            }
            WriteMode::Inline => task.await,
        }
    }
}
