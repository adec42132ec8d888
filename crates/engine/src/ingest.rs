//! Ingestion pipeline.
//!
//! Validation, authorization, and the rate-limit check run before the
//! response is produced; the durable write and the usage increments are
//! handed back to the transport as deferred tasks. A success response
//! therefore means "accepted for processing", not "persisted": if a
//! deferred write later fails it is logged and the client is never
//! informed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

use beacon_core::{
    session_deltas, utc_date, BatchRequest, EventWrite, Result, SessionDelta, StoredEvent,
    TrackRequest,
};
use beacon_storage::{Statement, StorageAdapter};

use crate::auth_cache::{AuthCache, WriteAccess};
use crate::usage::{self, UsageCounter};

/// A persistence task the transport runs after responding: spawned in
/// production, awaited inline by tests.
pub type DeferredTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Outcome of an accepted ingestion request.
pub struct Accepted {
    /// Number of events accepted for processing.
    pub count: usize,
    /// Pending persistence and accounting work.
    pub deferred: Vec<DeferredTask>,
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("count", &self.count)
            .field("deferred", &format_args!("[{} tasks]", self.deferred.len()))
            .finish()
    }
}

/// The write path: validate, authorize, rate-limit, persist with
/// session correlation, account usage.
pub struct IngestionPipeline {
    storage: Arc<dyn StorageAdapter>,
    auth: Arc<AuthCache>,
}

impl IngestionPipeline {
    pub fn new(storage: Arc<dyn StorageAdapter>, auth: Arc<AuthCache>) -> Self {
        Self { storage, auth }
    }

    /// Ingest a single event.
    pub async fn track(&self, req: TrackRequest) -> Result<Accepted> {
        req.check()?;
        let access = self.auth.resolve_write_token(req.token.as_deref()).await?;

        let now = Utc::now().timestamp_millis();
        let today = utc_date(now)?;
        self.check_event_limit(&access, &today).await?;

        let project_id = write_project_id(&access, &req.project);
        let write = EventWrite::from_request(&req, &project_id, now)?;
        let deltas = session_deltas(std::slice::from_ref(&write));
        Ok(self.accept(vec![write], deltas, &today))
    }

    /// Ingest a bounded batch. The shape check (non-empty, at most 100
    /// events, each with project/event) runs before any authorization
    /// or storage work.
    pub async fn track_batch(&self, req: BatchRequest) -> Result<Accepted> {
        req.check()?;
        let access = self.auth.resolve_write_token(req.effective_token()).await?;

        let now = Utc::now().timestamp_millis();
        let today = utc_date(now)?;
        self.check_event_limit(&access, &today).await?;

        let writes = req
            .events
            .iter()
            .map(|event| {
                let project_id = write_project_id(&access, &event.project);
                EventWrite::from_request(event, &project_id, now)
            })
            .collect::<Result<Vec<_>>>()?;
        let deltas = session_deltas(&writes);
        Ok(self.accept(writes, deltas, &today))
    }

    /// Daily event limit pre-check. Only a project record carries a
    /// configured limit; static and open modes are unmetered. Reading
    /// the counter and the later increment are two separate operations;
    /// brief overage under concurrent bursts is accepted.
    async fn check_event_limit(&self, access: &WriteAccess, today: &str) -> Result<()> {
        if let WriteAccess::Project(project) = access {
            usage::check_daily_limit(
                &self.storage,
                &project.id,
                today,
                project.rate_limit_events,
                UsageCounter::Events,
            )
            .await?;
        }
        Ok(())
    }

    /// Build the deferred work: one transactional batch carrying the
    /// event inserts plus one session upsert per touched session, and
    /// one usage-increment operation per event.
    fn accept(&self, writes: Vec<EventWrite>, deltas: Vec<SessionDelta>, today: &str) -> Accepted {
        let count = writes.len();

        let mut stmts: Vec<Statement> = Vec::with_capacity(writes.len() + deltas.len());
        let mut usage_stmts: Vec<Statement> = Vec::with_capacity(writes.len());
        for write in &writes {
            stmts.push(insert_event_stmt(&write.row));
            usage_stmts.push(usage::increment_stmt(&write.row.project_id, today, UsageCounter::Events));
        }
        for delta in &deltas {
            stmts.push(upsert_session_stmt(delta));
        }

        let storage = self.storage.clone();
        let persist: DeferredTask = Box::pin(async move {
            if let Err(e) = storage.execute_batch(stmts).await {
                error!(error = %e, count, "failed to persist accepted events");
            }
        });

        let storage = self.storage.clone();
        let account: DeferredTask = Box::pin(async move {
            for stmt in usage_stmts {
                if let Err(e) = storage.execute(stmt).await {
                    warn!(error = %e, "failed to increment usage counter");
                }
            }
        });

        Accepted { count, deferred: vec![persist, account] }
    }
}

/// Events ingested under a project record carry its id; static and open
/// modes fall back to the client-supplied project identifier.
fn write_project_id(access: &WriteAccess, requested: &str) -> String {
    match access {
        WriteAccess::Project(project) => project.id.clone(),
        WriteAccess::Static | WriteAccess::Open => requested.to_string(),
    }
}

fn insert_event_stmt(row: &StoredEvent) -> Statement {
    Statement::new(
        "INSERT INTO events (id, project_id, event, properties, user_id, session_id, timestamp, date) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        vec![
            row.id.clone().into(),
            row.project_id.clone().into(),
            row.event.clone().into(),
            row.properties.clone().into(),
            row.user_id.clone().into(),
            row.session_id.clone().into(),
            row.timestamp.into(),
            row.date.clone().into(),
        ],
    )
}

/// The session merge as a single atomic statement. All right-hand sides
/// evaluate against the pre-update row, so assignment order carries no
/// meaning; two concurrent events for the same session both contribute
/// regardless of interleaving.
fn upsert_session_stmt(delta: &SessionDelta) -> Statement {
    Statement::new(
        "INSERT INTO sessions (session_id, user_id, project_id, start_time, end_time, duration, \
         entry_page, exit_page, event_count, is_bounce, date) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(session_id) DO UPDATE SET \
         duration = MAX(sessions.end_time, excluded.end_time) - MIN(sessions.start_time, excluded.start_time), \
         entry_page = CASE WHEN excluded.start_time < sessions.start_time THEN excluded.entry_page ELSE sessions.entry_page END, \
         exit_page = CASE WHEN excluded.end_time >= sessions.end_time THEN excluded.exit_page ELSE sessions.exit_page END, \
         date = CASE WHEN excluded.start_time < sessions.start_time THEN excluded.date ELSE sessions.date END, \
         start_time = MIN(sessions.start_time, excluded.start_time), \
         end_time = MAX(sessions.end_time, excluded.end_time), \
         event_count = sessions.event_count + excluded.event_count, \
         is_bounce = CASE WHEN sessions.event_count + excluded.event_count > 1 THEN 0 ELSE 1 END, \
         user_id = COALESCE(sessions.user_id, excluded.user_id)",
        vec![
            delta.session_id.clone().into(),
            delta.user_id.clone().into(),
            delta.project_id.clone().into(),
            delta.start.into(),
            delta.end.into(),
            delta.duration().into(),
            delta.entry_page.clone().into(),
            delta.exit_page.clone().into(),
            delta.count.into(),
            i64::from(delta.is_bounce()).into(),
            delta.date.clone().into(),
        ],
    )
}
