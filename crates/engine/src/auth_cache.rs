//! Authorization cache.
//!
//! Resolves project tokens and API keys without a per-request table
//! scan: the whole project set is snapshotted into a prefixed map
//! (`token:…`, `key:…`, `id:…`) and refreshed once it is older than the
//! TTL. The cache owns an injectable clock so staleness behavior is
//! testable, and an `invalidate()` hook so a writer never waits a full
//! TTL to see its own mutation. Concurrent callers may reload
//! redundantly during the expiry window; a reload is idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use beacon_core::limits::AUTH_CACHE_TTL_SECS;
use beacon_core::{AuthError, Project, Result};
use beacon_storage::{Statement, StorageAdapter};

use crate::projects::{project_from_row, PROJECT_COLUMNS};

/// Time source for staleness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Static credential allowlists for single-tenant deployments with no
/// projects table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub write_tokens: Vec<String>,
    pub read_keys: Vec<String>,
}

impl StaticCredentials {
    /// Parse comma-separated lists as configured in the environment.
    pub fn from_lists(write_tokens: &str, read_keys: &str) -> Self {
        let split = |s: &str| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        };
        Self {
            write_tokens: split(write_tokens),
            read_keys: split(read_keys),
        }
    }
}

/// Outcome of write-token resolution.
#[derive(Debug, Clone)]
pub enum WriteAccess {
    /// Token matched a project record.
    Project(Project),
    /// Token matched the static allowlist (single-tenant mode).
    Static,
    /// No write credential configured anywhere: ingestion is open.
    Open,
}

/// Outcome of read-key resolution. Reads are never open.
#[derive(Debug, Clone)]
pub enum ReadAccess {
    Project(Project),
    Static,
}

struct CacheState {
    loaded_at: Option<Instant>,
    entries: HashMap<String, Project>,
}

/// Process-wide project authorization cache.
pub struct AuthCache {
    storage: Arc<dyn StorageAdapter>,
    statics: StaticCredentials,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<CacheState>,
}

impl AuthCache {
    pub fn new(storage: Arc<dyn StorageAdapter>, statics: StaticCredentials) -> Self {
        Self {
            storage,
            statics,
            ttl: Duration::from_secs(AUTH_CACHE_TTL_SECS),
            clock: Arc::new(SystemClock),
            state: RwLock::new(CacheState { loaded_at: None, entries: HashMap::new() }),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Force the next lookup to reload. Called synchronously after any
    /// project create/delete; other concurrent readers may still see
    /// the stale snapshot until their own refresh.
    pub fn invalidate(&self) {
        self.state.write().loaded_at = None;
    }

    /// Resolve an ingestion token.
    pub async fn resolve_write_token(&self, token: Option<&str>) -> Result<WriteAccess> {
        self.ensure_fresh().await?;
        let state = self.state.read();

        let any_configured = !state.entries.is_empty() || !self.statics.write_tokens.is_empty();
        if !any_configured {
            return Ok(WriteAccess::Open);
        }

        let Some(token) = token else {
            return Err(AuthError::MissingToken.into());
        };

        if let Some(project) = scan_projects(&state.entries, "token:", token, |p| &p.project_token)
        {
            return Ok(WriteAccess::Project(project));
        }
        if scan_static(&self.statics.write_tokens, token) {
            return Ok(WriteAccess::Static);
        }
        Err(AuthError::InvalidToken.into())
    }

    /// Resolve a read key. Unlike ingestion there is no open mode: with
    /// no key configured anywhere every read is rejected.
    pub async fn resolve_read_key(&self, key: Option<&str>) -> Result<ReadAccess> {
        self.ensure_fresh().await?;
        let state = self.state.read();

        let Some(key) = key else {
            return Err(AuthError::MissingKey.into());
        };

        if let Some(project) = scan_projects(&state.entries, "key:", key, |p| &p.api_key) {
            return Ok(ReadAccess::Project(project));
        }
        if scan_static(&self.statics.read_keys, key) {
            return Ok(ReadAccess::Static);
        }
        Err(AuthError::InvalidKey.into())
    }

    /// Current project set (cache-backed); feeds the retention sweeper.
    pub async fn projects(&self) -> Result<Vec<Project>> {
        self.ensure_fresh().await?;
        let state = self.state.read();
        Ok(state
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with("id:"))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn ensure_fresh(&self) -> Result<()> {
        let stale = {
            let state = self.state.read();
            match state.loaded_at {
                None => true,
                Some(at) => self.clock.now().duration_since(at) >= self.ttl,
            }
        };
        if !stale {
            return Ok(());
        }

        let entries = self.load().await?;
        let mut state = self.state.write();
        state.entries = entries;
        state.loaded_at = Some(self.clock.now());
        Ok(())
    }

    /// Snapshot the projects table into the prefixed map. A missing
    /// table is an empty project set, not an error.
    async fn load(&self) -> Result<HashMap<String, Project>> {
        let stmt = Statement::new(format!("SELECT {} FROM projects", PROJECT_COLUMNS), vec![]);
        let rows = match self.storage.fetch_all(stmt).await {
            Ok(rows) => rows,
            Err(e) if e.is_missing_table() => {
                debug!("projects table absent, auth cache is empty");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e),
        };

        let mut entries = HashMap::with_capacity(rows.len() * 3);
        for row in &rows {
            let Some(project) = project_from_row(row) else {
                warn!("skipping malformed project row in auth cache load");
                continue;
            };
            entries.insert(format!("token:{}", project.project_token), project.clone());
            entries.insert(format!("key:{}", project.api_key), project.clone());
            entries.insert(format!("id:{}", project.id), project);
        }
        debug!(projects = rows.len(), "auth cache loaded");
        Ok(entries)
    }
}

/// Constant-time equality over the full candidate set. The comparison
/// never short-circuits on the secret and every candidate is visited,
/// so timing reveals nothing about how close a guess got.
fn scan_projects(
    entries: &HashMap<String, Project>,
    prefix: &str,
    candidate: &str,
    secret: impl Fn(&Project) -> &String,
) -> Option<Project> {
    let mut matched: Option<&Project> = None;
    for (key, project) in entries {
        if !key.starts_with(prefix) {
            continue;
        }
        if ct_eq(secret(project), candidate) {
            matched = Some(project);
        }
    }
    matched.cloned()
}

fn scan_static(list: &[String], candidate: &str) -> bool {
    let mut matched = false;
    for entry in list {
        if ct_eq(entry, candidate) {
            matched = true;
        }
    }
    matched
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
