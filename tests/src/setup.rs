//! Common test setup.

use std::sync::Arc;

use api::{router, AppState};
use axum::Router;
use axum_test::TestServer;
use beacon_core::{Project, Tier};
use beacon_engine::{AuthCache, ProjectStore, StaticCredentials};
use beacon_storage::{init_schema, SqliteStorage, SqlRow, Statement, StorageAdapter};

/// Test context over in-memory storage.
///
/// Exercises the production code paths: the real router with all
/// layers, the real pipeline and query engine, and the real adapter,
/// with deferred writes awaited inline before the response so
/// assertions against storage are deterministic.
pub struct TestContext {
    pub storage: Arc<dyn StorageAdapter>,
    pub auth: Arc<AuthCache>,
    pub projects: ProjectStore,
    pub router: Router,
}

impl TestContext {
    /// Context with no credentials configured anywhere: open ingestion.
    pub async fn new() -> Self {
        Self::with_statics("", "").await
    }

    /// Context with static credential lists (single-tenant mode).
    pub async fn with_statics(write_tokens: &str, read_keys: &str) -> Self {
        let storage: Arc<dyn StorageAdapter> = Arc::new(
            SqliteStorage::open(":memory:").expect("Failed to open in-memory storage"),
        );
        init_schema(&storage).await.expect("Failed to initialize schema");

        let statics = StaticCredentials::from_lists(write_tokens, read_keys);
        let auth = Arc::new(AuthCache::new(storage.clone(), statics));
        let projects = ProjectStore::new(storage.clone(), auth.clone());

        let state = AppState::new(storage.clone(), auth.clone()).with_inline_writes();
        let router = router(state);

        Self { storage, auth, projects, router }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Create a project with generated credentials.
    pub async fn seed_project(&self, name: &str) -> Project {
        self.projects
            .create(name, "owner@example.com", Tier::Free)
            .await
            .expect("Failed to seed project")
    }

    /// Insert a project built by the caller (custom limits etc.).
    pub async fn seed_custom(&self, project: &Project) {
        self.projects.insert(project).await.expect("Failed to seed project");
    }

    pub async fn count(&self, table: &str) -> i64 {
        self.storage
            .fetch_one(Statement::new(format!("SELECT COUNT(*) AS n FROM {}", table), vec![]))
            .await
            .expect("count query failed")
            .and_then(|row| row.get_i64("n"))
            .unwrap_or(0)
    }

    pub async fn session_row(&self, session_id: &str) -> Option<SqlRow> {
        self.storage
            .fetch_one(Statement::new(
                "SELECT * FROM sessions WHERE session_id = ?",
                vec![session_id.into()],
            ))
            .await
            .expect("session query failed")
    }

    pub async fn usage_row(&self, project_id: &str, date: &str) -> Option<SqlRow> {
        self.storage
            .fetch_one(Statement::new(
                "SELECT * FROM usage WHERE project_id = ? AND date = ?",
                vec![project_id.into(), date.into()],
            ))
            .await
            .expect("usage query failed")
    }
}
