//! Project lifecycle: create, delete (with cascade), list.
//!
//! Both mutations invalidate the auth cache synchronously so a writer
//! sees its own change without waiting out the TTL.

use std::sync::Arc;

use tracing::info;

use beacon_core::{Error, Project, Result, Tier};
use beacon_storage::{SqlRow, Statement, StorageAdapter};

use crate::auth_cache::AuthCache;

/// Column list shared by every projects read.
pub(crate) const PROJECT_COLUMNS: &str = "id, name, owner_email, project_token, api_key, \
     allowed_origins, tier, rate_limit_events, rate_limit_reads, data_retention_days, \
     created_at, updated_at";

pub(crate) fn project_from_row(row: &SqlRow) -> Option<Project> {
    Some(Project {
        id: row.get_str("id")?.to_string(),
        name: row.get_str("name")?.to_string(),
        owner_email: row.get_str("owner_email")?.to_string(),
        project_token: row.get_str("project_token")?.to_string(),
        api_key: row.get_str("api_key")?.to_string(),
        allowed_origins: row.get_str("allowed_origins").map(str::to_string),
        tier: Tier::parse(row.get_str("tier").unwrap_or("free")),
        rate_limit_events: row.get_i64("rate_limit_events"),
        rate_limit_reads: row.get_i64("rate_limit_reads"),
        data_retention_days: row.get_i64("data_retention_days"),
        created_at: row.get_i64("created_at").unwrap_or(0),
        updated_at: row.get_i64("updated_at").unwrap_or(0),
    })
}

/// Project registry operations.
pub struct ProjectStore {
    storage: Arc<dyn StorageAdapter>,
    auth: Arc<AuthCache>,
}

impl ProjectStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, auth: Arc<AuthCache>) -> Self {
        Self { storage, auth }
    }

    /// Create a project with generated credentials and tier defaults.
    pub async fn create(
        &self,
        name: impl Into<String>,
        owner_email: impl Into<String>,
        tier: Tier,
    ) -> Result<Project> {
        let project = Project::new(name, owner_email, tier);
        self.insert(&project).await?;
        Ok(project)
    }

    /// Insert a fully-formed project record. Token/key uniqueness is
    /// enforced by the schema; a collision surfaces as a validation
    /// error, not a raw storage error.
    pub async fn insert(&self, project: &Project) -> Result<()> {
        let stmt = Statement::new(
            format!("INSERT INTO projects ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", PROJECT_COLUMNS),
            vec![
                project.id.clone().into(),
                project.name.clone().into(),
                project.owner_email.clone().into(),
                project.project_token.clone().into(),
                project.api_key.clone().into(),
                project.allowed_origins.clone().into(),
                project.tier.as_str().into(),
                project.rate_limit_events.into(),
                project.rate_limit_reads.into(),
                project.data_retention_days.into(),
                project.created_at.into(),
                project.updated_at.into(),
            ],
        );

        match self.storage.execute(stmt).await {
            Ok(_) => {}
            Err(Error::Database(msg)) if msg.contains("UNIQUE constraint failed") => {
                return Err(Error::validation("project token or API key already in use"));
            }
            Err(e) => return Err(e),
        }

        self.auth.invalidate();
        info!(project_id = %project.id, name = %project.name, "project created");
        Ok(())
    }

    pub async fn get(&self, project_id: &str) -> Result<Project> {
        let stmt = Statement::new(
            format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS),
            vec![project_id.into()],
        );
        let row = self
            .storage
            .fetch_one(stmt)
            .await?
            .ok_or_else(|| Error::not_found(format!("project {}", project_id)))?;
        project_from_row(&row)
            .ok_or_else(|| Error::internal(format!("malformed project row {}", project_id)))
    }

    /// Delete a project and everything it owns, in one transaction.
    pub async fn delete(&self, project_id: &str) -> Result<()> {
        // Existence check first so a bogus id is a 404, not a no-op.
        self.get(project_id).await?;

        let id: beacon_storage::SqlValue = project_id.into();
        self.storage
            .execute_batch(vec![
                Statement::new("DELETE FROM events WHERE project_id = ?", vec![id.clone()]),
                Statement::new("DELETE FROM sessions WHERE project_id = ?", vec![id.clone()]),
                Statement::new("DELETE FROM usage WHERE project_id = ?", vec![id.clone()]),
                Statement::new("DELETE FROM projects WHERE id = ?", vec![id]),
            ])
            .await?;

        self.auth.invalidate();
        info!(project_id = %project_id, "project deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Project>> {
        let stmt = Statement::new(
            format!("SELECT {} FROM projects ORDER BY created_at", PROJECT_COLUMNS),
            vec![],
        );
        let rows = self.storage.fetch_all(stmt).await?;
        Ok(rows.iter().filter_map(project_from_row).collect())
    }
}
