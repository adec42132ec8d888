//! Project (tenant) records and credentials.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pricing/limits tier for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pro" => Self::Pro,
            "enterprise" => Self::Enterprise,
            _ => Self::Free,
        }
    }

    /// Default daily ingested-event limit.
    pub fn default_event_limit(&self) -> Option<i64> {
        match self {
            Self::Free => Some(10_000),
            Self::Pro => Some(1_000_000),
            Self::Enterprise => None,
        }
    }

    /// Default daily read-request limit.
    pub fn default_read_limit(&self) -> Option<i64> {
        match self {
            Self::Free => Some(10_000),
            Self::Pro => Some(100_000),
            Self::Enterprise => None,
        }
    }

    /// Default raw data retention in days.
    pub fn default_retention_days(&self) -> Option<i64> {
        match self {
            Self::Free => Some(90),
            Self::Pro => Some(365),
            Self::Enterprise => None,
        }
    }
}

/// A tenant in the system.
///
/// `project_token` is the public ingestion credential; `api_key` is the
/// private read credential. Both are unique across the whole project set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner_email: String,
    pub project_token: String,
    pub api_key: String,
    /// Comma-separated origin allowlist for CORS, empty = any.
    pub allowed_origins: Option<String>,
    pub tier: Tier,
    /// Daily ingested-event limit; None disables the check.
    pub rate_limit_events: Option<i64>,
    /// Daily read-request limit; None disables the check.
    pub rate_limit_reads: Option<i64>,
    pub data_retention_days: Option<i64>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    /// Creates a new project with generated credentials and tier defaults.
    pub fn new(name: impl Into<String>, owner_email: impl Into<String>, tier: Tier) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner_email: owner_email.into(),
            project_token: generate_project_token(),
            api_key: generate_api_key(),
            allowed_origins: None,
            tier,
            rate_limit_events: tier.default_event_limit(),
            rate_limit_reads: tier.default_read_limit(),
            data_retention_days: tier.default_retention_days(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generate a public ingestion token (`pt_` + 32 hex chars).
pub fn generate_project_token() -> String {
    format!("pt_{}", Uuid::new_v4().simple())
}

/// Generate a private read key (`sk_` + 32 hex chars).
pub fn generate_api_key() -> String {
    format!("sk_{}", Uuid::new_v4().simple())
}
