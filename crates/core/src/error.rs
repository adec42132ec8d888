//! Unified error types for the analytics engine.
//!
//! The taxonomy maps directly onto HTTP statuses:
//! - Validation (malformed input, batch size) -> 400
//! - Auth (missing/invalid token or key) -> 401/403
//! - RateLimit (daily usage at the configured limit) -> 429
//! - Query (metric/group/filter outside the allowlist) -> 400
//! - NotFound -> 404
//! - Database / Internal -> 500

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Authorization failures.
///
/// Write-side failures (project token) are 403; read-side failures
/// (API key) are 401. A missing credential is deliberately distinct
/// from an invalid one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing project token")]
    MissingToken,
    #[error("invalid project token")]
    InvalidToken,
    #[error("missing API key")]
    MissingKey,
    #[error("invalid API key")]
    InvalidKey,
}

impl AuthError {
    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingToken | Self::InvalidToken => 403,
            Self::MissingKey | Self::InvalidKey => 401,
        }
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Daily usage reached the configured limit; carries the limit value
    /// so the response can report it.
    #[error("rate limit exceeded: daily limit is {limit}")]
    RateLimit { limit: i64 },

    /// Query shape outside the allowlist; the message enumerates the
    /// permitted values.
    #[error("{0}")]
    Query(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(e) => e.http_status(),
            Self::RateLimit { .. } => 429,
            Self::Query(_) => 400,
            Self::NotFound(_) => 404,
            Self::Database(_) => 500,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Whether this is a "relation does not exist" failure from the
    /// backing store. Both backends emit SQLite's "no such table"
    /// message; the auth cache treats it as an empty project set.
    pub fn is_missing_table(&self) -> bool {
        matches!(self, Self::Database(msg) if msg.contains("no such table"))
    }
}
