//! Storage configuration and startup-time adapter selection.

use std::sync::Arc;

use beacon_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::adapter::StorageAdapter;
use crate::remote::RemoteStorage;
use crate::sqlite::SqliteStorage;

/// Which backing-store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Single-process SQLite file.
    #[default]
    Embedded,
    /// Remote libsql/Turso database.
    Remote,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database file path for the embedded backend.
    #[serde(default = "default_path")]
    pub path: String,
    /// Database URL for the remote backend.
    #[serde(default)]
    pub url: String,
    /// Auth token for the remote backend.
    #[serde(default)]
    pub auth_token: String,
}

fn default_path() -> String {
    "beacon.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Embedded,
            path: default_path(),
            url: String::new(),
            auth_token: String::new(),
        }
    }
}

/// Build the configured adapter. The choice happens exactly once, here;
/// everything downstream sees only `Arc<dyn StorageAdapter>`.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    match config.backend {
        StorageBackend::Embedded => Ok(Arc::new(SqliteStorage::open(&config.path)?)),
        StorageBackend::Remote => {
            if config.url.is_empty() {
                return Err(Error::validation("storage.url is required for the remote backend"));
            }
            Ok(Arc::new(RemoteStorage::connect(&config.url, &config.auth_token).await?))
        }
    }
}
