//! Storage layer for the analytics engine.
//!
//! A single [`StorageAdapter`] interface is consumed identically by the
//! ingestion pipeline and the query engine; the embedded and remote
//! implementations differ only in how they reach the backing store.

pub mod adapter;
pub mod config;
pub mod remote;
pub mod schema;
pub mod sqlite;

pub use adapter::{SqlRow, SqlValue, Statement, StorageAdapter};
pub use config::{connect, StorageBackend, StorageConfig};
pub use remote::RemoteStorage;
pub use schema::init_schema;
pub use sqlite::SqliteStorage;
