//! Engine layer for Beacon: authorization cache, ingestion pipeline,
//! query/aggregation engine, project lifecycle, and retention sweep.

pub mod auth_cache;
pub mod ingest;
pub mod projects;
pub mod query;
pub mod retention;
pub mod stats;
pub mod usage;
pub mod window;

pub use auth_cache::{AuthCache, Clock, ReadAccess, StaticCredentials, SystemClock, WriteAccess};
pub use ingest::{Accepted, DeferredTask, IngestionPipeline};
pub use projects::ProjectStore;
pub use query::{EventsQuery, PropertySummary, QueryEngine, QueryRequest, QueryResponse};
pub use retention::RetentionSweeper;
pub use stats::{Granularity, StatsResponse};
pub use window::{today_utc, DateWindow, Period};
