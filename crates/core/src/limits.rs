//! Size and shape limits for the analytics engine.
//!
//! Validation limits are enforced before any authorization or storage
//! work happens. The `#[validate]` derive macro requires literal values
//! in attributes, so field limits are duplicated there; keep both in
//! sync when modifying.

// === Batch limits ===

/// Maximum events per batch request.
pub const MAX_BATCH_EVENTS: usize = 100;

/// Maximum request body size in bytes (1MB).
///
/// Enforced at the transport boundary so the pipeline never sees an
/// unbounded payload.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// === Event field limits ===

/// Maximum properties JSON size in bytes (16KB).
pub const MAX_PROPERTIES_BYTES: usize = 16 * 1024;

/// Event name max length.
pub const MAX_EVENT_NAME_LEN: usize = 200;

/// Project identifier max length.
pub const MAX_PROJECT_LEN: usize = 128;

/// User ID max length. UUIDs=36, emails=~50, custom IDs up to 128.
pub const MAX_USER_ID_LEN: usize = 128;

/// Session ID max length.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Page path/url max length carried into session entry/exit pages.
pub const MAX_PAGE_LEN: usize = 2048;

// === Query limits ===

/// Default row limit for query and event-listing responses.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Hard cap on returned rows; requested limits are clamped into
/// [1, MAX_QUERY_LIMIT].
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Default reporting window in days when no explicit range is given.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Number of entries in the stats top-events list.
pub const TOP_EVENTS_LIMIT: u32 = 20;

/// Row cap when scanning properties blobs for key discovery.
pub const PROPERTY_SCAN_LIMIT: u32 = 1000;

// === Auth ===

/// Auth cache refresh interval in seconds.
pub const AUTH_CACHE_TTL_SECS: u64 = 60;

/// Allowed pattern for `properties.<key>` filter keys. The key is the
/// only user-controlled text that ever reaches query text, so it must
/// stay a plain identifier.
pub const PROPERTY_KEY_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,63}$";
