//! Beacon multi-tenant analytics engine
//!
//! Event ingestion and aggregate query service:
//! - token-authenticated ingestion with per-tenant daily rate limits
//! - session correlation via atomic upserts
//! - allowlisted query/stats surface over a pluggable storage adapter
//! - background retention sweep

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use api::{router, AppState};
use beacon_engine::{AuthCache, RetentionSweeper, StaticCredentials};
use beacon_storage::{init_schema, StorageConfig};
use telemetry::init_tracing_from_env;

/// Auth configuration: static credential lists for single-tenant
/// deployments, and the project cache TTL.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct AuthConfig {
    /// Comma-separated project tokens accepted for ingestion.
    #[serde(default)]
    write_tokens: String,
    /// Comma-separated API keys accepted for reads.
    #[serde(default)]
    read_keys: String,
    /// Cache TTL override in seconds.
    #[serde(default)]
    cache_ttl_secs: Option<u64>,
}

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    auth: AuthConfig,

    #[serde(default)]
    storage: StorageConfig,

    /// Seconds between retention sweeps.
    #[serde(default = "default_retention_interval")]
    retention_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_retention_interval() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            retention_interval_secs: default_retention_interval(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Beacon Analytics Engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;

    info!(
        backend = ?config.storage.backend,
        "Loaded storage config"
    );

    // Connect the configured storage adapter and make sure the schema
    // exists.
    let storage = beacon_storage::connect(&config.storage)
        .await
        .context("Failed to connect storage")?;
    init_schema(&storage)
        .await
        .context("Failed to initialize schema")?;

    // Authorization cache with optional static credentials.
    let statics = StaticCredentials::from_lists(&config.auth.write_tokens, &config.auth.read_keys);
    let mut auth = AuthCache::new(storage.clone(), statics);
    if let Some(ttl) = config.auth.cache_ttl_secs {
        auth = auth.with_ttl(Duration::from_secs(ttl));
    }
    let auth = Arc::new(auth);

    // Background retention sweep.
    let sweeper = Arc::new(RetentionSweeper::new(
        storage.clone(),
        auth.clone(),
        Duration::from_secs(config.retention_interval_secs),
    ));
    let _retention_handle = sweeper.start();
    info!(
        interval_secs = config.retention_interval_secs,
        "Started retention sweeper"
    );

    // Create application state and router.
    let state = AppState::new(storage, auth);
    let app = router(state);

    // Start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("BEACON")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested sections from environment.
    // The config crate's nested parsing doesn't work reliably with
    // underscored field names.
    if let Ok(backend) = std::env::var("BEACON_STORAGE_BACKEND") {
        config.storage.backend = match backend.as_str() {
            "remote" => beacon_storage::StorageBackend::Remote,
            _ => beacon_storage::StorageBackend::Embedded,
        };
    }
    if let Ok(path) = std::env::var("BEACON_STORAGE_PATH") {
        config.storage.path = path;
    }
    if let Ok(url) = std::env::var("BEACON_STORAGE_URL") {
        config.storage.url = url;
    }
    if let Ok(token) = std::env::var("BEACON_STORAGE_AUTH_TOKEN") {
        config.storage.auth_token = token;
    }
    if let Ok(tokens) = std::env::var("BEACON_AUTH_WRITE_TOKENS") {
        config.auth.write_tokens = tokens;
    }
    if let Ok(keys) = std::env::var("BEACON_AUTH_READ_KEYS") {
        config.auth.read_keys = keys;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
