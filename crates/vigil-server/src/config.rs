//! Server configuration loading from file and environment variables.
//!
//! One immutable [`Config`] value is constructed at startup and passed
//! explicitly to the components that need it: the bus host/port to the
//! listener, the retention size to the sweeper, the storage endpoint to
//! the blob proxy. Nothing reads configuration ambiently after boot.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Message bus connection settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Event log retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Object storage proxy settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the built dashboard frontend, served as static
    /// files when present.
    #[serde(default = "default_client_dir")]
    pub client_dir: String,
}

/// Message bus (MQTT broker) connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Broker hostname or IP.
    #[serde(default = "default_bus_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_bus_port")]
    pub port: u16,

    /// Seconds to wait between reconnect attempts after a lost session.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Event log retention settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Maximum number of events retained after a sweep.
    #[serde(default = "default_max_retained")]
    pub max_retained: i64,

    /// Seconds between retention sweeps. Retention is cheap but rarely
    /// urgent; the default is weekly.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Object storage (S3-compatible endpoint) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the S3-compatible storage service.
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    /// Bucket holding recordings and assistant config blobs.
    #[serde(default = "default_storage_bucket")]
    pub bucket: String,

    /// Optional bearer token for the storage endpoint.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vigil_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8000
}

fn default_client_dir() -> String {
    "static".to_string()
}

fn default_bus_host() -> String {
    "localhost".to_string()
}

fn default_bus_port() -> u16 {
    1883
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_db_path() -> String {
    "data/assistant.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_max_retained() -> i64 {
    5_000
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60 * 24 * 7
}

fn default_storage_endpoint() -> String {
    "http://localhost:3900".to_string()
}

fn default_storage_bucket() -> String {
    "voice-commands".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_dir: default_client_dir(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_bus_host(),
            port: default_bus_port(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_retained: default_max_retained(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            bucket: default_storage_bucket(),
            bearer_token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VIGIL_HOST` overrides `server.host`
/// - `VIGIL_PORT` overrides `server.port`
/// - `VIGIL_CLIENT_DIR` overrides `server.client_dir`
/// - `VIGIL_BUS_HOST` overrides `bus.host`
/// - `VIGIL_BUS_PORT` overrides `bus.port`
/// - `VIGIL_DB_PATH` overrides `database.path`
/// - `VIGIL_STORAGE_ENDPOINT` overrides `storage.endpoint`
/// - `VIGIL_STORAGE_BUCKET` overrides `storage.bucket`
/// - `VIGIL_LOG_LEVEL` overrides `logging.level`
/// - `VIGIL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("VIGIL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VIGIL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(dir) = std::env::var("VIGIL_CLIENT_DIR") {
        config.server.client_dir = dir;
    }
    if let Ok(host) = std::env::var("VIGIL_BUS_HOST") {
        config.bus.host = host;
    }
    if let Ok(port) = std::env::var("VIGIL_BUS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.bus.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("VIGIL_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(endpoint) = std::env::var("VIGIL_STORAGE_ENDPOINT") {
        config.storage.endpoint = endpoint;
    }
    if let Ok(bucket) = std::env::var("VIGIL_STORAGE_BUCKET") {
        config.storage.bucket = bucket;
    }
    if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VIGIL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
