//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Which store backs the engine.
    #[serde(default)]
    pub storage: StorageConfig,
    /// External collaborator endpoints.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Approval engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SeaORM over PostgreSQL.
    #[default]
    Postgres,
    /// Process-local store, lost on restart.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Backend used by the server.
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Base URLs of the services the engine calls out to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Group hierarchy service.
    #[serde(default = "default_manage_url")]
    pub group_url: String,
    /// User directory service (users by group and role).
    #[serde(default = "default_manage_url")]
    pub user_url: String,
    /// Business-data service holding staged changes.
    #[serde(default = "default_business_url")]
    pub business_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            group_url: default_manage_url(),
            user_url: default_manage_url(),
            business_url: default_business_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_manage_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_business_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// What a caller does when the workflow lookup itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Log the failure and proceed as if no approval were required.
    #[default]
    FailOpen,
    /// Surface the failure to the caller.
    FailClosed,
}

/// Engine tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Policy applied by `FindUserWorkflows` on lookup failure.
    #[serde(default)]
    pub resolution_policy: ResolutionPolicy,
    /// Days until a newly created step's advisory expiry date.
    #[serde(default = "default_step_expiry_days")]
    pub step_expiry_days: i64,
    /// Upper bound on hierarchy levels walked by the resolver.
    #[serde(default = "default_max_group_depth")]
    pub max_group_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution_policy: ResolutionPolicy::default(),
            step_expiry_days: default_step_expiry_days(),
            max_group_depth: default_max_group_depth(),
        }
    }
}

fn default_step_expiry_days() -> i64 {
    5
}

fn default_max_group_depth() -> usize {
    64
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Output format of the fmt layer.
    #[serde(default)]
    pub format: LogFormat,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("RINGI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
