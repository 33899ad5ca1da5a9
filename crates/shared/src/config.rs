//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Object storage configuration. Absent means blobs cannot be stored.
    #[serde(default)]
    pub storage: Option<StorageSettings>,
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
    /// Log every SQL statement through `tracing`.
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Raw object storage settings.
///
/// Turned into a provider-specific configuration by the core crate.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Provider name: `s3`, `fs` or `memory`.
    pub provider: String,
    /// S3 endpoint URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bucket name.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Region.
    #[serde(default)]
    pub region: Option<String>,
    /// Root directory for the filesystem provider.
    #[serde(default)]
    pub root: Option<String>,
    /// Base URL under which stored keys are publicly reachable.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// MIME types accepted for upload.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/jpg", "image/webp"]
        .into_iter()
        .map(String::from)
        .collect()
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
                config::Environment::with_prefix("ADOPET")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.allowed_mime_types")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
