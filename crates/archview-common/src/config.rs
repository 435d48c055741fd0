//! Configuration for archview

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "ARCHVIEW_CONFIG";

/// Prefix for environment overrides, e.g. `ARCHVIEW__DATABASE__URL`
const ENV_PREFIX: &str = "ARCHVIEW";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Attachment cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres://...)
    pub url: Option<String>,

    /// Schema holding the archive tables
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Table holding attachment rows
    #[serde(default = "default_attachments_table")]
    pub attachments_table: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: default_schema(),
            attachments_table: default_attachments_table(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_attachments_table() -> String {
    "attachments".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Attachment cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for cached metadata, bytes and message indexes
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of metadata records kept in memory
    #[serde(default = "default_metadata_capacity")]
    pub metadata_capacity: usize,

    /// Attempts for a background cache write before giving up
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            metadata_capacity: default_metadata_capacity(),
            write_attempts: default_write_attempts(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".data")
}

fn default_metadata_capacity() -> usize {
    4096
}

fn default_write_attempts() -> u32 {
    3
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from a file, with environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        Self::build(Some(path))
    }

    /// Load configuration from the environment and the first file found
    pub fn load() -> crate::Result<Self> {
        let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        if let Some(path) = &explicit {
            if !path.exists() {
                return Err(crate::Error::Config(format!(
                    "Configuration file {} does not exist",
                    path.display()
                )));
            }
        }

        let path = explicit.or_else(|| {
            [
                PathBuf::from("./config.toml"),
                PathBuf::from("/etc/archview/config.toml"),
            ]
            .into_iter()
            .find(|p| p.exists())
        });

        Self::build(path.as_deref())
    }

    fn build(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Reading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}
