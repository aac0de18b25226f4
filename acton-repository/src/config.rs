//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `ACTON_REPOSITORY_`, `__` between nested keys)
//! 2. Current working directory: ./acton-repository.toml
//! 3. XDG config directory: ~/.config/acton-repository/config.toml
//! 4. System directory: /etc/acton-repository/config.toml
//! 5. Default values
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "acton_repository=debug,info"
//! format = "pretty"
//!
//! [paging]
//! default_page_size = 25
//! max_page_size = 200
//!
//! [database]
//! url = "sqlite://data/app.db"
//! max_connections = 8
//! ```
//!
//! ```bash
//! ACTON_REPOSITORY_PAGING__MAX_PAGE_SIZE=50 ./my-service
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::query::{PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

const APP_NAME: &str = "acton-repository";
const ENV_PREFIX: &str = "ACTON_REPOSITORY_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Paging limits applied by every façade
    #[serde(default)]
    pub paging: PagingConfig,

    /// SQLite configuration (optional)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or `EnvFilter` syntax)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, human-oriented
    Pretty,
    /// Single-line, human-oriented
    Compact,
}

/// Paging configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Page size used by `query_page` when the caller gives none
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Largest page size a caller may request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl PagingConfig {
    /// First page at the default size
    pub fn default_request(&self) -> PageRequest {
        PageRequest::first(self.default_page_size)
    }

    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(Error::InvalidConfig(
                "paging sizes must be at least 1".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(Error::InvalidConfig(format!(
                "paging.default_page_size ({}) exceeds paging.max_page_size ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// SQLite configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL (`sqlite://path.db`, `sqlite::memory:`)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_secs: default_connection_timeout(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_database_url() -> String {
    "sqlite://acton-repository.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Config files are merged lowest priority first, so a key in
    /// ./acton-repository.toml beats the same key under /etc.
    /// Environment variables override all file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses the search path and loads directly from the given path.
    /// Environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.paging.validate()?;
        Ok(config)
    }

    /// Find all possible config file paths
    ///
    /// Returns paths in priority order (highest first):
    /// 1. Current working directory
    /// 2. XDG config directory (only if the file exists)
    /// 3. System directory
    pub fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(format!("{APP_NAME}.toml"))];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME);
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc").join(APP_NAME).join("config.toml"));
        paths
    }

    /// Get database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.paging.default_page_size, 20);
        assert_eq!(config.paging.max_page_size, 100);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_load_from_file() {
        Jail::expect_with(|_jail| {
            let mut file = tempfile::NamedTempFile::new().map_err(|e| e.to_string())?;
            write!(
                file,
                r#"
                [logging]
                format = "compact"

                [paging]
                default_page_size = 10

                [database]
                url = "sqlite::memory:"
                "#
            )
            .map_err(|e| e.to_string())?;

            let config = Config::load_from(file.path()).map_err(|e| e.to_string())?;
            assert_eq!(config.logging.format, LogFormat::Compact);
            assert_eq!(config.logging.level, "info");
            assert_eq!(config.paging.default_page_size, 10);
            assert_eq!(config.paging.max_page_size, 100);

            let database = config.database.expect("database section");
            assert_eq!(database.url, "sqlite::memory:");
            assert_eq!(database.max_connections, 5);
            assert_eq!(database.max_retries, 3);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "acton-repository.toml",
                r#"
                [paging]
                max_page_size = 500
                "#,
            )?;
            jail.set_env("ACTON_REPOSITORY_PAGING__MAX_PAGE_SIZE", "50");
            jail.set_env("ACTON_REPOSITORY_LOGGING__LEVEL", "debug");

            let config = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(config.paging.max_page_size, 50);
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_cwd_file_is_found() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "acton-repository.toml",
                r#"
                [logging]
                format = "pretty"
                "#,
            )?;
            let config = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(config.logging.format, LogFormat::Pretty);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_paging_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "paging.toml",
                r#"
                [paging]
                default_page_size = 80
                max_page_size = 40
                "#,
            )?;
            let err = Config::load_from("paging.toml").unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)));
            Ok(())
        });
    }

    #[test]
    fn test_default_request() {
        let paging = PagingConfig {
            default_page_size: 15,
            max_page_size: 100,
        };
        assert_eq!(paging.default_request(), PageRequest::new(1, 15));
    }
}
