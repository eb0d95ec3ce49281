//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! configuration files or `CHAINSTORE_`-prefixed environment variables.
//! Only the concerns of the storage layer are configured here; chain RPC
//! and pipeline settings belong to the embedding process.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Database configuration.
    pub database: DatabaseSettings,
    /// Contract-read cache configuration.
    pub cache: CacheSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `CHAINSTORE_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("database.url", "postgres://localhost/chainstore")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout_ms", 5000)?
            .set_default("database.idle_timeout_ms", 600_000)?
            .set_default("cache.contract_reads_ttl_ms", 300_000)?
            .set_default("cache.contract_reads_max_capacity", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (CHAINSTORE_ prefix)
            .add_source(
                Environment::with_prefix("CHAINSTORE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url cannot be empty".into());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be non-zero".into());
        }
        if self.database.min_connections > self.database.max_connections {
            errors.push("database.min_connections cannot exceed max_connections".into());
        }
        if self.cache.contract_reads_max_capacity == 0 {
            errors.push("cache.contract_reads_max_capacity must be non-zero".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum connections in the pool.
    pub max_connections: u32,
    /// Minimum connections to maintain.
    pub min_connections: u32,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Idle connection timeout in milliseconds.
    pub idle_timeout_ms: u64,
}

impl DatabaseSettings {
    /// Get the connection timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get the idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Build a connection pool from these settings.
    ///
    /// # Errors
    /// Returns a `sqlx::Error` if the database is unreachable.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout())
            .idle_timeout(self.idle_timeout())
            .connect(&self.url)
            .await
    }
}

/// Contract-read cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// TTL for in-memory contract read entries in milliseconds.
    pub contract_reads_ttl_ms: u64,
    /// Maximum capacity of the in-memory contract read cache.
    pub contract_reads_max_capacity: u64,
}

impl CacheSettings {
    /// Get the contract read TTL as a `Duration`.
    #[must_use]
    pub const fn contract_reads_ttl(&self) -> Duration {
        Duration::from_millis(self.contract_reads_ttl_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
