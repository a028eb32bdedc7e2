// crates/schemaless-config/src/config.rs
// ============================================================================
// Module: Schemaless Configuration
// Description: Configuration loading and validation for the cell store.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: schemaless-core, schemaless-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed.
//!
//! ```toml
//! [chooser]
//! algorithm = "jump"
//!
//! [index]
//! resolution = "join"
//!
//! [logging]
//! level = "info"
//!
//! [[shards]]
//! name = "shard-0"
//! path = "data/shard-0.db"
//! ```
//!
//! Shard declaration order is the chooser's bucket order, so reordering
//! shards in an existing deployment relocates rows under jump hashing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use schemaless_core::Chooser;
use schemaless_core::JumpHashChooser;
use schemaless_core::KvStore;
use schemaless_core::RendezvousChooser;
use schemaless_core::Shard;
use schemaless_core::StoreError;
use schemaless_store_sqlite::DEFAULT_MAX_BODY_BYTES;
use schemaless_store_sqlite::IndexResolution;
use schemaless_store_sqlite::SqliteBackend;
use schemaless_store_sqlite::SqliteBackendConfig;
use schemaless_store_sqlite::SqliteBackendError;
use schemaless_store_sqlite::SqliteStoreMode;
use schemaless_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "schemaless.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SCHEMALESS_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a shard name in bytes.
const MAX_SHARD_NAME_LENGTH: usize = 128;
/// Default busy timeout for shard connections.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Accepted logging levels.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemalessConfig {
    /// Row placement settings.
    #[serde(default)]
    pub chooser: ChooserConfig,
    /// Index query settings shared by every shard.
    #[serde(default)]
    pub index: IndexConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Shards in bucket order.
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
}

/// Row placement algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChooserAlgorithm {
    /// Jump consistent hashing over bucket positions.
    #[default]
    Jump,
    /// Highest-random-weight hashing over bucket names.
    Rendezvous,
}

/// `[chooser]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ChooserConfig {
    /// Placement algorithm.
    #[serde(default)]
    pub algorithm: ChooserAlgorithm,
}

impl ChooserConfig {
    /// Builds an empty chooser for the configured algorithm.
    #[must_use]
    pub fn build(self) -> Box<dyn Chooser> {
        match self.algorithm {
            ChooserAlgorithm::Jump => Box::new(JumpHashChooser::new()),
            ChooserAlgorithm::Rendezvous => Box::new(RendezvousChooser::new()),
        }
    }
}

/// `[index]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// How index hits are resolved to cells.
    #[serde(default)]
    pub resolution: IndexResolution,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl LoggingConfig {
    /// Validates the log level.
    fn validate(&self) -> Result<(), ConfigError> {
        if LOG_LEVELS.contains(&self.level.as_str()) {
            return Ok(());
        }
        Err(ConfigError::Invalid(format!(
            "logging.level must be one of {}",
            LOG_LEVELS.join(", ")
        )))
    }
}

/// One `[[shards]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShardConfig {
    /// Shard name, used as the chooser bucket.
    pub name: String,
    /// `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Maximum accepted cell body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ShardConfig {
    /// Returns the backend configuration for this shard.
    #[must_use]
    pub fn backend_config(&self, index: IndexConfig) -> SqliteBackendConfig {
        SqliteBackendConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            index_resolution: index.resolution,
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Validates one shard entry.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("shards.name must be non-empty".to_string()));
        }
        if self.name.len() > MAX_SHARD_NAME_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "shards.name exceeds {MAX_SHARD_NAME_LENGTH} bytes"
            )));
        }
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!("shard {} path must be non-empty", self.name)));
        }
        validate_path(&self.path)?;
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "shard {} busy_timeout_ms must be greater than zero",
                self.name
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(format!(
                "shard {} max_body_bytes must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

impl SchemalessConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::parse(content)?;
        tracing::debug!(path = %resolved.display(), shards = config.shards.len(), "loaded config");
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid("at least one shard is required".to_string()));
        }
        let mut names = BTreeSet::new();
        let mut paths = BTreeSet::new();
        for shard in &self.shards {
            shard.validate()?;
            if !names.insert(shard.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate shard name {}", shard.name)));
            }
            if !paths.insert(shard.path.as_path()) {
                return Err(ConfigError::Invalid(format!(
                    "shard {} reuses another shard's path",
                    shard.name
                )));
            }
        }
        Ok(())
    }

    /// Opens every shard and returns a router over them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Store`] when a shard cannot be opened or the
    /// router rejects the shard list.
    pub fn build_store(&self) -> Result<KvStore, ConfigError> {
        let mut shards = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let backend = SqliteBackend::open(shard.backend_config(self.index))?;
            shards.push(Shard::new(shard.name.clone(), Arc::new(backend)));
        }
        let store = KvStore::new(self.chooser.build(), shards)?;
        tracing::info!(shards = self.shards.len(), "opened cell store");
        Ok(store)
    }
}

/// Returns the default log level.
fn default_log_level() -> String {
    "info".to_string()
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default body size limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// A configured shard could not be opened.
    #[error("config store error: {0}")]
    Store(String),
}

impl From<SqliteBackendError> for ConfigError {
    fn from(error: SqliteBackendError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<StoreError> for ConfigError {
    fn from(error: StoreError) -> Self {
        Self::Store(error.to_string())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}
