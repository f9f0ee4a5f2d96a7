//! Configuration module for fitsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::TenantId;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for fitsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    pub connectivity: ConnectivityConfig,
    pub sync: SyncConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Write the entity change and its queue entry in a single transaction.
    ///
    /// Off by default: the entity write and the enqueue are two separate
    /// store operations and an enqueue failure only loses offline replay
    /// for that one write.
    pub atomic_enqueue: bool,
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST backend (the `/rest/v1` prefix is appended).
    pub base_url: String,
    /// Public API key sent as the `apikey` header.
    pub api_key: Option<String>,
    /// Bearer token of the authenticated user.
    pub access_token: Option<String>,
}

/// Reachability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Always-available resource requested to verify connectivity.
    pub probe_url: String,
    /// Hard timeout of the probe, in seconds.
    pub probe_timeout_secs: u64,
}

/// Sync scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic drains while online.
    pub periodic_interval_secs: u64,
    /// Cooldown window in which repeated triggers collapse into one drain.
    pub debounce_secs: u64,
    /// Failed attempts after which an entry is skipped. `None` retries forever.
    pub max_retries: Option<u32>,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Tenant identifier of the signed-in trainer.
    pub trainer_id: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/fitsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("fitsync")
            .join("config.yaml")
    }

    /// Tenant configured under `auth.trainer_id`, if valid.
    pub fn tenant(&self) -> Option<TenantId> {
        self.auth
            .trainer_id
            .as_deref()
            .and_then(|id| TenantId::new(id).ok())
    }
}

impl SyncConfig {
    /// Periodic drain interval, never shorter than one second
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "http://localhost:54321";

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("fitsync")
                .join("fitsync.db"),
            atomic_enqueue: false,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            access_token: None,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: format!("{DEFAULT_BASE_URL}/health"),
            probe_timeout_secs: 5,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            periodic_interval_secs: 60,
            debounce_secs: 3,
            max_retries: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.debounce_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        if !is_http_url(&self.remote.base_url) {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!(
                    "must start with http:// or https://, got '{}'",
                    self.remote.base_url
                ),
            });
        }

        // --- connectivity ---
        if !is_http_url(&self.connectivity.probe_url) {
            errors.push(ValidationError {
                field: "connectivity.probe_url".into(),
                message: format!(
                    "must start with http:// or https://, got '{}'",
                    self.connectivity.probe_url
                ),
            });
        }
        if !(1..=9).contains(&self.connectivity.probe_timeout_secs) {
            errors.push(ValidationError {
                field: "connectivity.probe_timeout_secs".into(),
                message: "must be in range 1..=9".into(),
            });
        }

        // --- sync ---
        if self.sync.periodic_interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.periodic_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !(1..=9).contains(&self.sync.debounce_secs) {
            errors.push(ValidationError {
                field: "sync.debounce_secs".into(),
                message: "must be in range 1..=9".into(),
            });
        }
        if self.sync.max_retries == Some(0) {
            errors.push(ValidationError {
                field: "sync.max_retries".into(),
                message: "must be greater than 0 when set".into(),
            });
        }

        // --- auth ---
        if let Some(id) = &self.auth.trainer_id {
            if id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "auth.trainer_id".into(),
                    message: "must not be empty when set".into(),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use fitsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .remote_base_url("https://api.example.com")
///     .sync_max_retries(10)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- store ---

    pub fn store_database_path(mut self, path: PathBuf) -> Self {
        self.config.store.database_path = path;
        self
    }

    pub fn store_atomic_enqueue(mut self, atomic: bool) -> Self {
        self.config.store.atomic_enqueue = atomic;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.remote.api_key = Some(key.into());
        self
    }

    pub fn remote_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.remote.access_token = Some(token.into());
        self
    }

    // --- connectivity ---

    pub fn connectivity_probe_url(mut self, url: impl Into<String>) -> Self {
        self.config.connectivity.probe_url = url.into();
        self
    }

    pub fn connectivity_probe_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_periodic_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.periodic_interval_secs = seconds;
        self
    }

    pub fn sync_debounce_secs(mut self, seconds: u64) -> Self {
        self.config.sync.debounce_secs = seconds;
        self
    }

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = Some(n);
        self
    }

    // --- auth ---

    pub fn auth_trainer_id(mut self, trainer_id: impl Into<String>) -> Self {
        self.config.auth.trainer_id = Some(trainer_id.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
