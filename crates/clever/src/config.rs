//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/clever/config.toml` (or `$CLEVER_CONFIG_DIR/config.toml`)
//! 2. `./clever.toml` (project-local)
//! 3. `--config <file>` and `--db <path>` (applied by the caller)
//!
//! Layers merge key by key: a later layer that sets only
//! `repository_timeout_ms` keeps the `max_sessions` of an earlier one.
//!
//! ```toml
//! [database]
//! path = "/var/lib/clever/sessions.db"
//!
//! [session]
//! max_sessions = 10000
//! repository_timeout_ms = 5000
//! authenticated_key = "authenticated"
//! ```

use std::path::{Path, PathBuf};

use clever_session::StoreConfig;
use serde::{Deserialize, Serialize};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "clever.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Default database filename within the user data directory.
const DATABASE_FILE: &str = "sessions.db";

/// Application name for directory resolution.
const APP_NAME: &str = "clever";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "CLEVER_CONFIG_DIR";

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Root configuration structure.
///
/// All sections are optional so partial layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleverConfig {
    /// Session database location.
    pub database: Option<DatabaseConfig>,

    /// Session store settings.
    pub session: SessionSection,
}

/// `[session]` overrides; unset keys fall through to lower layers, then to
/// [`StoreConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_sessions: Option<usize>,
    pub ttl_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub repository_timeout_ms: Option<u64>,
    pub principal_key: Option<String>,
    pub authenticated_key: Option<String>,
}

impl SessionSection {
    /// Overlay `other` on top of this section, key by key.
    pub fn merge(&mut self, other: SessionSection) {
        if other.max_sessions.is_some() {
            self.max_sessions = other.max_sessions;
        }
        if other.ttl_secs.is_some() {
            self.ttl_secs = other.ttl_secs;
        }
        if other.cleanup_interval_secs.is_some() {
            self.cleanup_interval_secs = other.cleanup_interval_secs;
        }
        if other.repository_timeout_ms.is_some() {
            self.repository_timeout_ms = other.repository_timeout_ms;
        }
        if other.principal_key.is_some() {
            self.principal_key = other.principal_key;
        }
        if other.authenticated_key.is_some() {
            self.authenticated_key = other.authenticated_key;
        }
    }

    /// Resolve against the store defaults.
    pub fn resolve(&self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            max_sessions: self.max_sessions.unwrap_or(defaults.max_sessions),
            ttl_secs: self.ttl_secs.or(defaults.ttl_secs),
            cleanup_interval_secs: self
                .cleanup_interval_secs
                .unwrap_or(defaults.cleanup_interval_secs),
            repository_timeout_ms: self
                .repository_timeout_ms
                .unwrap_or(defaults.repository_timeout_ms),
            principal_key: self.principal_key.clone().unwrap_or(defaults.principal_key),
            authenticated_key: self
                .authenticated_key
                .clone()
                .unwrap_or(defaults.authenticated_key),
        }
    }
}

/// Session database configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: Option<PathBuf>,
}

impl CleverConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: CleverConfig) {
        if let Some(db) = other.database
            && db.path.is_some()
        {
            self.database = Some(db);
        }
        self.session.merge(other.session);
    }

    /// Effective database path, falling back to the user data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_ref()
            .and_then(|db| db.path.clone())
            .unwrap_or_else(default_database_path)
    }

    /// Effective store configuration.
    pub fn store_config(&self) -> StoreConfig {
        self.session.resolve()
    }

    /// Override the database path.
    pub fn set_database_path(&mut self, path: PathBuf) {
        self.database = Some(DatabaseConfig { path: Some(path) });
    }
}

/// Tracks where a config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: CleverConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge config layers.
///
/// `explicit` is loaded last and must exist; the discovered layers are optional.
pub fn load_config(project_dir: Option<&Path>, explicit: Option<&Path>) -> Result<LoadedConfig> {
    let mut config = CleverConfig::default();
    let mut sources = Vec::new();

    if let Some(path) = user_config_path() {
        sources.push(load_layer(&mut config, &path)?);
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path)?);

    if let Some(path) = explicit {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    Ok(LoadedConfig { config, sources })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<CleverConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CleverConfig::from_toml(&contents)
}

/// User config directory: `$CLEVER_CONFIG_DIR`, else the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME).join(DATABASE_FILE))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
}

/// Merge a config file if it exists. Missing files are skipped; broken ones are errors.
fn load_layer(config: &mut CleverConfig, path: &Path) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    config.merge(load_config_file(path)?);
    Ok(ConfigSource {
        path: path.to_path_buf(),
        loaded: true,
    })
}
