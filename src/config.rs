use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// =============================================================================
// Pagination constants
// =============================================================================

/// Page size used when the caller asks for fewer than `MIN_PAGE_SIZE` items
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound for a single page
pub const MAX_PAGE_SIZE: u32 = 100;

pub const MIN_PAGE_SIZE: u32 = 1;

// =============================================================================
// Resolution constants
// =============================================================================

/// Maximum number of requests accepted in one resolve batch
pub const MAX_BATCH_SIZE: usize = 100;

/// Timeout for a whole batch resolution in milliseconds (30 seconds)
pub const RESOLVE_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// Validation constants
// =============================================================================

pub const MAX_POLICY_NAME_LENGTH: usize = 100;
pub const MAX_VERSION_LENGTH: usize = 50;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Allowed characters for policy names
pub const POLICY_NAME_PATTERN: &str = r"^[a-zA-Z0-9_-]+$";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HubConfig {
    pub database: DatabaseConfig,
    pub resolve: ResolveConfig,
    pub log: LogConfig,
}

/// Database-related configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Path to the SQLite database, defaults to `db_path()`
    pub path: Option<PathBuf>,
}

/// Batch resolution configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolveConfig {
    pub max_batch_size: usize,
    /// Whole-batch timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            timeout_ms: RESOLVE_TIMEOUT_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Default filter directive, e.g. "info" or "policy_hub=debug"
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file is not an error and yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match Self::load_from(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            result => result,
        }
    }

    /// Load configuration from a file the user named explicitly.
    ///
    /// Unlike [`HubConfig::load`], the file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Database path from config, falling back to the data directory
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(db_path)
    }
}

/// Returns the path to the data directory for policy-hub.
/// Uses $XDG_DATA_HOME/policy-hub if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/policy-hub,
/// or ./policy-hub if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file.
pub fn db_path() -> PathBuf {
    data_dir().join("policies.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("policy-hub.log")
}

/// Returns the path to the default config file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("policy-hub")
}
