//! Runtime configuration resolved from the environment.
//!
//! # Invariants
//! - `data_dir` and `log_dir` are absolute once resolved.
//! - Unset or blank variables fall back to defaults.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DATA_DIR: &str = "FISIO_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "FISIO_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "FISIO_LOG_DIR";

const APP_DIR_NAME: &str = "fisio";
const DEFAULT_DB_FILE_NAME: &str = "fisio.sqlite3";
const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub db_file_name: String,
    pub log_level: String,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No platform data directory and no override.
    NoDataDir,
    /// A configured path is relative.
    RelativePath { variable: &'static str, path: PathBuf },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDataDir => write!(
                f,
                "no local data directory on this platform; set {ENV_DATA_DIR}"
            ),
            Self::RelativePath { variable, path } => {
                write!(f, "{variable} must be absolute, got `{}`", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

impl CoreConfig {
    /// Resolves configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup`, one call per variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let data_dir = match value(ENV_DATA_DIR) {
            Some(raw) => absolute(ENV_DATA_DIR, PathBuf::from(raw))?,
            None => dirs::data_local_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join(APP_DIR_NAME),
        };
        let log_dir = match value(ENV_LOG_DIR) {
            Some(raw) => absolute(ENV_LOG_DIR, PathBuf::from(raw))?,
            None => data_dir.join(LOG_DIR_NAME),
        };
        let log_level = value(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string());

        Ok(Self {
            data_dir,
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            log_level,
            log_dir,
        })
    }

    /// Full path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }
}

fn absolute(variable: &'static str, path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(ConfigError::RelativePath { variable, path })
    }
}
