//! Server configuration, loaded from a TOML file or built in code.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Session cap written onto people created without an explicit one.
pub const DEFAULT_SESSION_MAX: u32 = 5;

/// Everything the keeper needs to come up: where the documents live and the
/// registration defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory holding `universe.xml`, `catalogues.xml` and `agents.db`.
    pub data_dir: PathBuf,
    #[serde(default = "default_session_max")]
    pub default_session_max: u32,
}

fn default_session_max() -> u32 {
    DEFAULT_SESSION_MAX
}

/// Errors while reading or parsing the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ServerConfig {
    /// A configuration with defaults for everything but the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_session_max: DEFAULT_SESSION_MAX,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
