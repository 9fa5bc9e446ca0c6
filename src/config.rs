use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::store::MAX_BATCH_WRITES;

pub const DEFAULT_CONFIG_FILE: &str = "progain_tools.json";
pub const DEFAULT_BATCH_SIZE: usize = 499;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("batch size must be between 1 and {}, got {0}", MAX_BATCH_WRITES)]
    InvalidBatchSize(usize),
    #[error("progress interval must be positive")]
    InvalidProgressInterval,
}

/// Configuración compartida por todos los comandos
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub sqlite_path: PathBuf,
    pub credentials_path: PathBuf,
    pub store_dir: PathBuf,
    pub batch_size: usize,
    pub progress_interval: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("progain_database.db"),
            credentials_path: PathBuf::from("firebase_credentials.json"),
            store_dir: PathBuf::from("."),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: 1000,
        }
    }
}

/// Valores de línea de comandos que pisan el archivo de configuración
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sqlite_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
}

impl ToolConfig {
    /// Loads `explicit` if given; otherwise the default file when it exists,
    /// falling back to built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ToolConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        config.validated()
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(path) = overrides.sqlite_path {
            self.sqlite_path = path;
        }
        if let Some(path) = overrides.credentials_path {
            self.credentials_path = path;
        }
        if let Some(dir) = overrides.store_dir {
            self.store_dir = dir;
        }
        if let Some(size) = overrides.batch_size {
            self.batch_size = size;
        }
        self.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_WRITES {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidProgressInterval);
        }
        Ok(self)
    }
}
