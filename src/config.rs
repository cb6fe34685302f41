//! Store Configuration

use std::path::PathBuf;

/// Default location of the forms document
pub const DATA_PATH_DEFAULT: &str = "./data/forms.json";

/// Invalid store settings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("data path cannot be empty")]
    EmptyDataPath,
}

/// What to do when the persisted document cannot be turned into a valid
/// collection, even after repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OnLoadFailure {
    /// Log and serve an empty collection
    #[default]
    UseEmpty,
    /// Fail the request; the next access retries the load
    Abort,
}

/// Settings for a file-backed form store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Path of the JSON document
    pub data_path: PathBuf,
    pub on_load_failure: OnLoadFailure,
}

impl StoreConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            on_load_failure: OnLoadFailure::default(),
        }
    }

    /// Build from a user-supplied path, expanding `~`.
    ///
    /// # Errors
    /// `ConfigError::EmptyDataPath` for an empty or all-whitespace path.
    pub fn from_raw_path(raw: &str, on_load_failure: OnLoadFailure) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::EmptyDataPath);
        }
        Ok(Self {
            data_path: PathBuf::from(shellexpand::tilde(raw).to_string()),
            on_load_failure,
        })
    }

    pub fn with_on_load_failure(mut self, on_load_failure: OnLoadFailure) -> Self {
        self.on_load_failure = on_load_failure;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DATA_PATH_DEFAULT)
    }
}
