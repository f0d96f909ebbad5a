//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: contracts::ContractError,
    },

    /// A topic from the configuration could not be registered
    #[error("Failed to register topic '{topic}': {source}")]
    Register {
        topic: String,
        #[source]
        source: dispatcher::DispatcherError,
    },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn config_load(path: &Path, source: contracts::ContractError) -> Self {
        Self::ConfigLoad {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn register(topic: impl Into<String>, source: dispatcher::DispatcherError) -> Self {
        Self::Register {
            topic: topic.into(),
            source,
        }
    }
}

/// Load a configuration file, distinguishing a missing file from a bad one
pub fn load_config(path: &Path) -> Result<contracts::NotifyCondConfig, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path));
    }
    config_loader::ConfigLoader::load_from_path(path).map_err(|e| CliError::config_load(path, e))
}
