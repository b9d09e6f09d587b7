//! CLI error type.

use thiserror::Error;

use starchart::app::AppError;
use starchart::config::ConfigError;
use starchart::logging::LoggingError;
use starchart::store::StorageError;
use starchart::sync::SyncError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Storage error: {0}")]
    Store(#[from] StorageError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Failed to create async runtime: {0}")]
    Runtime(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Sync(SyncError::Unauthorized)
            | CliError::App(AppError::Sync(SyncError::Unauthorized)) => 3,
            CliError::Sync(SyncError::NotFound(_))
            | CliError::App(AppError::Sync(SyncError::NotFound(_))) => 4,
            CliError::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}
