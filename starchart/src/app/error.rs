//! Application error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::store::StorageError;
use crate::sync::SyncError;

/// Errors that can occur during application lifecycle.
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to open the entity store.
    #[error("Failed to open entity store: {0}")]
    Store(#[from] StorageError),

    /// Failed to create the remote source.
    #[error("Failed to create remote source: {0}")]
    Remote(#[from] RemoteError),

    /// Background sync failed or was misused.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::from(SyncError::Unauthorized);
        assert_eq!(err.to_string(), "Sync error: Unauthorized");

        let err = AppError::Task("cancelled".to_string());
        assert!(err.to_string().contains("cancelled"));
    }
}
