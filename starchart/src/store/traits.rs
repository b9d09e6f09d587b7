//! Persistence seam for the entity store.
//!
//! The `StorageBackend` trait is the persistent store primitive underneath
//! [`EntityStore`](super::EntityStore). Backends only persist and reload
//! records; the primary map and the coordinate index live in the store so
//! that range queries never suspend.
//!
//! # Dyn Compatibility
//!
//! Async methods return `Pin<Box<dyn Future>>` so backends can be held as
//! `Arc<dyn StorageBackend>` and swapped at bootstrap time.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use thiserror::Error;

use crate::entity::Entity;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error while reading or writing records.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record could not be encoded or decoded.
    #[error("Failed to encode record {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The backend refused the operation.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistent storage for entity records, keyed by identifier.
///
/// All implementations must be `Send + Sync` for use across async tasks.
pub trait StorageBackend: Send + Sync {
    /// Persist a record, replacing any previous record with the same id.
    fn put<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Load every persisted record.
    ///
    /// Called once when the store opens to rebuild its in-memory index.
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<Entity>, StorageError>>;

    /// Remove every persisted record.
    ///
    /// Returns the number of records removed.
    fn clear(&self) -> BoxFuture<'_, Result<usize, StorageError>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
