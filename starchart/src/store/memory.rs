//! Volatile storage backend.
//!
//! Keeps records in a map for the lifetime of the process. Used by tests and
//! by the CLI when persistence is disabled.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::traits::{BoxFuture, StorageBackend, StorageError};
use crate::entity::Entity;

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Entity>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with records.
    pub fn with_records(entities: impl IntoIterator<Item = Entity>) -> Self {
        let records = entities
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn put<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.records
                .lock()
                .insert(entity.id.clone(), entity.clone());
            Ok(())
        })
    }

    fn load_all(&self) -> BoxFuture<'_, Result<Vec<Entity>, StorageError>> {
        Box::pin(async move { Ok(self.records.lock().values().cloned().collect()) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<usize, StorageError>> {
        Box::pin(async move {
            let mut records = self.records.lock();
            let removed = records.len();
            records.clear();
            Ok(removed)
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    #[tokio::test]
    async fn test_memory_backend_put_and_load() {
        let backend = MemoryBackend::new();
        let entity = Entity::new("A", 1.0, 2.0, EntityKind::RedStar);

        backend.put(&entity).await.unwrap();

        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded, vec![entity]);
    }

    #[tokio::test]
    async fn test_memory_backend_put_replaces() {
        let backend = MemoryBackend::new();
        backend
            .put(&Entity::new("A", 1.0, 2.0, EntityKind::RedStar))
            .await
            .unwrap();
        backend
            .put(&Entity::new("A", 5.0, 6.0, EntityKind::RedStar))
            .await
            .unwrap();

        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].x, 5.0);
    }

    #[tokio::test]
    async fn test_memory_backend_clear() {
        let backend = MemoryBackend::with_records(vec![
            Entity::new("A", 0.0, 0.0, EntityKind::Nebula),
            Entity::new("B", 0.0, 0.0, EntityKind::Nebula),
        ]);
        assert_eq!(backend.clear().await.unwrap(), 2);
        assert!(backend.is_empty());
    }
}
