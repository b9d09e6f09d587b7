//! Directory-backed storage backend.
//!
//! Each entity is stored as one JSON document named after the SHA-256 of its
//! identifier, so arbitrary identifiers map to safe file names:
//!
//! ```text
//! {directory}/
//! ├── 3f1a...c9.json
//! └── 8be0...12.json
//! ```
//!
//! Writes go to a temp file first and are renamed into place, so a crash
//! mid-write leaves either the old record or the new one.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::traits::{BoxFuture, StorageBackend, StorageError};
use crate::entity::Entity;

/// File extension for persisted records.
const RECORD_EXTENSION: &str = "json";

/// File extension for in-progress writes.
const TEMP_EXTENSION: &str = "tmp";

/// Storage backend persisting one file per entity.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    directory: PathBuf,
}

impl DiskBackend {
    /// Open (creating if needed) a backend rooted at `directory`.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    /// Root directory of the backend.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the record file for an identifier.
    pub fn record_path(&self, id: &str) -> PathBuf {
        let digest = Sha256::digest(id.as_bytes());
        self.directory
            .join(format!("{:x}", digest))
            .with_extension(RECORD_EXTENSION)
    }

    /// Total size of persisted records in bytes, with the record count.
    pub async fn stats(&self) -> Result<(usize, u64), StorageError> {
        let mut files = 0;
        let mut bytes = 0;
        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if is_record(&entry.path()) {
                files += 1;
                bytes += entry.metadata().await?.len();
            }
        }
        Ok((files, bytes))
    }
}

fn is_record(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
}

impl StorageBackend for DiskBackend {
    fn put<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let path = self.record_path(&entity.id);
            let bytes = serde_json::to_vec(entity).map_err(|source| StorageError::Codec {
                path: path.clone(),
                source,
            })?;

            let temp_path = path.with_extension(TEMP_EXTENSION);
            fs::write(&temp_path, &bytes).await?;
            fs::rename(&temp_path, &path).await?;

            debug!(id = %entity.id, bytes = bytes.len(), "Persisted entity");
            Ok(())
        })
    }

    fn load_all(&self) -> BoxFuture<'_, Result<Vec<Entity>, StorageError>> {
        Box::pin(async move {
            let mut entities = Vec::new();
            let mut entries = fs::read_dir(&self.directory).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if !is_record(&path) {
                    continue;
                }
                let bytes = fs::read(&path).await?;
                match serde_json::from_slice::<Entity>(&bytes) {
                    Ok(entity) => entities.push(entity),
                    Err(source) => {
                        // A corrupt record is a cache miss, not a fatal error
                        warn!(path = %path.display(), error = %source, "Skipping unreadable record");
                    }
                }
            }

            debug!(
                directory = %self.directory.display(),
                count = entities.len(),
                "Loaded persisted entities"
            );
            Ok(entities)
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<usize, StorageError>> {
        Box::pin(async move {
            let mut removed = 0;
            let mut entries = fs::read_dir(&self.directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let ext = path.extension().and_then(|ext| ext.to_str());
                if ext == Some(RECORD_EXTENSION) || ext == Some(TEMP_EXTENSION) {
                    fs::remove_file(&path).await?;
                    if ext == Some(RECORD_EXTENSION) {
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ChildEntity, EntityKind};
    use serde_json::{json, Map};

    fn sample(id: &str, x: f64, y: f64) -> Entity {
        let mut payload = Map::new();
        payload.insert("symbol".to_string(), json!(id));
        payload.insert("sectorSymbol".to_string(), json!("X1"));
        Entity::new(id, x, y, EntityKind::OrangeStar)
            .with_payload(payload)
            .with_children(vec![ChildEntity {
                id: format!("{}-A1", id),
                payload: Map::new(),
            }])
    }

    #[tokio::test]
    async fn test_disk_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = DiskBackend::open(dir.path()).await.unwrap();
            backend.put(&sample("X1-A", 1.0, 2.0)).await.unwrap();
            backend.put(&sample("X1-B", -3.5, 4.0)).await.unwrap();
        }

        let reopened = DiskBackend::open(dir.path()).await.unwrap();
        let mut loaded = reopened.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(loaded, vec![sample("X1-A", 1.0, 2.0), sample("X1-B", -3.5, 4.0)]);
    }

    #[tokio::test]
    async fn test_disk_backend_put_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::open(dir.path()).await.unwrap();

        backend.put(&sample("X1-A", 1.0, 2.0)).await.unwrap();
        backend.put(&sample("X1-A", 9.0, 9.0)).await.unwrap();

        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].x, 9.0);
    }

    #[tokio::test]
    async fn test_disk_backend_skips_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::open(dir.path()).await.unwrap();
        backend.put(&sample("X1-A", 1.0, 2.0)).await.unwrap();

        std::fs::write(dir.path().join("garbage.json"), b"{not json").unwrap();

        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_disk_backend_record_path_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::open(dir.path()).await.unwrap();

        let a = backend.record_path("X1/../../etc");
        assert_eq!(a, backend.record_path("X1/../../etc"));
        assert_eq!(a.parent(), Some(dir.path()));
        assert_ne!(a, backend.record_path("X1-B"));
    }

    #[tokio::test]
    async fn test_disk_backend_clear_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::open(dir.path()).await.unwrap();
        backend.put(&sample("X1-A", 1.0, 2.0)).await.unwrap();
        backend.put(&sample("X1-B", 1.0, 2.0)).await.unwrap();

        let (files, bytes) = backend.stats().await.unwrap();
        assert_eq!(files, 2);
        assert!(bytes > 0);

        assert_eq!(backend.clear().await.unwrap(), 2);
        assert!(backend.load_all().await.unwrap().is_empty());
    }
}
