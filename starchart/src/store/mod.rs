//! Persistent, coordinate-indexed entity store.
//!
//! The [`EntityStore`] is the single source of truth for cached entities. It
//! keeps an in-memory primary map and a [`CoordIndex`] behind one lock, and
//! writes every change through a [`StorageBackend`] before making it visible.
//!
//! # Architecture
//!
//! ```text
//! upsert_many ──► StorageBackend::put ──► ┌──────────────────────────┐
//!                  (await, may fail)       │ RwLock<StoreState>       │
//!                                          │  records: id -> Entity   │──► query_range
//!                                          │  index:   (x, y, id)     │──► get_by_id
//!                                          └────────────┬─────────────┘
//!                                                       ▼
//!                                          broadcast<StoreChange> ──► subscribers
//! ```
//!
//! Record and index are updated in the same critical section, so a reader
//! never observes one without the other. Reads are synchronous and never
//! suspend.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use starchart::store::{EntityStore, MemoryBackend};
//! use starchart::geometry::Rect;
//!
//! let store = EntityStore::open(Arc::new(MemoryBackend::new())).await?;
//! store.upsert_many(entities).await?;
//! let visible = store.query_range(&Rect::new(0.0, 0.0, 100.0, 100.0));
//! ```

mod disk;
mod index;
mod memory;
mod traits;

pub use disk::DiskBackend;
pub use index::CoordIndex;
pub use memory::MemoryBackend;
pub use traits::{BoxFuture, StorageBackend, StorageError};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::geometry::Rect;

/// Default capacity of the change notification channel.
pub const DEFAULT_CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// A change applied to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// An entity with a new identifier was stored.
    Added(Entity),
    /// An existing entity was replaced with different content.
    Updated(Entity),
}

impl StoreChange {
    /// The entity after the change.
    pub fn entity(&self) -> &Entity {
        match self {
            StoreChange::Added(entity) | StoreChange::Updated(entity) => entity,
        }
    }
}

/// Outcome of an [`EntityStore::upsert_many`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Entities with previously unseen identifiers.
    pub added: usize,
    /// Entities whose stored content changed.
    pub updated: usize,
    /// Entities identical to what was already stored.
    pub unchanged: usize,
    /// Entities skipped for an empty id or a non-finite coordinate.
    pub rejected: usize,
}

impl UpsertSummary {
    /// Number of entities that changed store content.
    pub fn changed(&self) -> usize {
        self.added + self.updated
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<String, Entity>,
    index: CoordIndex,
}

impl StoreState {
    /// Replace or insert a record, keeping the index in step.
    fn apply(&mut self, entity: Entity) -> Option<Entity> {
        let previous = self.records.insert(entity.id.clone(), entity.clone());
        if let Some(old) = &previous {
            self.index.remove(&old.id, old.x, old.y);
        }
        self.index.insert(&entity.id, entity.x, entity.y);
        previous
    }
}

struct StoreInner {
    backend: Arc<dyn StorageBackend>,
    state: RwLock<StoreState>,
    changes: broadcast::Sender<StoreChange>,
}

/// Keyed and coordinate-indexed local entity cache.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Clone)]
pub struct EntityStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("backend", &self.inner.backend.name())
            .field("len", &self.len())
            .finish()
    }
}

impl EntityStore {
    /// Open a store over `backend`, rebuilding the index from persisted records.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StorageError> {
        let persisted = backend.load_all().await?;

        let mut state = StoreState::default();
        for entity in persisted {
            state.apply(entity);
        }

        info!(
            backend = backend.name(),
            entities = state.records.len(),
            "Entity store opened"
        );

        let (changes, _) = broadcast::channel(DEFAULT_CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(StoreInner {
                backend,
                state: RwLock::new(state),
                changes,
            }),
        })
    }

    /// Open an empty, volatile store.
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                backend: Arc::new(MemoryBackend::new()),
                state: RwLock::new(StoreState::default()),
                changes,
            }),
        }
    }

    /// Insert or update entities.
    ///
    /// Entities identical to the stored record are skipped without touching
    /// the backend or notifying subscribers, so applying the same batch twice
    /// leaves the store as after the first application. Entities that could
    /// not be indexed or persisted faithfully (empty id, NaN or infinite
    /// coordinate) are skipped with a warning and counted as rejected.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure. Entities before the failing one
    /// remain applied.
    pub async fn upsert_many<I>(&self, entities: I) -> Result<UpsertSummary, StorageError>
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut summary = UpsertSummary::default();

        for entity in entities {
            if let Err(e) = entity.validate_display() {
                warn!(error = %e, "Rejecting entity");
                summary.rejected += 1;
                continue;
            }

            let existing = self.inner.state.read().records.get(&entity.id).cloned();
            if existing.as_ref() == Some(&entity) {
                summary.unchanged += 1;
                continue;
            }

            self.inner.backend.put(&entity).await?;

            let previous = self.inner.state.write().apply(entity.clone());
            let change = if previous.is_some() {
                summary.updated += 1;
                StoreChange::Updated(entity)
            } else {
                summary.added += 1;
                StoreChange::Added(entity)
            };

            // No receivers is fine
            let _ = self.inner.changes.send(change);
        }

        debug!(
            added = summary.added,
            updated = summary.updated,
            unchanged = summary.unchanged,
            rejected = summary.rejected,
            "Upsert applied"
        );
        Ok(summary)
    }

    /// Local-only lookup by identifier.
    pub fn get_by_id(&self, id: &str) -> Option<Entity> {
        self.inner.state.read().records.get(id).cloned()
    }

    /// Whether an identifier is cached.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.state.read().records.contains_key(id)
    }

    /// All entities with `x ∈ [min_x, max_x)` and `y ∈ [min_y, max_y)`,
    /// ordered by `(x, y, id)`.
    pub fn query_range(&self, rect: &Rect) -> Vec<Entity> {
        let state = self.inner.state.read();
        state
            .index
            .range(rect)
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    /// Subscribe to live add/update notifications.
    ///
    /// Only changes applied after this call are delivered.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.inner.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entity from the backend and memory.
    ///
    /// Returns the number of persisted records removed.
    pub async fn clear(&self) -> Result<usize, StorageError> {
        let removed = self.inner.backend.clear().await?;
        let mut state = self.inner.state.write();
        state.records.clear();
        state.index.clear();
        info!(removed, "Entity store cleared");
        Ok(removed)
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that fails every write after a configurable number succeed.
    pub(crate) struct FlakyBackend {
        inner: MemoryBackend,
        failures_remaining: AtomicUsize,
        pub puts: AtomicUsize,
    }

    impl FlakyBackend {
        pub(crate) fn failing(times: usize) -> Self {
            Self {
                inner: MemoryBackend::new(),
                failures_remaining: AtomicUsize::new(times),
                puts: AtomicUsize::new(0),
            }
        }
    }

    impl StorageBackend for FlakyBackend {
        fn put<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, Result<(), StorageError>> {
            Box::pin(async move {
                self.puts.fetch_add(1, Ordering::SeqCst);
                let remaining = self.failures_remaining.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                    return Err(StorageError::Io(std::io::Error::other("disk full")));
                }
                self.inner.put(entity).await
            })
        }

        fn load_all(&self) -> BoxFuture<'_, Result<Vec<Entity>, StorageError>> {
            self.inner.load_all()
        }

        fn clear(&self) -> BoxFuture<'_, Result<usize, StorageError>> {
            self.inner.clear()
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn star(id: &str, x: f64, y: f64) -> Entity {
        Entity::new(id, x, y, EntityKind::YoungStar)
    }

    #[tokio::test]
    async fn test_empty_store_query_returns_empty() {
        let store = EntityStore::in_memory();
        assert!(store.query_range(&Rect::everything()).is_empty());
        assert!(store.get_by_id("missing").is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = EntityStore::in_memory();
        let batch = vec![star("A", 0.0, 0.0), star("B", 100.0, 100.0)];

        let first = store.upsert_many(batch.clone()).await.unwrap();
        let snapshot = store.query_range(&Rect::everything());
        let second = store.upsert_many(batch).await.unwrap();

        assert_eq!(first.added, 2);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.changed(), 0);
        assert_eq!(store.query_range(&Rect::everything()), snapshot);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_moves_index_entry() {
        let store = EntityStore::in_memory();
        store.upsert_many(vec![star("A", 1.0, 1.0)]).await.unwrap();
        let summary = store.upsert_many(vec![star("A", 50.0, 50.0)]).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert!(store.query_range(&Rect::new(0.0, 0.0, 10.0, 10.0)).is_empty());
        assert_eq!(
            store.query_range(&Rect::new(40.0, 40.0, 60.0, 60.0)),
            vec![star("A", 50.0, 50.0)]
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_query_range_boundaries() {
        let store = EntityStore::in_memory();
        store
            .upsert_many(vec![
                star("A", 0.0, 0.0),
                star("B", 10.0, 0.0),
                star("C", 0.0, 10.0),
                star("D", 5.0, 5.0),
            ])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .query_range(&Rect::new(0.0, 0.0, 10.0, 10.0))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["A", "D"]);
    }

    #[tokio::test]
    async fn test_subscribe_changes_is_live_feed() {
        let store = EntityStore::in_memory();
        store.upsert_many(vec![star("OLD", 0.0, 0.0)]).await.unwrap();

        let mut rx = store.subscribe_changes();
        store
            .upsert_many(vec![star("NEW", 1.0, 1.0), star("OLD", 2.0, 2.0)])
            .await
            .unwrap();
        // Identical re-apply produces no notification
        store.upsert_many(vec![star("NEW", 1.0, 1.0)]).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), StoreChange::Added(star("NEW", 1.0, 1.0)));
        assert_eq!(rx.recv().await.unwrap(), StoreChange::Updated(star("OLD", 2.0, 2.0)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_storage_error_propagates_and_leaves_record_unapplied() {
        let backend = Arc::new(FlakyBackend::failing(1));
        let store = EntityStore::open(backend).await.unwrap();

        let err = store.upsert_many(vec![star("A", 0.0, 0.0)]).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(store.get_by_id("A").is_none());
        assert!(store.query_range(&Rect::everything()).is_empty());

        store.upsert_many(vec![star("A", 0.0, 0.0)]).await.unwrap();
        assert!(store.get_by_id("A").is_some());
    }

    #[tokio::test]
    async fn test_upsert_rejects_non_finite_and_empty_ids() {
        let backend = Arc::new(FlakyBackend::failing(0));
        let store = EntityStore::open(backend.clone()).await.unwrap();

        let summary = store
            .upsert_many(vec![
                star("NAN", f64::NAN, 0.0),
                star("INF", 0.0, f64::INFINITY),
                star("", 1.0, 1.0),
                star("A", 1.0, 1.0),
            ])
            .await
            .unwrap();

        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.added, 1);
        assert_eq!(backend.puts.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.contains("NAN"));

        // Re-applying the same batch is still a no-op for valid entries
        let again = store
            .upsert_many(vec![star("NAN", f64::NAN, 0.0), star("A", 1.0, 1.0)])
            .await
            .unwrap();
        assert_eq!(again.changed(), 0);
        assert_eq!(again.unchanged, 1);
        assert_eq!(backend.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_rebuilds_index_from_backend() {
        let backend = Arc::new(MemoryBackend::with_records(vec![
            star("A", 1.0, 1.0),
            star("B", 20.0, 20.0),
        ]));
        let store = EntityStore::open(backend).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.query_range(&Rect::new(0.0, 0.0, 5.0, 5.0)),
            vec![star("A", 1.0, 1.0)]
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let store = EntityStore::in_memory();
        store.upsert_many(vec![star("A", 1.0, 1.0)]).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.is_empty());
        assert!(store.query_range(&Rect::everything()).is_empty());
    }

    #[tokio::test]
    async fn test_disk_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = Arc::new(DiskBackend::open(dir.path()).await.unwrap());
            let store = EntityStore::open(backend).await.unwrap();
            store
                .upsert_many(vec![star("A", 1.0, 1.0), star("B", 3.0, 3.0)])
                .await
                .unwrap();
        }

        let backend = Arc::new(DiskBackend::open(dir.path()).await.unwrap());
        let store = EntityStore::open(backend).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_by_id("B"), Some(star("B", 3.0, 3.0)));
    }
}
