//! Application bootstrap and lifecycle management.
//!
//! [`StarchartApp`] constructs every component exactly once, in dependency
//! order, and hands out shared handles. Nothing is global; two apps in one
//! process are fully independent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        StarchartApp                           │
//! │                                                               │
//! │  1. StorageBackend (disk | memory) ──► EntityStore            │
//! │  2. RemoteSource (HTTP) ─────────────┐                        │
//! │  3. SyncController(remote, store) ◄──┘ ── background task     │
//! │  4. EventBus                                                  │
//! │  5. MapSession(store, bus, renderer)   on demand              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use starchart::app::{AppConfig, StarchartApp};
//!
//! let app = StarchartApp::start(config).await?;
//! app.spawn_sync()?;
//! let system = app.sync().get_or_fetch("X1-DF55").await?;
//! app.shutdown().await;
//! ```

mod config;
mod error;

pub use config::{AppConfig, StoreLocation};
pub use error::AppError;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::geometry::Size;
use crate::remote::{HttpRemoteSource, RemoteSource};
use crate::render::Renderer;
use crate::session::MapSession;
use crate::store::{DiskBackend, EntityStore, MemoryBackend, StorageBackend};
use crate::sync::{SyncController, SyncError, SyncReport};

type SyncTask = JoinHandle<Result<SyncReport, SyncError>>;

/// Starchart application with explicit component lifecycle.
pub struct StarchartApp<R: RemoteSource = HttpRemoteSource> {
    config: AppConfig,
    store: EntityStore,
    sync: Arc<SyncController<R>>,
    bus: Arc<EventBus>,
    sync_task: Mutex<Option<SyncTask>>,
}

impl StarchartApp<HttpRemoteSource> {
    /// Start the application against the HTTP remote.
    pub async fn start(config: AppConfig) -> Result<Self, AppError> {
        let remote = Arc::new(HttpRemoteSource::new(config.remote.clone())?);
        Self::start_with_remote(config, remote).await
    }
}

impl<R: RemoteSource> StarchartApp<R> {
    /// Start the application with a caller-supplied remote source.
    pub async fn start_with_remote(config: AppConfig, remote: Arc<R>) -> Result<Self, AppError> {
        let backend: Arc<dyn StorageBackend> = match &config.store {
            StoreLocation::Memory => Arc::new(MemoryBackend::new()),
            StoreLocation::Disk(directory) => Arc::new(DiskBackend::open(directory.clone()).await?),
        };
        let store = EntityStore::open(backend).await?;

        let sync = Arc::new(SyncController::new(remote, store.clone(), config.sync.clone()));
        let bus = Arc::new(EventBus::new());

        info!(
            store = store.backend_name(),
            entities = store.len(),
            "Starchart started"
        );

        Ok(Self {
            config,
            store,
            sync,
            bus,
            sync_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn sync(&self) -> &Arc<SyncController<R>> {
        &self.sync
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start background sync on the runtime.
    ///
    /// # Errors
    ///
    /// [`SyncError::AlreadyRunning`] when a sync task is still active.
    pub fn spawn_sync(&self) -> Result<(), AppError> {
        let mut slot = self.sync_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(SyncError::AlreadyRunning.into());
        }
        *slot = Some(self.sync.start()?);
        Ok(())
    }

    /// Stop background sync and wait for it to wind down.
    ///
    /// Returns the final report, or `None` when no sync was spawned.
    pub async fn stop_sync(&self) -> Result<Option<SyncReport>, AppError> {
        self.sync.stop();
        let task = self.sync_task.lock().take();
        let Some(task) = task else {
            return Ok(None);
        };
        let report = task.await.map_err(|e| AppError::Task(e.to_string()))??;
        Ok(Some(report))
    }

    /// Create a map session over this app's store and bus.
    pub fn session<H: Renderer + 'static>(&self, renderer: H, screen: Size) -> MapSession<H> {
        MapSession::new(
            self.store.clone(),
            Arc::clone(&self.bus),
            self.config.viewport.clone(),
            screen,
            renderer,
        )
    }

    /// Graceful shutdown: stop sync and wait for it.
    pub async fn shutdown(self) {
        match self.stop_sync().await {
            Ok(Some(report)) => info!(next_page = report.next_page, "Sync stopped at shutdown"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Sync ended with error at shutdown"),
        }
        info!("Starchart shut down");
    }
}
