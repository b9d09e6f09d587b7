//! Background synchronization and cache-first lookups.
//!
//! The [`SyncController`] moves entities from a [`RemoteSource`] into the
//! [`EntityStore`]. Two paths exist:
//!
//! - **Background sync** walks the paginated listing from the cursor's page
//!   index, upserting each page before requesting the next, so progress is
//!   visible to queries page by page. Failures are absorbed (rate limits,
//!   transient errors, storage errors) except `Unauthorized`, which ends the
//!   loop.
//! - **On-demand lookup** ([`SyncController::get_or_fetch`]) serves from the
//!   store when possible and otherwise fetches one entity, retrying within
//!   bounds and surfacing failures to the caller.
//!
//! # Cursor
//!
//! ```text
//!            start()                        stop() / end / Unauthorized
//!   idle ───────────────► running ─────────────────────────────────────► idle
//!   page_index = k         fetch k, upsert k, k += 1, ...                page_index = next unfetched
//! ```
//!
//! `stop()` is cooperative: it is observed between pages and after retry
//! sleeps, never in the middle of an upsert. A stop request belongs to the
//! run that is active when it is made; it is cleared when the next run is
//! claimed, and a new run cannot be claimed until the previous one exits.

mod policy;

pub use policy::{
    RetryPolicy, DEFAULT_ON_DEMAND_ATTEMPTS, DEFAULT_TRANSIENT_BACKOFF_MS,
};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::remote::{Page, RemoteError, RemoteSource};
use crate::store::{EntityStore, StorageError};

/// Default number of entities requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Errors surfaced by the sync controller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Writing to the store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transient failures persisted past the retry limit.
    #[error("Network failure: {0}")]
    NetworkTransient(String),

    /// Credentials are missing or rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// The requested entity does not exist remotely.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A background sync is already in progress.
    #[error("Sync already running")]
    AlreadyRunning,
}

/// Sync controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Entities requested per page.
    pub page_size: u32,
    /// Delay after a transient or storage failure.
    pub transient_backoff: Duration,
    /// Attempts for an on-demand lookup, including the first.
    pub on_demand_attempts: u32,
    /// Share one fetch between concurrent lookups of the same id.
    pub coalesce_lookups: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            transient_backoff: Duration::from_millis(DEFAULT_TRANSIENT_BACKOFF_MS),
            on_demand_attempts: DEFAULT_ON_DEMAND_ATTEMPTS,
            coalesce_lookups: false,
        }
    }
}

impl SyncConfig {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_transient_backoff(mut self, backoff: Duration) -> Self {
        self.transient_backoff = backoff;
        self
    }

    pub fn with_on_demand_attempts(mut self, attempts: u32) -> Self {
        self.on_demand_attempts = attempts.max(1);
        self
    }

    pub fn with_coalesce_lookups(mut self, coalesce: bool) -> Self {
        self.coalesce_lookups = coalesce;
        self
    }

    /// Policy for lookups a caller waits on.
    pub fn on_demand_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.on_demand_attempts, self.transient_backoff)
    }

    /// Policy for the unattended background loop.
    pub fn background_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(self.transient_backoff)
    }
}

/// Snapshot of background sync progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
    /// Next page to fetch.
    pub page_index: u64,
    /// Remote total, once a page has reported it.
    pub total_count: Option<u64>,
    /// Whether the loop is running.
    pub running: bool,
}

/// Why a background sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// An empty page was returned or the remote total was covered.
    Completed,
    /// `stop()` was observed.
    Stopped,
    /// The requested page budget was used up.
    PageLimit,
}

/// Result of a background sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Pages fetched and upserted by this run.
    pub pages_fetched: u64,
    /// Entities added to the store.
    pub added: usize,
    /// Entities whose stored content changed.
    pub updated: usize,
    /// Next unfetched page; a later run resumes here.
    pub next_page: u64,
    /// Remote total as last reported.
    pub total_count: Option<u64>,
    pub outcome: SyncOutcome,
}

/// Shared cursor state.
#[derive(Debug, Default)]
struct Cursor {
    page_index: AtomicU64,
    /// A run owns the loop until it exits.
    active: AtomicBool,
    /// Set by `stop()`; only ever cleared when a new run is claimed.
    stop_requested: AtomicBool,
}

impl Cursor {
    /// Claim the loop for a new run.
    fn claim(&self) -> Result<(), SyncError> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.stop_requested.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Cloneable handle to stop and observe a sync controller.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    cursor: Arc<Cursor>,
}

impl SyncHandle {
    /// Request a cooperative stop. Takes effect between pages.
    pub fn stop(&self) {
        if self.cursor.active.load(Ordering::SeqCst)
            && !self.cursor.stop_requested.swap(true, Ordering::SeqCst)
        {
            info!("Sync stop requested");
        }
    }

    /// Whether a run is active, including one winding down after a stop.
    pub fn is_running(&self) -> bool {
        self.cursor.active.load(Ordering::SeqCst)
    }

    /// Next page the loop will fetch.
    pub fn page_index(&self) -> u64 {
        self.cursor.page_index.load(Ordering::SeqCst)
    }
}

/// Result of one retried step inside the background loop.
enum Step<T> {
    Done(T),
    Stopped,
}

/// Synchronizes a [`RemoteSource`] into an [`EntityStore`].
pub struct SyncController<R> {
    remote: Arc<R>,
    store: EntityStore,
    config: SyncConfig,
    cursor: Arc<Cursor>,
    progress: watch::Sender<SyncProgress>,
    gates: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<R: RemoteSource> SyncController<R> {
    /// Create a controller with the cursor at page 0.
    pub fn new(remote: Arc<R>, store: EntityStore, config: SyncConfig) -> Self {
        let (progress, _) = watch::channel(SyncProgress::default());
        Self {
            remote,
            store,
            config,
            cursor: Arc::new(Cursor::default()),
            progress,
            gates: DashMap::new(),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Handle for stopping and observing the loop from elsewhere.
    pub fn stop_handle(&self) -> SyncHandle {
        SyncHandle {
            cursor: Arc::clone(&self.cursor),
        }
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Whether a run is active, including one winding down after a stop.
    pub fn is_running(&self) -> bool {
        self.cursor.active.load(Ordering::SeqCst)
    }

    pub fn page_index(&self) -> u64 {
        self.cursor.page_index.load(Ordering::SeqCst)
    }

    /// Watch background progress.
    pub fn subscribe_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Rewind the cursor to page 0.
    pub fn reset(&self) -> Result<(), SyncError> {
        if self.is_running() {
            return Err(SyncError::AlreadyRunning);
        }
        self.cursor.page_index.store(0, Ordering::SeqCst);
        self.progress.send_modify(|p| {
            p.page_index = 0;
            p.total_count = None;
        });
        debug!("Sync cursor reset");
        Ok(())
    }

    /// Spawn [`background_sync`](Self::background_sync) on the runtime.
    ///
    /// The run is claimed before the task is spawned, so a `stop()` issued
    /// right after this returns is observed by the spawned loop.
    ///
    /// # Errors
    ///
    /// [`SyncError::AlreadyRunning`] while a previous run has not exited.
    pub fn start(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<SyncReport, SyncError>>, SyncError> {
        self.cursor.claim()?;
        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move { controller.run_claimed(None).await }))
    }

    /// Sync pages from the cursor until the collection is covered or
    /// [`stop`](Self::stop) is observed.
    pub async fn background_sync(&self) -> Result<SyncReport, SyncError> {
        self.cursor.claim()?;
        self.run_claimed(None).await
    }

    /// Like [`background_sync`](Self::background_sync) but fetches at most
    /// `max_pages` pages.
    pub async fn sync_pages(&self, max_pages: u64) -> Result<SyncReport, SyncError> {
        self.cursor.claim()?;
        self.run_claimed(Some(max_pages)).await
    }

    async fn run_claimed(&self, max_pages: Option<u64>) -> Result<SyncReport, SyncError> {
        let start_page = self.page_index();
        info!(
            remote = self.remote.name(),
            start_page,
            page_size = self.config.page_size,
            "Background sync started"
        );
        self.publish_progress(None);

        let result = self.run_pages(max_pages).await;

        self.cursor.release();
        self.progress.send_modify(|p| p.running = false);

        match &result {
            Ok(report) => info!(
                pages = report.pages_fetched,
                added = report.added,
                updated = report.updated,
                next_page = report.next_page,
                outcome = ?report.outcome,
                "Background sync finished"
            ),
            Err(e) => warn!(error = %e, next_page = self.page_index(), "Background sync aborted"),
        }
        result
    }

    async fn run_pages(&self, max_pages: Option<u64>) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport {
            pages_fetched: 0,
            added: 0,
            updated: 0,
            next_page: self.page_index(),
            total_count: None,
            outcome: SyncOutcome::Stopped,
        };

        loop {
            if self.cursor.should_stop() {
                report.outcome = SyncOutcome::Stopped;
                break;
            }
            if max_pages.is_some_and(|limit| report.pages_fetched >= limit) {
                report.outcome = SyncOutcome::PageLimit;
                break;
            }

            let page_index = self.page_index();
            let page = match self.fetch_page_with_retry(page_index).await? {
                Step::Done(Some(page)) => page,
                Step::Done(None) => {
                    report.outcome = SyncOutcome::Completed;
                    break;
                }
                Step::Stopped => {
                    report.outcome = SyncOutcome::Stopped;
                    break;
                }
            };

            report.total_count = Some(page.total_count);
            if page.items.is_empty() {
                debug!(page_index, "Empty page, sync complete");
                report.outcome = SyncOutcome::Completed;
                break;
            }

            let count = page.items.len();
            let summary = match self.upsert_with_retry(page.items).await {
                Step::Done(summary) => summary,
                Step::Stopped => {
                    report.outcome = SyncOutcome::Stopped;
                    break;
                }
            };

            report.pages_fetched += 1;
            report.added += summary.added;
            report.updated += summary.updated;
            self.cursor.page_index.store(page_index + 1, Ordering::SeqCst);
            report.next_page = page_index + 1;
            self.publish_progress(Some(page.total_count));

            debug!(
                page_index,
                items = count,
                added = summary.added,
                updated = summary.updated,
                total = page.total_count,
                "Page synced"
            );

            let covered = (page_index + 1).saturating_mul(u64::from(self.config.page_size));
            if covered >= page.total_count {
                report.outcome = SyncOutcome::Completed;
                break;
            }
        }

        report.next_page = self.page_index();
        Ok(report)
    }

    /// Fetch one page, absorbing everything but `Unauthorized`.
    ///
    /// `Done(None)` means the remote reported the page does not exist.
    async fn fetch_page_with_retry(&self, page_index: u64) -> Result<Step<Option<Page>>, SyncError> {
        let policy = self.config.background_policy();
        let mut attempt = 0;

        loop {
            let delay = match self
                .remote
                .fetch_page(page_index, self.config.page_size)
                .await
            {
                Ok(page) => return Ok(Step::Done(Some(page))),
                Err(RemoteError::RateLimited { retry_after }) => {
                    warn!(page_index, retry_after_ms = retry_after.as_millis() as u64, "Rate limited, waiting");
                    retry_after
                }
                Err(RemoteError::Transient(reason)) => {
                    attempt += 1;
                    let Some(delay) = policy.delay_for_attempt(attempt) else {
                        return Err(SyncError::NetworkTransient(reason));
                    };
                    warn!(page_index, attempt, error = %reason, "Transient failure, backing off");
                    delay
                }
                Err(RemoteError::NotFound) => {
                    debug!(page_index, "Page not found, treating as end of collection");
                    return Ok(Step::Done(None));
                }
                Err(RemoteError::Unauthorized) => return Err(SyncError::Unauthorized),
            };

            tokio::time::sleep(delay).await;
            if self.cursor.should_stop() {
                return Ok(Step::Stopped);
            }
        }
    }

    /// Upsert a page, retrying storage failures after the fixed backoff.
    async fn upsert_with_retry(&self, items: Vec<Entity>) -> Step<crate::store::UpsertSummary> {
        let mut attempt = 0u32;
        loop {
            match self.store.upsert_many(items.iter().cloned()).await {
                Ok(summary) => return Step::Done(summary),
                Err(e) => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Storage failure during page upsert, retrying");
                }
            }

            tokio::time::sleep(self.config.transient_backoff).await;
            if self.cursor.should_stop() {
                return Step::Stopped;
            }
        }
    }

    fn publish_progress(&self, total_count: Option<u64>) {
        let page_index = self.page_index();
        let running = self.is_running();
        self.progress.send_modify(|p| {
            p.page_index = page_index;
            p.running = running;
            if total_count.is_some() {
                p.total_count = total_count;
            }
        });
    }

    /// Return the entity from the store, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] when the remote has no such entity (nothing
    ///   is cached for it)
    /// - [`SyncError::NetworkTransient`] after the on-demand attempts are used
    /// - [`SyncError::Unauthorized`] immediately
    /// - [`SyncError::Storage`] when caching the fetched entity fails
    pub async fn get_or_fetch(&self, id: &str) -> Result<Entity, SyncError> {
        if let Some(entity) = self.store.get_by_id(id) {
            debug!(id, "Lookup served from store");
            return Ok(entity);
        }

        if !self.config.coalesce_lookups {
            return self.fetch_and_store(id).await;
        }

        let gate = Arc::clone(self.gates.entry(id.to_string()).or_default().value());
        let result = {
            let _guard = gate.lock().await;
            // A concurrent lookup may have filled the store while we waited
            match self.store.get_by_id(id) {
                Some(entity) => Ok(entity),
                None => self.fetch_and_store(id).await,
            }
        };
        drop(gate);
        self.gates
            .remove_if(id, |_, gate| Arc::strong_count(gate) == 1);
        result
    }

    async fn fetch_and_store(&self, id: &str) -> Result<Entity, SyncError> {
        let entity = self.fetch_by_id_with_retry(id).await?;
        self.store.upsert_many([entity.clone()]).await?;
        debug!(id, "Lookup fetched and cached");
        Ok(entity)
    }

    async fn fetch_by_id_with_retry(&self, id: &str) -> Result<Entity, SyncError> {
        let policy = self.config.on_demand_policy();
        let mut attempt = 0;

        loop {
            let delay = match self.remote.fetch_by_id(id).await {
                Ok(entity) => return Ok(entity),
                Err(RemoteError::RateLimited { retry_after }) => {
                    warn!(id, retry_after_ms = retry_after.as_millis() as u64, "Rate limited, waiting");
                    retry_after
                }
                Err(RemoteError::Transient(reason)) => {
                    attempt += 1;
                    let Some(delay) = policy.delay_for_attempt(attempt) else {
                        return Err(SyncError::NetworkTransient(reason));
                    };
                    warn!(id, attempt, error = %reason, "Transient failure, retrying lookup");
                    delay
                }
                Err(RemoteError::NotFound) => return Err(SyncError::NotFound(id.to_string())),
                Err(RemoteError::Unauthorized) => return Err(SyncError::Unauthorized),
            };
            tokio::time::sleep(delay).await;
        }
    }
}
