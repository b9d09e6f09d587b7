//! Remote entity source abstraction.
//!
//! The core never talks to the network directly; it goes through the
//! [`RemoteSource`] trait, which offers paginated listing and single-item
//! lookup. [`HttpRemoteSource`] implements it against the catalogue's REST
//! API; tests substitute scripted sources.
//!
//! # Error Kinds
//!
//! Every failure carries a structured [`RemoteError`] so callers can decide
//! how to react without parsing messages:
//!
//! | Kind          | Background sync           | On-demand lookup          |
//! |---------------|---------------------------|---------------------------|
//! | `RateLimited` | sleep exact delay, retry  | sleep exact delay, retry  |
//! | `Transient`   | fixed backoff, retry      | bounded retries, surface  |
//! | `Unauthorized`| abort, surface            | surface                   |
//! | `NotFound`    | n/a                       | surface                   |

mod http;

pub use http::{HttpRemoteConfig, HttpRemoteSource, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::entity::Entity;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Entities on this page.
    pub items: Vec<Entity>,
    /// Total number of entities across all pages, as reported by the remote.
    pub total_count: u64,
}

impl Page {
    pub fn new(items: Vec<Entity>, total_count: u64) -> Self {
        Self { items, total_count }
    }
}

/// Structured failure from a remote source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote asked us to slow down.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Credentials are missing or rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// The requested entity does not exist.
    #[error("Not found")]
    NotFound,

    /// Unstructured failure (connection reset, 5xx, undecodable body, ...).
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl RemoteError {
    /// Rate-limit error with a delay in whole seconds.
    pub fn rate_limited_secs(secs: u64) -> Self {
        RemoteError::RateLimited {
            retry_after: Duration::from_secs(secs),
        }
    }
}

/// Paginated and single-item access to the remote entity collection.
///
/// Returned futures are `Send` so sync loops can run on spawned tasks.
pub trait RemoteSource: Send + Sync + 'static {
    /// Fetch page `page_index` (0-based) holding up to `page_size` entities.
    fn fetch_page(
        &self,
        page_index: u64,
        page_size: u32,
    ) -> impl Future<Output = Result<Page, RemoteError>> + Send;

    /// Fetch one entity by identifier.
    fn fetch_by_id(&self, id: &str) -> impl Future<Output = Result<Entity, RemoteError>> + Send;

    /// Human-readable source name for logs.
    fn name(&self) -> &str;
}
