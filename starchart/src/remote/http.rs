//! HTTP implementation of [`RemoteSource`].
//!
//! Endpoints:
//!
//! ```text
//! GET {base}/systems?page={page_index + 1}&limit={page_size}
//!     -> { "data": [ {...}, ... ], "meta": { "total": N, "page": P, "limit": L } }
//! GET {base}/systems/{id}
//!     -> { "data": {...} }
//! ```
//!
//! The remote numbers pages from 1; [`RemoteSource`] numbers them from 0.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Page, RemoteError, RemoteSource};
use crate::entity::Entity;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.spacetraders.io/v2";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Delay used when a 429 response carries no usable hint.
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Connection settings for [`HttpRemoteSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRemoteConfig {
    /// API root without trailing slash.
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl HttpRemoteConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Remote source backed by the catalogue's REST API.
pub struct HttpRemoteSource {
    client: reqwest::Client,
    base_url: String,
    base: Url,
    token: Option<String>,
}

impl HttpRemoteSource {
    /// Build a source with its own connection pool.
    pub fn new(config: HttpRemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Transient(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| RemoteError::Transient(format!("Invalid base URL: {}", base_url)))?;

        Ok(Self {
            client,
            base_url,
            base,
            token: config.token,
        })
    }

    /// API root in use.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Append path segments to the API root. Each segment is percent-encoded,
    /// so identifiers cannot alter the path or add a query.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send a request and return the decoded JSON body of a 2xx response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transient(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &headers, &body));
        }

        serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Transient(format!("Invalid response body: {}", e)))
    }
}

impl RemoteSource for HttpRemoteSource {
    async fn fetch_page(&self, page_index: u64, page_size: u32) -> Result<Page, RemoteError> {
        let request = self
            .get(self.endpoint(&["systems"]))
            .query(&[("page", page_index + 1), ("limit", u64::from(page_size))]);

        debug!(page_index, page_size, "Fetching page");
        let body = self.send(request).await?;
        decode_page(body)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Entity, RemoteError> {
        debug!(id, "Fetching entity");
        let body = self.send(self.get(self.endpoint(&["systems", id]))).await?;
        decode_item(body)
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

/// Map a non-success response to a structured error.
pub(crate) fn classify_status(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> RemoteError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited {
            retry_after: retry_after_header(headers)
                .or_else(|| retry_after_body(body))
                .unwrap_or(FALLBACK_RETRY_AFTER),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        other => RemoteError::Transient(format!("HTTP {}", other)),
    }
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    seconds(raw.trim().parse().ok()?)
}

fn retry_after_body(body: &[u8]) -> Option<Duration> {
    let value: Value = serde_json::from_slice(body).ok()?;
    seconds(value.pointer("/error/data/retryAfter")?.as_f64()?)
}

/// Decode a listing body, skipping malformed items.
pub(crate) fn decode_page(body: Value) -> Result<Page, RemoteError> {
    let total_count = body
        .pointer("/meta/total")
        .and_then(Value::as_u64)
        .ok_or_else(|| RemoteError::Transient("Listing response lacks meta.total".to_string()))?;

    let Some(Value::Array(raw_items)) = body.get("data").cloned() else {
        return Err(RemoteError::Transient(
            "Listing response lacks a data array".to_string(),
        ));
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        match Entity::from_wire(raw) {
            Ok(entity) => items.push(entity),
            Err(e) => warn!(error = %e, "Skipping malformed entity in page"),
        }
    }

    Ok(Page { items, total_count })
}

/// Decode a single-item body.
pub(crate) fn decode_item(mut body: Value) -> Result<Entity, RemoteError> {
    let data = body
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| RemoteError::Transient("Item response lacks data".to_string()))?;

    Entity::from_wire(data).map_err(|e| RemoteError::Transient(format!("Malformed entity: {}", e)))
}
