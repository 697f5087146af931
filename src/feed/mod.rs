//! Resilient HTTP layer for the two remote feeds.
//!
//! Every request gets a cache-busting `_ts` query parameter and a no-cache
//! header, wall-clock latency is measured around the call, and the body is
//! parsed as JSON tolerantly: a 200 with a non-JSON body is a failure for
//! this contract (Apps Script error pages are HTML with status 200).
//! Transport-level rejections retry over a fixed backoff schedule; HTTP
//! errors do not.

pub mod rows;
pub mod stats;

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use url::Url;

/// Errors surfaced by the feed layer once a response (or the lack of one)
/// has been classified.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("transport failed after retries")]
    Transport,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("non-JSON body (HTTP {0})")]
    NonJson(u16),
    #[error("upstream rejected update: {0}")]
    Rejected(String),
    #[error("unrecognized payload shape")]
    Shape,
}

/// Transport retry schedule. Applies only to outright fetch rejections
/// (connect/timeout), never to HTTP-level errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            backoff_ms: vec![450, 1000, 2000],
        }
    }
}

/// The uniform fetch result: status + parsed body + latency, with `ok` true
/// only when the HTTP status succeeded *and* the body parsed as JSON.
#[derive(Debug, Clone, Default)]
pub struct FeedResponse {
    pub ok: bool,
    pub ms: u64,
    pub status: u16,
    pub json: Option<Value>,
    pub raw: String,
}

impl FeedResponse {
    /// Classify a failed response as a [`FeedError`].
    pub fn error(&self) -> FeedError {
        if self.status == 0 {
            FeedError::Transport
        } else if !(200..300).contains(&self.status) {
            FeedError::Status(self.status)
        } else {
            FeedError::NonJson(self.status)
        }
    }
}

/// Shared HTTP client for both feeds plus the audit sink.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Default for FeedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedClient {
    pub fn new() -> Self {
        FeedClient {
            http: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        FeedClient {
            http: reqwest::Client::new(),
            retry,
        }
    }

    /// GET with cache busting, latency measurement, tolerant JSON parsing,
    /// and transport-level retry. Never returns an error — the failure modes
    /// are encoded in the [`FeedResponse`].
    pub async fn get(&self, url: &Url) -> FeedResponse {
        let attempts = self.retry.backoff_ms.len() + 1;
        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = self
                .http
                .get(bust(url))
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await;

            match result {
                Ok(response) => return Self::read_body(response, started).await,
                Err(e) => {
                    if attempt < attempts {
                        let delay = self.retry.backoff_ms[attempt - 1];
                        log::warn!(
                            "Feed: GET {} attempt {}/{} failed ({}), retrying in {}ms",
                            url.path(),
                            attempt,
                            attempts,
                            e,
                            delay
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    } else {
                        log::error!("Feed: GET {} exhausted retries: {}", url.path(), e);
                    }
                }
            }
        }
        // Zeroed failure tuple per contract
        FeedResponse::default()
    }

    /// POST a JSON body. No retry — updates are not idempotent from the
    /// caller's perspective.
    pub async fn post_json(&self, url: &Url, body: &Value) -> FeedResponse {
        let started = Instant::now();
        match self
            .http
            .post(bust(url))
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .json(body)
            .send()
            .await
        {
            Ok(response) => Self::read_body(response, started).await,
            Err(e) => {
                log::warn!("Feed: POST {} failed: {}", url.path(), e);
                FeedResponse::default()
            }
        }
    }

    async fn read_body(response: reqwest::Response, started: Instant) -> FeedResponse {
        let status = response.status().as_u16();
        let raw = response.text().await.unwrap_or_default();
        let ms = started.elapsed().as_millis() as u64;
        let json: Option<Value> = serde_json::from_str(&raw).ok();
        let ok = (200..300).contains(&status) && json.is_some();
        log::debug!("Feed: HTTP {} in {}ms (json: {})", status, ms, json.is_some());
        FeedResponse {
            ok,
            ms,
            status,
            json,
            raw,
        }
    }
}

/// Clone the URL with a cache-busting timestamp parameter appended.
fn bust(url: &Url) -> Url {
    let mut busted = url.clone();
    busted
        .query_pairs_mut()
        .append_pair("_ts", &Utc::now().timestamp_millis().to_string());
    busted
}
