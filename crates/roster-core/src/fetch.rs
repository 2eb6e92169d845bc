//! Fetcher trait for retrieving the remote whitelist document.
//!
//! Implementations:
//! - `InMemoryFetcher` - For testing
//! - `HttpFetcher` (in roster-daemon) - Uses reqwest
//!
//! A fetch is the only operation in the protocol that suspends. The
//! participant hands out a [`FetchRequest`], the host awaits it and feeds
//! the resulting [`FetchCompletion`] back. Completions echo the URL they were
//! issued for so a superseded request can be recognised and dropped.

use crate::protocol::MAX_VALUE_SIZE;
use crate::scheduler::CycleId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("No source URL configured")]
    EmptyUrl,

    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Response body too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

impl FetchError {
    /// Status code, when the failure came from the remote host.
    pub fn code(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Single outbound request for a text resource.
///
/// Implementations perform the network call only; they never touch shared
/// session state.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the body at `url` as UTF-8 text.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetch `url`, rejecting an empty URL without making a request.
///
/// Bodies too large to replicate are rejected here, before they can reach
/// the replicated store.
pub async fn fetch<F: Fetcher + ?Sized>(fetcher: &F, url: &str) -> Result<String> {
    if url.trim().is_empty() {
        return Err(FetchError::EmptyUrl);
    }
    let body = fetcher.fetch_text(url).await?;
    if body.len() > MAX_VALUE_SIZE {
        return Err(FetchError::TooLarge {
            size: body.len(),
            limit: MAX_VALUE_SIZE,
        });
    }
    Ok(body)
}

/// A fetch the host must run on behalf of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Refresh cycle that issued this request
    pub cycle: CycleId,
    /// URL configured when the cycle started
    pub url: String,
}

impl FetchRequest {
    /// Run the request and produce its completion.
    pub async fn run<F: Fetcher + ?Sized>(self, fetcher: &F) -> FetchCompletion {
        let result = fetch(fetcher, &self.url).await;
        FetchCompletion {
            cycle: self.cycle,
            url: self.url,
            result,
        }
    }
}

/// Outcome of a [`FetchRequest`], echoing the originating cycle and URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCompletion {
    pub cycle: CycleId,
    pub url: String,
    pub result: Result<String>,
}

/// In-memory fetcher for testing
#[derive(Default)]
pub struct InMemoryFetcher {
    responses: RwLock<HashMap<String, Result<String>>>,
    calls: AtomicUsize,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn set_body(&self, url: &str, body: &str) {
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Ok(body.to_string()));
    }

    /// Fail every request for `url` with `error`.
    pub fn set_error(&self, url: &str, error: FetchError) {
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Err(error));
    }

    /// Number of requests that reached this fetcher.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for InMemoryFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    code: 404,
                    message: format!("Not found: {}", url),
                })
            })
    }
}
