//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use roster_core::fetch::{self, FetchError, Fetcher};
use std::time::Duration;
use tracing::debug;

/// User agent sent with every whitelist request.
pub const USER_AGENT: &str = concat!("roster-daemon/", env!("CARGO_PKG_VERSION"));

/// Fetches whitelist documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> fetch::Result<Self> {
        let client = Self::client_builder(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Client settings used by [`HttpFetcher::new`], for callers that need
    /// to adjust them (proxies, TLS roots).
    pub fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> fetch::Result<String> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unexpected status")
                    .to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!("Fetched {} bytes from {}", body.len(), url);

        String::from_utf8(body.to_vec()).map_err(|_| FetchError::InvalidUtf8)
    }
}
