//! Fetching release artifacts over HTTPS.
//!
//! The staging pipeline fetches two kinds of content: checksum manifests
//! (small text files) and binary archives. Both go through [`Fetcher`],
//! so tests can substitute canned bytes without any network.

use crate::constants::default_fetch_timeout;
use crate::core::OkctlError;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;

/// Fetches the raw bytes behind a URL.
pub trait Fetcher {
    /// Download `url` and return the response body.
    fn fetch(&self, url: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

/// Production [`Fetcher`] backed by reqwest.
///
/// Only `https` URLs are accepted; the scheme is checked before any
/// network call. Requests carry a timeout so a hung download fails the
/// run instead of stalling it forever.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(default_fetch_timeout())
    }

    /// Create a fetcher with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
        if parsed.scheme() != "https" {
            return Err(OkctlError::UnsupportedUrlScheme { url: url.to_string() }.into());
        }

        debug!("Fetching {}", url);
        let response = self
            .client
            .get(parsed)
            .header("User-Agent", concat!("okctl/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OkctlError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let bytes =
            response.bytes().await.with_context(|| format!("Failed to read body of {url}"))?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
