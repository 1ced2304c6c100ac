//! Release source collaborator: listing upgrade-binary releases.
//!
//! The upgrade runner only needs one operation from its release host:
//! list every release of the upgrade-binary repository, with enough asset
//! metadata to validate and download them. [`ReleaseSource`] captures that
//! seam; [`GithubReleaseSource`] is the production implementation against
//! the GitHub REST API, and tests substitute static lists.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Page size for release listing. GitHub caps `per_page` at 100.
const RELEASES_PER_PAGE: usize = 100;

/// One release of the upgrade-binary repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Release identifier assigned by the release host.
    pub id: i64,
    /// Human-readable release name.
    #[serde(default)]
    pub name: String,
    /// Release tag, which doubles as the upgrade version (e.g. `0.0.63`).
    #[serde(default)]
    pub tag_name: String,
    /// Files attached to the release.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A single file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// Asset filename, e.g. `okctl-upgrade_0.0.63_Linux_amd64.tar.gz`.
    pub name: String,
    /// MIME type reported by the release host.
    #[serde(default)]
    pub content_type: String,
    /// Direct download URL for the asset bytes.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// Source of upgrade-binary releases.
pub trait ReleaseSource {
    /// List all releases of `owner/repo`, newest first.
    fn list_releases(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Release>>> + Send;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubReleaseSource {
    client: reqwest::Client,
    api_base: String,
}

impl Default for GithubReleaseSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubReleaseSource {
    /// Create a release source against the public GitHub API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base("https://api.github.com")
    }

    /// Create a release source against a custom API base URL.
    ///
    /// Used by tests pointing at a local fixture server.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_base: api_base.into() }
    }
}

impl ReleaseSource for GithubReleaseSource {
    /// Lists every release, following pagination until a short page.
    ///
    /// The upgrade filter relies on seeing the complete release history:
    /// a truncated listing would silently drop the oldest releases, which
    /// are exactly the ones a long-unmaintained cluster still needs.
    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}/repos/{owner}/{repo}/releases?per_page={RELEASES_PER_PAGE}&page={page}",
                self.api_base
            );
            debug!("Listing releases from {}", url);

            let response = self
                .client
                .get(&url)
                .header("User-Agent", concat!("okctl/", env!("CARGO_PKG_VERSION")))
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .with_context(|| format!("Failed to list releases from {url}"))?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("Listing releases from {url} returned HTTP status {status}");
            }

            let batch: Vec<Release> =
                response.json().await.context("Failed to decode release list")?;
            let last_page = batch.len() < RELEASES_PER_PAGE;
            releases.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }

        debug!("Found {} releases for {}/{}", releases.len(), owner, repo);
        Ok(releases)
    }
}
