//! Binary staging pipeline: fetch → verify → decompress → cache.
//!
//! Turns a remote release asset into a locally runnable, integrity-checked
//! executable. The pipeline is generic over its collaborators so the same
//! code stages upgrade binaries and third-party tool binaries alike:
//!
//! 1. **Short-circuit**: a cache hit for `(name, version, os, arch)`
//!    returns the resolved path with no network and no re-verification.
//! 2. **Fetch**: download the archive bytes over HTTPS ([`Fetcher`]).
//! 3. **Verify**: check every expected digest ([`Verifier`]); unverified
//!    content never reaches disk.
//! 4. **Decompress**: extract the single named member, bounded by a byte
//!    limit ([`decompress::extract_member`]).
//!
//! The staged binary lands at a deterministic cache path, so interrupted
//! runs resume without re-downloading.

pub mod cache;
pub mod decompress;
pub mod fetcher;
pub mod verify;

pub use cache::{BinaryCache, CacheKey, DiskCache, MemoryCache};
pub use fetcher::{Fetcher, HttpFetcher};
pub use verify::{DigestAlgorithm, Verifier};

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// One staging request: where to fetch, how to verify, what to extract.
#[derive(Debug)]
pub struct StageRequest {
    /// Cache identity of the binary being staged.
    pub key: CacheKey,
    /// HTTPS URL of the release asset.
    pub url: String,
    /// Expected digests over the fetched archive bytes.
    pub verifier: Verifier,
    /// Archive extension controlling the decompressor (e.g. `.tar.gz`).
    pub archive_extension: String,
    /// Name of the member to extract from the archive.
    pub archive_member: String,
    /// Upper bound on the decompressed member size.
    pub max_member_bytes: u64,
}

/// Drives the staging pipeline against a fetcher and a cache.
#[derive(Debug)]
pub struct BinaryStager<F, C> {
    fetcher: F,
    cache: C,
}

impl<F: Fetcher, C: BinaryCache> BinaryStager<F, C> {
    /// Create a stager over the given fetcher and cache.
    pub fn new(fetcher: F, cache: C) -> Self {
        Self { fetcher, cache }
    }

    /// The fetcher this stager downloads with.
    ///
    /// The release parser reuses it for checksum manifests, so one
    /// configuration covers every download in a run.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Stage one binary, returning the path of the runnable executable.
    ///
    /// A cache hit returns immediately. Otherwise the asset is fetched,
    /// verified, decompressed, and stored; any failure leaves the cache
    /// untouched.
    pub async fn stage(&mut self, request: &StageRequest) -> Result<PathBuf> {
        if let Some(path) = self.cache.lookup(&request.key) {
            debug!("Using cached binary at {}", path.display());
            return Ok(path);
        }

        info!("Staging {} from {}", request.key.name, request.url);
        let archive = self
            .fetcher
            .fetch(&request.url)
            .await
            .with_context(|| format!("Failed to fetch {}", request.key.name))?;

        request
            .verifier
            .verify(&archive)
            .with_context(|| format!("Failed to verify {}", request.key.name))?;

        let binary = decompress::extract_member(
            &archive,
            &request.archive_extension,
            &request.archive_member,
            request.max_member_bytes,
        )?;

        self.cache.store(&request.key, &binary)
    }
}
