//! On-disk cache of staged binaries.
//!
//! Staged binaries are cached under a path derived deterministically from
//! `(name, version, os, arch)`, so a crashed or re-run invocation skips
//! fetching and verifying anything it already staged, including across
//! process restarts. The cache is an explicit object owned by the stager
//! and threaded through calls; there is no ambient global state, and
//! tests substitute an in-memory double.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity of one staged binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Binary name, e.g. `okctl-upgrade_0.0.63`.
    pub name: String,
    /// Raw version string.
    pub version: String,
    /// OS token from the release naming convention, e.g. `Linux`.
    pub os: String,
    /// Architecture token, e.g. `amd64`.
    pub arch: String,
}

/// Cache of staged, runnable binaries.
pub trait BinaryCache {
    /// The staged path for `key`, if one exists.
    fn lookup(&self, key: &CacheKey) -> Option<PathBuf>;

    /// Persist `contents` as the staged binary for `key`, returning its
    /// resolved path.
    fn store(&mut self, key: &CacheKey, contents: &[u8]) -> Result<PathBuf>;
}

/// [`BinaryCache`] backed by a directory tree.
///
/// Layout: `<root>/<name>/<version>/<os>_<arch>/<name>`. Existence of
/// that path is the cache check.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Create a disk cache rooted at `root`. The directory is created
    /// lazily on first store.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The deterministic path for `key`, whether or not it exists yet.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(&key.name)
            .join(&key.version)
            .join(format!("{}_{}", key.os, key.arch))
            .join(&key.name)
    }
}

impl BinaryCache for DiskCache {
    fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }

    fn store(&mut self, key: &CacheKey, contents: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(key);
        let parent = path
            .parent()
            .with_context(|| format!("Cache path {} has no parent", path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {}", parent.display()))?;

        // Write via a temp file in the same directory so a crash mid-write
        // never leaves a half-staged binary at the cache path.
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .context("Failed to create temporary file for staged binary")?;
        std::io::Write::write_all(&mut temp, contents)
            .context("Failed to write staged binary")?;
        set_executable(temp.path())?;
        temp.persist(&path)
            .with_context(|| format!("Failed to persist staged binary at {}", path.display()))?;

        debug!("Staged {} ({} bytes)", path.display(), contents.len());
        Ok(path)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to set executable permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-memory [`BinaryCache`] double for tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<CacheKey, PathBuf>,
}

impl MemoryCache {
    /// Create an empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a resolved path, as if the binary had been staged earlier.
    pub fn insert(&mut self, key: CacheKey, path: impl Into<PathBuf>) {
        self.entries.insert(key, path.into());
    }
}

impl BinaryCache for MemoryCache {
    fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: &CacheKey, contents: &[u8]) -> Result<PathBuf> {
        let path = PathBuf::from(format!("memory/{}/{}", key.name, contents.len()));
        self.entries.insert(key.clone(), path.clone());
        Ok(path)
    }
}
