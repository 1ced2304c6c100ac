//! Advisory lock guarding a running upgrade.
//!
//! Two okctl processes upgrading the same cluster would interleave
//! migrations and race on the state file. The runner takes an exclusive
//! OS file lock under the state directory before mutating anything; a
//! second invocation fails immediately rather than queueing behind the
//! first.

use crate::constants::UPGRADE_LOCK_FILENAME;
use crate::core::OkctlError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

/// Held exclusive lock on a cluster's upgrade state directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct UpgradeLock {
    file: File,
}

impl UpgradeLock {
    /// Try to acquire the upgrade lock under `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`OkctlError::UpgradeLockHeld`] when another process
    /// already holds the lock.
    pub async fn acquire(state_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(state_dir).await.with_context(|| {
            format!("Failed to create state directory {}", state_dir.display())
        })?;
        let lock_path = state_dir.join(UPGRADE_LOCK_FILENAME);

        // File locking is blocking; keep it off the async runtime.
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&lock_path)
                .with_context(|| {
                    format!("Failed to open lock file {}", lock_path.display())
                })?;
            let acquired = file.try_lock_exclusive().with_context(|| {
                format!("Failed to lock {}", lock_path.display())
            })?;
            if !acquired {
                return Err(OkctlError::UpgradeLockHeld.into());
            }
            debug!("Acquired upgrade lock at {}", lock_path.display());
            Ok(file)
        })
        .await
        .context("Lock acquisition task failed")??;

        Ok(Self { file })
    }
}

impl Drop for UpgradeLock {
    fn drop(&mut self) {
        // Released on close anyway; unlock explicitly for clarity.
        let _ = fs4::fs_std::FileExt::unlock(&self.file);
    }
}
