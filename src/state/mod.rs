//! Persisted cluster and upgrade state.
//!
//! The runner depends on three durable facts per cluster:
//!
//! - **cluster version**: the okctl version the cluster state currently
//!   matches; bumped after every completed upgrade and once more at full
//!   completion
//! - **original cluster version**: the okctl version the cluster was
//!   *created* with; written once and never overwritten, it anchors the
//!   "too old" filter boundary for the cluster's lifetime
//! - **upgrade records**: the set of raw version strings already executed
//!   against this cluster
//!
//! Absence is modelled as `Option`, not a sentinel error. The production
//! implementation is a JSON document under the repository's `.okctl`
//! directory; tests use [`MemoryState`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Record that one upgrade-binary version has run against a cluster.
///
/// Existence is a set-membership fact: the exact raw version string has
/// been executed, hotfix suffix included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    /// Identity of the cluster the upgrade ran against.
    pub cluster_id: String,
    /// The raw version string of the executed upgrade binary.
    pub version: String,
}

/// Lookup and persistence of executed-upgrade records.
pub trait UpgradeState {
    /// The record for `version`, if that exact raw version has run.
    fn get_upgrade(&self, version: &str) -> Result<Option<UpgradeRecord>>;

    /// Persist a record. Saving an already-present version is a no-op.
    fn save_upgrade(&mut self, record: UpgradeRecord) -> Result<()>;
}

/// Lookup and persistence of the cluster's version markers.
pub trait ClusterVersionState {
    /// The okctl version the cluster state currently matches.
    fn get_cluster_version(&self) -> Result<String>;

    /// Overwrite the cluster version.
    fn save_cluster_version(&mut self, version: &str) -> Result<()>;

    /// The version the cluster was created with, if recorded.
    fn get_original_cluster_version(&self) -> Result<Option<String>>;

    /// Record the original cluster version. Write-once: the runner only
    /// calls this when no value exists yet.
    fn save_original_cluster_version(&mut self, version: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    cluster_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_cluster_version: Option<String>,
    #[serde(default)]
    upgrades: BTreeSet<String>,
}

/// JSON-file-backed implementation of both state traits.
///
/// The whole document is rewritten on every mutation via a temp file in
/// the same directory, so a crash never leaves a truncated state file.
#[derive(Debug)]
pub struct FileState {
    path: PathBuf,
    doc: StateDocument,
}

impl FileState {
    /// Open (or initialise) the state document at `path` for `cluster_id`.
    pub fn open(path: impl Into<PathBuf>, cluster_id: &str) -> Result<Self> {
        let path = path.into();
        let doc = if path.is_file() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse state file {}", path.display()))?
        } else {
            StateDocument { cluster_id: cluster_id.to_string(), ..StateDocument::default() }
        };
        Ok(Self { path, doc })
    }

    /// The path of the underlying state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .with_context(|| format!("State path {} has no parent", self.path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory {}", parent.display()))?;

        let contents =
            serde_json::to_string_pretty(&self.doc).context("Failed to serialize state")?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .context("Failed to create temporary state file")?;
        std::io::Write::write_all(&mut temp, contents.as_bytes())
            .context("Failed to write state")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to persist state at {}", self.path.display()))?;

        debug!("Persisted state to {}", self.path.display());
        Ok(())
    }
}

impl UpgradeState for FileState {
    fn get_upgrade(&self, version: &str) -> Result<Option<UpgradeRecord>> {
        Ok(self.doc.upgrades.contains(version).then(|| UpgradeRecord {
            cluster_id: self.doc.cluster_id.clone(),
            version: version.to_string(),
        }))
    }

    fn save_upgrade(&mut self, record: UpgradeRecord) -> Result<()> {
        self.doc.upgrades.insert(record.version);
        self.persist()
    }
}

impl ClusterVersionState for FileState {
    fn get_cluster_version(&self) -> Result<String> {
        self.doc.cluster_version.clone().with_context(|| {
            format!("No cluster version recorded in {}", self.path.display())
        })
    }

    fn save_cluster_version(&mut self, version: &str) -> Result<()> {
        self.doc.cluster_version = Some(version.to_string());
        self.persist()
    }

    fn get_original_cluster_version(&self) -> Result<Option<String>> {
        Ok(self.doc.original_cluster_version.clone())
    }

    fn save_original_cluster_version(&mut self, version: &str) -> Result<()> {
        self.doc.original_cluster_version = Some(version.to_string());
        self.persist()
    }
}

/// In-memory implementation of both state traits, for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    /// Cluster identity attached to returned records.
    pub cluster_id: String,
    /// Current cluster version, if set.
    pub cluster_version: Option<String>,
    /// Original cluster version, if set.
    pub original_cluster_version: Option<String>,
    /// Raw version strings already executed.
    pub upgrades: BTreeSet<String>,
}

impl MemoryState {
    /// A state double with the given current cluster version.
    #[must_use]
    pub fn with_cluster_version(cluster_id: &str, version: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            cluster_version: Some(version.to_string()),
            ..Self::default()
        }
    }
}

impl UpgradeState for MemoryState {
    fn get_upgrade(&self, version: &str) -> Result<Option<UpgradeRecord>> {
        Ok(self.upgrades.contains(version).then(|| UpgradeRecord {
            cluster_id: self.cluster_id.clone(),
            version: version.to_string(),
        }))
    }

    fn save_upgrade(&mut self, record: UpgradeRecord) -> Result<()> {
        self.upgrades.insert(record.version);
        Ok(())
    }
}

impl ClusterVersionState for MemoryState {
    fn get_cluster_version(&self) -> Result<String> {
        self.cluster_version.clone().context("No cluster version recorded")
    }

    fn save_cluster_version(&mut self, version: &str) -> Result<()> {
        self.cluster_version = Some(version.to_string());
        Ok(())
    }

    fn get_original_cluster_version(&self) -> Result<Option<String>> {
        Ok(self.original_cluster_version.clone())
    }

    fn save_original_cluster_version(&mut self, version: &str) -> Result<()> {
        self.original_cluster_version = Some(version.to_string());
        Ok(())
    }
}
