//! The `okctl upgrade` command.

use crate::constants::{
    MAX_ARCHIVE_MEMBER_BYTES, STATE_DIR, STATE_FILENAME, UPGRADE_REPO_NAME, UPGRADE_REPO_OWNER,
};
use crate::github::GithubReleaseSource;
use crate::staging::{BinaryStager, DiskCache, HttpFetcher};
use crate::state::FileState;
use crate::upgrade::release::UpgradeBinary;
use crate::upgrade::runner::{
    AutoConfirm, ConfirmPrompt, ConsoleSink, RunnerConfig, TerminalConfirm, UpgradeOutcome,
    UpgradeRunner,
};
use crate::utils::platform::{host_arch_token, host_os_token};
use crate::version::UpgradeVersion;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

/// Command-line arguments for `okctl upgrade`.
///
/// The command is idempotent: upgrades that already ran against this
/// cluster are recorded in the repository's `.okctl` state and skipped,
/// so re-running after a partial failure resumes at the first unapplied
/// upgrade.
#[derive(Parser, Debug)]
pub struct UpgradeArgs {
    /// Answer yes to the confirmation prompt.
    ///
    /// Required when running non-interactively; a non-terminal stdin
    /// declines rather than silently confirming.
    #[arg(short, long)]
    yes: bool,

    /// Root of the cluster repository to upgrade.
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Directory to cache downloaded upgrade binaries in.
    ///
    /// Defaults to the platform cache directory. Staged binaries are
    /// keyed by name, version, and platform, so interrupted runs resume
    /// without re-downloading.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

struct Confirm {
    auto: bool,
}

impl ConfirmPrompt for Confirm {
    fn confirm(&self, queue: &[UpgradeBinary]) -> Result<bool> {
        if self.auto { AutoConfirm.confirm(queue) } else { TerminalConfirm.confirm(queue) }
    }
}

impl UpgradeArgs {
    /// Run the upgrade state machine against the repository at `--path`.
    pub async fn execute(self) -> Result<()> {
        let repository_root = self
            .path
            .canonicalize()
            .with_context(|| format!("Repository path {} does not exist", self.path.display()))?;
        let cluster_id = repository_root
            .file_name()
            .map_or_else(|| "default".to_string(), |name| name.to_string_lossy().into_owned());

        let okctl_version = UpgradeVersion::parse(env!("CARGO_PKG_VERSION"))
            .context("Parsing okctl's own version")?;
        let state_dir = repository_root.join(STATE_DIR);
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .map_or_else(|| state_dir.join("binaries"), |base| base.join("okctl/binaries")),
        };
        debug!("Using binary cache at {}", cache_dir.display());

        let state = FileState::open(state_dir.join(STATE_FILENAME), &cluster_id)?;
        let stager = BinaryStager::new(HttpFetcher::new()?, DiskCache::new(cache_dir));
        let config = RunnerConfig {
            okctl_version,
            cluster_id,
            repo_owner: UPGRADE_REPO_OWNER.to_string(),
            repo_name: UPGRADE_REPO_NAME.to_string(),
            repository_root,
            state_dir,
            host_os: host_os_token()?.to_string(),
            host_arch: host_arch_token()?.to_string(),
            max_member_bytes: MAX_ARCHIVE_MEMBER_BYTES,
        };

        let mut runner = UpgradeRunner::new(
            GithubReleaseSource::new(),
            stager,
            state,
            Confirm { auto: self.yes },
            ConsoleSink,
            config,
        );

        match runner.run().await? {
            UpgradeOutcome::NothingToDo => {
                println!("{}", "Cluster is already up to date.".green());
            }
            UpgradeOutcome::Aborted => {
                println!("Upgrade aborted, nothing was changed.");
            }
            UpgradeOutcome::Upgraded { applied, cluster_version } => {
                println!(
                    "{} {} upgrade(s) applied, cluster is now at version {}",
                    "Success:".green().bold(),
                    applied.len(),
                    cluster_version.cyan()
                );
            }
        }
        Ok(())
    }
}
