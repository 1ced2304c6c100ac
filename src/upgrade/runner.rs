//! The upgrade runner: a linear state machine over one upgrade pass.
//!
//! `Init → ValidateVersion → List → Parse → Filter → Confirm →
//! Execute(loop) → Finalize`, with any state able to fail the run.
//!
//! Execution is strictly sequential: version ordering is a correctness
//! requirement (each migration may assume state left by the previous
//! one), so the queue is never reordered or parallelized. There is no
//! rollback; recovery is re-running okctl, which skips everything already
//! recorded as applied.
//!
//! Progress persistence is ordered for crash safety: after each binary
//! succeeds, its [`UpgradeRecord`] is saved first and the cluster version
//! bumped second, so an interruption between queue items leaves the
//! cluster version at the last fully-completed upgrade.

use crate::core::OkctlError;
use crate::github::ReleaseSource;
use crate::staging::{BinaryCache, BinaryStager, CacheKey, Fetcher, StageRequest, Verifier};
use crate::state::{ClusterVersionState, UpgradeRecord, UpgradeState};
use crate::upgrade::filter::filter_upgrades;
use crate::upgrade::lock::UpgradeLock;
use crate::upgrade::release::{UpgradeBinary, parse_releases};
use crate::version::UpgradeVersion;
use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Everything the runner needs to know about its invocation.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Version of the running okctl binary.
    pub okctl_version: UpgradeVersion,
    /// Identity of the cluster being upgraded.
    pub cluster_id: String,
    /// Owner of the upgrade-binary repository.
    pub repo_owner: String,
    /// Name of the upgrade-binary repository.
    pub repo_name: String,
    /// Working directory upgrade binaries are spawned in.
    pub repository_root: PathBuf,
    /// Directory holding the state file and the run lock.
    pub state_dir: PathBuf,
    /// Host OS token used to select checksums and assets.
    pub host_os: String,
    /// Host architecture token used to select checksums and assets.
    pub host_arch: String,
    /// Decompression limit per archive member.
    pub max_member_bytes: u64,
}

/// Operator confirmation before executing a non-empty queue.
pub trait ConfirmPrompt {
    /// Ask whether the queued upgrades should run. `Ok(false)` aborts
    /// the run with zero further state mutation.
    fn confirm(&self, queue: &[UpgradeBinary]) -> Result<bool>;
}

/// Confirmation that always answers yes (`--yes`).
pub struct AutoConfirm;

impl ConfirmPrompt for AutoConfirm {
    fn confirm(&self, _queue: &[UpgradeBinary]) -> Result<bool> {
        Ok(true)
    }
}

/// Interactive confirmation on the controlling terminal.
///
/// A non-interactive stdin declines: migrations must never run because a
/// pipeline forgot to pass `--yes`.
pub struct TerminalConfirm;

impl ConfirmPrompt for TerminalConfirm {
    fn confirm(&self, queue: &[UpgradeBinary]) -> Result<bool> {
        println!("The following upgrades will be applied, in order:");
        for binary in queue {
            println!("  {}", binary.version.raw().cyan());
        }

        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            warn!("stdin is not a terminal; pass --yes to confirm non-interactively");
            return Ok(false);
        }

        print!("Do you want to continue? [y/N]: ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let mut answer = String::new();
        stdin.lock().read_line(&mut answer).context("Failed to read confirmation")?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Destination for an upgrade binary's streamed output.
pub trait OutputSink {
    /// One line of combined stdout/stderr from `binary`.
    fn line(&self, binary: &str, line: &str);
}

/// Streams upgrade output to the operator's console.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn line(&self, binary: &str, line: &str) {
        println!("{} {line}", format!("[{binary}]").dimmed());
    }
}

/// How a completed run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The queue was empty; nothing was executed and no version changed.
    NothingToDo,
    /// The operator declined the confirmation prompt.
    Aborted,
    /// One or more upgrades ran to completion.
    Upgraded {
        /// Raw versions executed, in order.
        applied: Vec<String>,
        /// Cluster version after finalization.
        cluster_version: String,
    },
}

/// Drives one upgrade pass end to end.
pub struct UpgradeRunner<R, F, C, S, P, O> {
    release_source: R,
    stager: BinaryStager<F, C>,
    state: S,
    confirm: P,
    output: O,
    config: RunnerConfig,
}

impl<R, F, C, S, P, O> UpgradeRunner<R, F, C, S, P, O>
where
    R: ReleaseSource,
    F: Fetcher,
    C: BinaryCache,
    S: UpgradeState + ClusterVersionState,
    P: ConfirmPrompt,
    O: OutputSink,
{
    /// Assemble a runner from its collaborators.
    pub fn new(
        release_source: R,
        stager: BinaryStager<F, C>,
        state: S,
        confirm: P,
        output: O,
        config: RunnerConfig,
    ) -> Self {
        Self { release_source, stager, state, confirm, output, config }
    }

    /// The runner's persisted-state collaborator.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Run the state machine once.
    pub async fn run(&mut self) -> Result<UpgradeOutcome> {
        let _lock = UpgradeLock::acquire(&self.config.state_dir).await?;

        // Init: read version markers. The original-version backfill is
        // deferred until after ValidateVersion so a failed precondition
        // leaves zero writes behind.
        let cluster_version_raw = self.state.get_cluster_version()?;
        let cluster_version = UpgradeVersion::parse(&cluster_version_raw)
            .context("Parsing persisted cluster version")?;
        let original_raw = self.state.get_original_cluster_version()?;

        // ValidateVersion: a cluster must never be operated on by an
        // older binary than what last upgraded it.
        if self.config.okctl_version < cluster_version {
            return Err(OkctlError::OkctlVersionBehindCluster {
                okctl_version: self.config.okctl_version.raw().to_string(),
                cluster_version: cluster_version_raw,
            }
            .into());
        }

        // One-time backfill for clusters created before the original
        // version was recorded.
        let original_raw = match original_raw {
            Some(raw) => raw,
            None => {
                info!("Recording original cluster version {}", cluster_version_raw);
                self.state.save_original_cluster_version(&cluster_version_raw)?;
                cluster_version_raw.clone()
            }
        };
        let original_version = UpgradeVersion::parse(&original_raw)
            .context("Parsing persisted original cluster version")?;

        // List + Parse.
        let releases = self
            .release_source
            .list_releases(&self.config.repo_owner, &self.config.repo_name)
            .await?;
        debug!("Found {} releases", releases.len());
        let candidates = parse_releases(&releases, self.stager.fetcher()).await?;

        // Filter.
        let mut already_executed = HashSet::new();
        for candidate in &candidates {
            if self.state.get_upgrade(candidate.version.raw())?.is_some() {
                already_executed.insert(candidate.version.raw().to_string());
            }
        }
        let queue = filter_upgrades(
            candidates,
            &self.config.okctl_version,
            &original_version,
            &already_executed,
        );
        if queue.is_empty() {
            info!("Cluster is up to date, no upgrades to run");
            return Ok(UpgradeOutcome::NothingToDo);
        }

        // Confirm.
        if !self.confirm.confirm(&queue)? {
            info!("Upgrade aborted by user");
            return Ok(UpgradeOutcome::Aborted);
        }

        // Execute, strictly in order.
        let mut applied = Vec::with_capacity(queue.len());
        for binary in &queue {
            info!("Running upgrade {}", binary.version);
            let path = self.stage(binary).await?;
            self.execute(binary, &path).await?;

            // Record first, bump second: a crash between queue items
            // leaves the cluster version at the last completed upgrade.
            self.state.save_upgrade(UpgradeRecord {
                cluster_id: self.config.cluster_id.clone(),
                version: binary.version.raw().to_string(),
            })?;
            self.state.save_cluster_version(binary.version.raw())?;
            applied.push(binary.version.raw().to_string());
        }

        // Finalize: end at okctl's own version, the identical state a
        // fresh cluster created with this binary would have.
        let final_version = self.config.okctl_version.raw().to_string();
        self.state.save_cluster_version(&final_version)?;
        info!("Cluster upgraded to {}", final_version);

        Ok(UpgradeOutcome::Upgraded { applied, cluster_version: final_version })
    }

    async fn stage(&mut self, binary: &UpgradeBinary) -> Result<PathBuf> {
        let os = &self.config.host_os;
        let arch = &self.config.host_arch;
        let checksum = binary.checksum_for(os, arch).ok_or_else(|| {
            OkctlError::NoChecksumForPlatform {
                binary: binary.name.clone(),
                os: os.clone(),
                arch: arch.clone(),
            }
        })?;

        let request = StageRequest {
            key: CacheKey {
                name: binary.name.clone(),
                version: binary.version.raw().to_string(),
                os: os.clone(),
                arch: arch.clone(),
            },
            url: binary.download_url(os, arch),
            verifier: Verifier::new().expect(checksum.algorithm, checksum.digest.clone()),
            archive_extension: binary.file_extension.clone(),
            archive_member: binary.name.clone(),
            max_member_bytes: self.config.max_member_bytes,
        };
        self.stager.stage(&request).await
    }

    async fn execute(&self, binary: &UpgradeBinary, path: &Path) -> Result<()> {
        let mut child = tokio::process::Command::new(path)
            .current_dir(&self.config.repository_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn upgrade binary {}", path.display()))?;

        let stdout = child.stdout.take().context("Upgrade binary stdout was not piped")?;
        let stderr = child.stderr.take().context("Upgrade binary stderr was not piped")?;

        // Drain both pipes concurrently and join them before waiting on
        // the child. Waiting first can deadlock: the child blocks on a
        // full pipe while okctl blocks on its exit.
        let drain_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                self.output.line(&binary.name, &line);
            }
            Ok::<_, std::io::Error>(())
        };
        let drain_stderr = async {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                self.output.line(&binary.name, &line);
            }
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = tokio::try_join!(drain_stdout, drain_stderr) {
            // Reap the child before surfacing the stream error, or the
            // upgrade binary keeps running unsupervised.
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Err(e).context("Failed to stream upgrade binary output");
        }

        let status = child.wait().await.context("Failed to wait for upgrade binary")?;
        if !status.success() {
            return Err(OkctlError::UpgradeBinaryFailed {
                binary: binary.name.clone(),
                status: status.to_string(),
            }
            .into());
        }

        debug!("{} completed successfully", binary.name);
        Ok(())
    }
}
