//! End-to-end tests of the upgrade runner against in-memory doubles.
//!
//! Releases, downloads, confirmation, and persisted state are all test
//! doubles; the staged "upgrade binaries" are small shell scripts, so the
//! execute stage spawns real processes with real exit codes.

use crate::github::{Release, ReleaseAsset, ReleaseSource};
use crate::staging::{BinaryStager, DiskCache, Fetcher};
use crate::state::{MemoryState, UpgradeState};
use crate::upgrade::runner::{
    ConfirmPrompt, OutputSink, RunnerConfig, UpgradeOutcome, UpgradeRunner,
};
use crate::upgrade::release::UpgradeBinary;
use crate::version::UpgradeVersion;
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone)]
struct StaticReleases(Vec<Release>);

impl ReleaseSource for StaticReleases {
    async fn list_releases(&self, _owner: &str, _repo: &str) -> Result<Vec<Release>> {
        Ok(self.0.clone())
    }
}

/// Serves canned bodies by URL and records every fetch.
#[derive(Default)]
struct MapFetcher {
    bodies: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl MapFetcher {
    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Fetcher for &MapFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.bodies.get(url).cloned().with_context(|| format!("no canned response for {url}"))
    }
}

struct YesConfirm {
    calls: Arc<AtomicUsize>,
}

impl ConfirmPrompt for YesConfirm {
    fn confirm(&self, _queue: &[UpgradeBinary]) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

struct NoConfirm;

impl ConfirmPrompt for NoConfirm {
    fn confirm(&self, _queue: &[UpgradeBinary]) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Clone, Default)]
struct CollectSink(Arc<Mutex<Vec<String>>>);

impl CollectSink {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl OutputSink for CollectSink {
    fn line(&self, _binary: &str, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

fn tar_gz_with(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, name, contents).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

/// A full release fixture: releases list plus every byte the run fetches.
struct Fixture {
    temp: TempDir,
    fetcher: MapFetcher,
    releases: Vec<Release>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("repo")).unwrap();
        Self { temp, fetcher: MapFetcher::default(), releases: Vec::new() }
    }

    /// Add a release whose upgrade binary is `script`.
    fn add_release(&mut self, tag: &str, script: &str) {
        let member = format!("okctl-upgrade_{tag}");
        let archive = tar_gz_with(&member, script.as_bytes());
        let digest = hex::encode(Sha256::digest(&archive));

        let asset_name = format!("okctl-upgrade_{tag}_Linux_amd64.tar.gz");
        let manifest = format!("{digest} {asset_name}\n");
        let manifest_url = format!("https://fixtures.test/{tag}/okctl-upgrade-checksums.txt");
        let archive_url = format!(
            "https://github.com/oslokommune/okctl-upgrade/releases/download/{tag}/{asset_name}"
        );

        self.fetcher.bodies.insert(manifest_url.clone(), manifest.into_bytes());
        self.fetcher.bodies.insert(archive_url, archive);

        self.releases.push(Release {
            id: self.releases.len() as i64 + 1,
            name: tag.to_string(),
            tag_name: tag.to_string(),
            assets: vec![
                ReleaseAsset {
                    name: "okctl-upgrade-checksums.txt".to_string(),
                    content_type: "text/plain".to_string(),
                    download_url: manifest_url,
                },
                ReleaseAsset {
                    name: asset_name.clone(),
                    content_type: "application/gzip".to_string(),
                    download_url: format!("https://fixtures.test/{tag}/{asset_name}"),
                },
            ],
        });
    }

    /// Add a release whose binary echoes its version and working directory.
    fn add_ok_release(&mut self, tag: &str) {
        self.add_release(tag, &format!("#!/bin/sh\necho \"upgrading {tag}\"\necho \"wd=$(pwd)\"\n"));
    }

    fn config(&self, okctl_version: &str) -> RunnerConfig {
        RunnerConfig {
            okctl_version: UpgradeVersion::parse(okctl_version).unwrap(),
            cluster_id: "test-cluster".to_string(),
            repo_owner: "oslokommune".to_string(),
            repo_name: "okctl-upgrade".to_string(),
            repository_root: self.temp.path().join("repo"),
            state_dir: self.temp.path().join(".okctl"),
            host_os: "Linux".to_string(),
            host_arch: "amd64".to_string(),
            max_member_bytes: 1024 * 1024,
        }
    }

    /// Run the state machine once, returning the outcome, the state after
    /// the run, and the captured output lines.
    async fn run(
        &self,
        state: MemoryState,
        okctl_version: &str,
    ) -> (Result<UpgradeOutcome>, MemoryState, Vec<String>) {
        self.run_with_confirm(state, okctl_version, YesConfirm { calls: Arc::default() }).await
    }

    async fn run_with_confirm<P: ConfirmPrompt>(
        &self,
        state: MemoryState,
        okctl_version: &str,
        confirm: P,
    ) -> (Result<UpgradeOutcome>, MemoryState, Vec<String>) {
        let sink = CollectSink::default();
        let stager = BinaryStager::new(
            &self.fetcher,
            DiskCache::new(self.temp.path().join("cache")),
        );
        let mut runner = UpgradeRunner::new(
            StaticReleases(self.releases.clone()),
            stager,
            state,
            confirm,
            sink.clone(),
            self.config(okctl_version),
        );
        let outcome = runner.run().await;
        (outcome, runner.state().clone(), sink.lines())
    }
}

fn fresh_state(cluster_version: &str) -> MemoryState {
    MemoryState::with_cluster_version("test-cluster", cluster_version)
}

#[tokio::test]
#[cfg(unix)]
async fn test_all_pending_upgrades_run_in_order() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.62");
    fixture.add_ok_release("0.0.61");
    fixture.add_ok_release("0.0.64");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, lines) = fixture.run(state, "0.0.64").await;
    assert_eq!(
        outcome.unwrap(),
        UpgradeOutcome::Upgraded {
            applied: vec![
                "0.0.61".to_string(),
                "0.0.62".to_string(),
                "0.0.64".to_string()
            ],
            cluster_version: "0.0.64".to_string(),
        }
    );
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.64"));
    for version in ["0.0.61", "0.0.62", "0.0.64"] {
        assert!(state.get_upgrade(version).unwrap().is_some());
    }

    let upgrade_lines: Vec<&String> =
        lines.iter().filter(|l| l.starts_with("upgrading")).collect();
    assert_eq!(upgrade_lines, ["upgrading 0.0.61", "upgrading 0.0.62", "upgrading 0.0.64"]);
}

#[tokio::test]
#[cfg(unix)]
async fn test_upgrades_newer_than_okctl_are_excluded() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");
    fixture.add_ok_release("0.0.62");
    fixture.add_ok_release("0.0.64");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, _) = fixture.run(state, "0.0.63").await;
    assert_eq!(
        outcome.unwrap(),
        UpgradeOutcome::Upgraded {
            applied: vec!["0.0.61".to_string(), "0.0.62".to_string()],
            cluster_version: "0.0.63".to_string(),
        }
    );
    assert!(state.get_upgrade("0.0.64").unwrap().is_none());
}

#[tokio::test]
#[cfg(unix)]
async fn test_later_hotfix_is_picked_up_after_full_run() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");
    fixture.add_ok_release("0.0.62");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, _) = fixture.run(state, "0.0.63").await;
    assert!(matches!(outcome.unwrap(), UpgradeOutcome::Upgraded { .. }));

    // A hotfix for an already-applied release is published later.
    fixture.add_ok_release("0.0.62.a");
    let (outcome, state, lines) = fixture.run(state, "0.0.63").await;
    assert_eq!(
        outcome.unwrap(),
        UpgradeOutcome::Upgraded {
            applied: vec!["0.0.62.a".to_string()],
            cluster_version: "0.0.63".to_string(),
        }
    );
    assert!(state.get_upgrade("0.0.62.a").unwrap().is_some());
    let upgrade_lines: Vec<&String> =
        lines.iter().filter(|l| l.starts_with("upgrading")).collect();
    assert_eq!(upgrade_lines, ["upgrading 0.0.62.a"]);
}

#[tokio::test]
async fn test_okctl_older_than_cluster_fails_with_zero_writes() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");

    // Original version deliberately unset: even the backfill must not
    // happen when the precondition fails.
    let state = fresh_state("0.0.63");

    let (outcome, state, _) = fixture.run(state, "0.0.60").await;
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("older than cluster version"), "got: {err}");
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.63"));
    assert_eq!(state.original_cluster_version, None);
    assert!(state.upgrades.is_empty());
    assert!(fixture.fetcher.fetched().is_empty());
}

#[tokio::test]
async fn test_empty_queue_is_a_silent_no_op() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.40");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let calls = Arc::new(AtomicUsize::new(0));
    let (outcome, state, _) = fixture
        .run_with_confirm(state, "0.0.63", YesConfirm { calls: calls.clone() })
        .await;
    assert_eq!(outcome.unwrap(), UpgradeOutcome::NothingToDo);
    // No prompt and no version bump for an empty queue.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.50"));
}

#[tokio::test]
async fn test_declined_confirmation_aborts_without_mutation() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, _) = fixture.run_with_confirm(state, "0.0.63", NoConfirm).await;
    assert_eq!(outcome.unwrap(), UpgradeOutcome::Aborted);
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.50"));
    assert!(state.upgrades.is_empty());
}

#[tokio::test]
async fn test_original_version_is_backfilled_once() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.40");

    let state = fresh_state("0.0.50");
    let (outcome, state, _) = fixture.run(state, "0.0.63").await;
    assert_eq!(outcome.unwrap(), UpgradeOutcome::NothingToDo);
    assert_eq!(state.original_cluster_version.as_deref(), Some("0.0.50"));
}

#[tokio::test]
#[cfg(unix)]
async fn test_digest_mismatch_stops_before_later_binaries() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");
    fixture.add_ok_release("0.0.62");

    // Corrupt the first queued binary's archive after its digest was
    // recorded in the manifest.
    let bad_url =
        "https://github.com/oslokommune/okctl-upgrade/releases/download/0.0.61/okctl-upgrade_0.0.61_Linux_amd64.tar.gz";
    fixture
        .fetcher
        .bodies
        .insert(bad_url.to_string(), tar_gz_with("okctl-upgrade_0.0.61", b"tampered"));

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, _) = fixture.run(state, "0.0.63").await;
    let err = outcome.unwrap_err();
    assert!(format!("{err:#}").contains("digest mismatch"), "got: {err:#}");
    assert!(state.upgrades.is_empty());
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.50"));

    // The second binary's archive was never even fetched.
    let fetched = fixture.fetcher.fetched();
    assert!(!fetched.iter().any(|url| url.contains("0.0.62_Linux")), "fetched: {fetched:?}");
}

#[tokio::test]
#[cfg(unix)]
async fn test_failed_binary_stops_the_queue_but_keeps_progress() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");
    fixture.add_release("0.0.62", "#!/bin/sh\necho \"something broke\" >&2\nexit 1\n");
    fixture.add_ok_release("0.0.63");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, lines) = fixture.run(state, "0.0.63").await;
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("okctl-upgrade_0.0.62"), "got: {err}");

    // 0.0.61 completed and is recorded; the cluster version reflects it.
    assert!(state.get_upgrade("0.0.61").unwrap().is_some());
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.61"));
    // 0.0.63 never ran.
    assert!(state.get_upgrade("0.0.63").unwrap().is_none());
    // stderr from the failing binary reached the operator.
    assert!(lines.iter().any(|l| l == "something broke"), "lines: {lines:?}");
}

#[tokio::test]
#[cfg(unix)]
async fn test_unreadable_output_fails_the_upgrade_and_stops_the_binary() {
    let mut fixture = Fixture::new();
    // Emits a line that is not valid UTF-8, then stays alive: the run
    // must fail on the stream error and kill the binary rather than
    // leave it running.
    fixture.add_release(
        "0.0.61",
        "#!/bin/sh\nprintf '\\377\\376\\n'\nsleep 30\n",
    );

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let started = std::time::Instant::now();
    let (outcome, state, _) = fixture.run(state, "0.0.63").await;
    let err = outcome.unwrap_err();
    assert!(
        format!("{err:#}").contains("Failed to stream upgrade binary output"),
        "got: {err:#}"
    );
    assert!(state.upgrades.is_empty());
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.50"));
    // The sleeping binary was reaped, not waited out.
    assert!(started.elapsed() < std::time::Duration::from_secs(25));
}

#[tokio::test]
#[cfg(unix)]
async fn test_rerun_after_failure_resumes_at_first_unapplied() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");
    fixture.add_release("0.0.62", "#!/bin/sh\nexit 1\n");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, state, _) = fixture.run(state, "0.0.63").await;
    assert!(outcome.is_err());

    // The broken upgrade gets republished fixed (new fixture bytes, same
    // tag), and the operator re-runs okctl.
    let mut fixed = Fixture {
        temp: fixture.temp,
        fetcher: MapFetcher::default(),
        releases: Vec::new(),
    };
    fixed.add_ok_release("0.0.61");
    fixed.add_ok_release("0.0.62");

    // Remove the cached broken binary so the fixed bytes are staged.
    std::fs::remove_dir_all(fixed.temp.path().join("cache")).unwrap();

    let (outcome, state, lines) = fixed.run(state, "0.0.63").await;
    assert_eq!(
        outcome.unwrap(),
        UpgradeOutcome::Upgraded {
            applied: vec!["0.0.62".to_string()],
            cluster_version: "0.0.63".to_string(),
        }
    );
    assert_eq!(state.cluster_version.as_deref(), Some("0.0.63"));
    let upgrade_lines: Vec<&String> =
        lines.iter().filter(|l| l.starts_with("upgrading")).collect();
    assert_eq!(upgrade_lines, ["upgrading 0.0.62"]);
}

#[tokio::test]
#[cfg(unix)]
async fn test_binaries_run_in_the_repository_root() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let (outcome, _, lines) = fixture.run(state, "0.0.63").await;
    assert!(matches!(outcome.unwrap(), UpgradeOutcome::Upgraded { .. }));

    let repo_root = fixture.temp.path().join("repo");
    let wd_line = lines.iter().find(|l| l.starts_with("wd=")).expect("wd line captured");
    let reported = std::fs::canonicalize(wd_line.trim_start_matches("wd=")).unwrap();
    assert_eq!(reported, std::fs::canonicalize(repo_root).unwrap());
}

#[tokio::test]
async fn test_missing_platform_checksum_fails_staging() {
    let mut fixture = Fixture::new();
    fixture.add_ok_release("0.0.61");

    let mut state = fresh_state("0.0.50");
    state.original_cluster_version = Some("0.0.50".to_string());

    let sink = CollectSink::default();
    let stager =
        BinaryStager::new(&fixture.fetcher, DiskCache::new(fixture.temp.path().join("cache")));
    let mut config = fixture.config("0.0.63");
    config.host_os = "Darwin".to_string();
    let mut runner = UpgradeRunner::new(
        StaticReleases(fixture.releases.clone()),
        stager,
        state,
        YesConfirm { calls: Arc::default() },
        sink,
        config,
    );

    let err = runner.run().await.unwrap_err();
    assert!(err.to_string().contains("no checksum for Darwin/amd64"), "got: {err}");
}
