//! Conversion of raw releases into validated upgrade-binary descriptors.
//!
//! Every release of the upgrade repository must carry a checksum manifest
//! plus one binary archive per supported platform, all named for the
//! release tag. Validation is all-or-nothing: a single malformed release
//! aborts the whole batch, so filtering and execution only ever see a
//! fully trustworthy candidate set.

use crate::constants::{
    UPGRADE_ARCHIVE_EXTENSION, UPGRADE_BINARY_PREFIX, UPGRADE_CHECKSUMS_FILENAME,
    UPGRADE_REPO_NAME, UPGRADE_REPO_OWNER,
};
use crate::core::OkctlError;
use crate::github::Release;
use crate::staging::Fetcher;
use crate::upgrade::filename::{Checksum, parse_checksum_manifest, parse_upgrade_filename};
use crate::version::UpgradeVersion;
use anyhow::{Context, Result};
use tracing::debug;

/// A validated, immutable upgrade-binary descriptor built from one release.
#[derive(Debug, Clone)]
pub struct UpgradeBinary {
    /// Binary name, `okctl-upgrade_<tag>`; also the archive member name.
    pub name: String,
    /// Archive extension of the release assets, `.tar.gz`.
    pub file_extension: String,
    /// Parsed release version.
    pub version: UpgradeVersion,
    /// One digest per supported OS/arch combination.
    pub checksums: Vec<Checksum>,
}

impl UpgradeBinary {
    /// The checksum for one OS/arch combination, if the release ships it.
    #[must_use]
    pub fn checksum_for(&self, os: &str, arch: &str) -> Option<&Checksum> {
        self.checksums.iter().find(|c| c.os == os && c.arch == arch)
    }

    /// The deterministic download URL for one platform's archive.
    ///
    /// Upgrade descriptors don't carry asset URLs; release downloads
    /// follow the fixed GitHub layout derived from the naming convention.
    #[must_use]
    pub fn download_url(&self, os: &str, arch: &str) -> String {
        format!(
            "https://github.com/{UPGRADE_REPO_OWNER}/{UPGRADE_REPO_NAME}/releases/download/{tag}/{prefix}_{tag}_{os}_{arch}{ext}",
            tag = self.version.raw(),
            prefix = UPGRADE_BINARY_PREFIX,
            ext = self.file_extension,
        )
    }
}

/// Validate `releases` and build one [`UpgradeBinary`] per release.
///
/// Downloads each release's checksum manifest through `fetcher`. Any
/// single release failing validation fails the whole call.
pub async fn parse_releases<F: Fetcher>(
    releases: &[Release],
    fetcher: &F,
) -> Result<Vec<UpgradeBinary>> {
    let mut binaries = Vec::with_capacity(releases.len());
    for release in releases {
        binaries.push(parse_release(release, fetcher).await?);
    }
    Ok(binaries)
}

async fn parse_release<F: Fetcher>(release: &Release, fetcher: &F) -> Result<UpgradeBinary> {
    if release.name.is_empty() {
        return Err(missing_field(release, "name").into());
    }
    if release.tag_name.is_empty() {
        return Err(missing_field(release, "tag_name").into());
    }
    if release.assets.len() < 2 {
        return Err(OkctlError::TooFewAssets {
            release: release.tag_name.clone(),
            count: release.assets.len(),
        }
        .into());
    }

    // Exactly one manifest per release: duplicates would make it
    // ambiguous which digests the binaries are verified against.
    let mut manifests =
        release.assets.iter().filter(|asset| asset.name == UPGRADE_CHECKSUMS_FILENAME);
    let manifest_asset = manifests.next().ok_or_else(|| {
        OkctlError::ChecksumManifestNotFound {
            release: release.tag_name.clone(),
            manifest: UPGRADE_CHECKSUMS_FILENAME,
            assets: release.assets.iter().map(|a| a.name.clone()).collect(),
        }
    })?;
    let duplicates = manifests.count();
    if duplicates > 0 {
        return Err(OkctlError::DuplicateChecksumManifest {
            release: release.tag_name.clone(),
            manifest: UPGRADE_CHECKSUMS_FILENAME,
            count: duplicates + 1,
        }
        .into());
    }

    // Every non-manifest asset must be a binary archive for this tag.
    for asset in &release.assets {
        if asset.name == UPGRADE_CHECKSUMS_FILENAME {
            continue;
        }
        let parsed = parse_upgrade_filename(&asset.name)
            .with_context(|| format!("Validating assets of release '{}'", release.tag_name))?;
        if parsed.version != release.tag_name {
            return Err(OkctlError::ReleaseVersionMismatch {
                asset: asset.name.clone(),
                filename_version: parsed.version,
                tag: release.tag_name.clone(),
            }
            .into());
        }
    }

    debug!("Fetching checksum manifest for release {}", release.tag_name);
    let manifest_bytes = fetcher.fetch(&manifest_asset.download_url).await.with_context(|| {
        format!("Failed to download checksum manifest for release '{}'", release.tag_name)
    })?;
    let checksums = parse_checksum_manifest(&manifest_bytes)
        .with_context(|| format!("Parsing checksum manifest of release '{}'", release.tag_name))?;

    let version = UpgradeVersion::parse(&release.tag_name)
        .with_context(|| format!("Parsing tag of release '{}'", release.tag_name))?;

    Ok(UpgradeBinary {
        name: format!("{UPGRADE_BINARY_PREFIX}_{}", release.tag_name),
        file_extension: UPGRADE_ARCHIVE_EXTENSION.to_string(),
        version,
        checksums,
    })
}

fn missing_field(release: &Release, field: &'static str) -> OkctlError {
    OkctlError::MissingReleaseField { id: release.id, name: release.name.clone(), field }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ReleaseAsset;
    use std::collections::HashMap;

    /// Fetcher double serving canned bodies by URL.
    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.0
                .get(url)
                .cloned()
                .with_context(|| format!("no canned response for {url}"))
        }
    }

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            download_url: format!("https://example.com/{name}"),
        }
    }

    fn release(tag: &str) -> Release {
        Release {
            id: 1,
            name: tag.to_string(),
            tag_name: tag.to_string(),
            assets: vec![
                asset("okctl-upgrade-checksums.txt"),
                asset(&format!("okctl-upgrade_{tag}_Linux_amd64.tar.gz")),
                asset(&format!("okctl-upgrade_{tag}_Darwin_amd64.tar.gz")),
            ],
        }
    }

    fn manifest_fetcher(tag: &str) -> MapFetcher {
        let body = format!(
            "aaaa1111 okctl-upgrade_{tag}_Linux_amd64.tar.gz\n\
             bbbb2222 okctl-upgrade_{tag}_Darwin_amd64.tar.gz\n"
        );
        MapFetcher(HashMap::from([(
            "https://example.com/okctl-upgrade-checksums.txt".to_string(),
            body.into_bytes(),
        )]))
    }

    #[tokio::test]
    async fn test_valid_release_produces_descriptor() {
        let binaries =
            parse_releases(&[release("0.0.63")], &manifest_fetcher("0.0.63")).await.unwrap();

        assert_eq!(binaries.len(), 1);
        let binary = &binaries[0];
        assert_eq!(binary.name, "okctl-upgrade_0.0.63");
        assert_eq!(binary.file_extension, ".tar.gz");
        assert_eq!(binary.version.raw(), "0.0.63");
        assert_eq!(binary.checksums.len(), 2);
        assert_eq!(binary.checksum_for("Linux", "amd64").unwrap().digest, "aaaa1111");
        assert!(binary.checksum_for("Windows", "amd64").is_none());
    }

    #[tokio::test]
    async fn test_download_url_follows_naming_convention() {
        let binaries =
            parse_releases(&[release("0.0.63")], &manifest_fetcher("0.0.63")).await.unwrap();
        assert_eq!(
            binaries[0].download_url("Darwin", "amd64"),
            "https://github.com/oslokommune/okctl-upgrade/releases/download/0.0.63/okctl-upgrade_0.0.63_Darwin_amd64.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_missing_name_names_release_id() {
        let mut bad = release("0.0.63");
        bad.name.clear();
        let err = parse_releases(&[bad], &manifest_fetcher("0.0.63")).await.unwrap_err();
        assert!(err.to_string().contains("missing required field 'name'"), "got: {err}");
    }

    #[tokio::test]
    async fn test_missing_tag_is_rejected() {
        let mut bad = release("0.0.63");
        bad.tag_name.clear();
        let err = parse_releases(&[bad], &manifest_fetcher("0.0.63")).await.unwrap_err();
        assert!(err.to_string().contains("tag_name"));
    }

    #[tokio::test]
    async fn test_too_few_assets_is_rejected() {
        let mut bad = release("0.0.63");
        bad.assets.truncate(1);
        let err = parse_releases(&[bad], &manifest_fetcher("0.0.63")).await.unwrap_err();
        assert!(err.to_string().contains("expected at least 2"));
    }

    #[tokio::test]
    async fn test_missing_manifest_lists_all_asset_names() {
        let mut bad = release("0.0.63");
        bad.assets.remove(0);
        bad.assets.push(asset("okctl-upgrade_0.0.63_Linux_arm64.tar.gz"));
        let err = parse_releases(&[bad], &manifest_fetcher("0.0.63")).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("okctl-upgrade_0.0.63_Linux_amd64.tar.gz"), "got: {msg}");
        assert!(msg.contains("okctl-upgrade_0.0.63_Linux_arm64.tar.gz"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_duplicate_manifest_assets_are_rejected() {
        let mut bad = release("0.0.63");
        bad.assets.push(asset("okctl-upgrade-checksums.txt"));
        let err = parse_releases(&[bad], &manifest_fetcher("0.0.63")).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 'okctl-upgrade-checksums.txt' assets"), "got: {msg}");
        assert!(msg.contains("expected exactly 1"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_asset_version_must_match_tag() {
        let mut bad = release("0.0.63");
        bad.assets[1] = asset("okctl-upgrade_0.0.62_Linux_amd64.tar.gz");
        let err = parse_releases(&[bad], &manifest_fetcher("0.0.63")).await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("0.0.62"), "got: {msg}");
        assert!(msg.contains("0.0.63"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_one_bad_release_aborts_the_whole_batch() {
        let mut bad = release("0.0.64");
        bad.assets.truncate(1);
        let err = parse_releases(&[release("0.0.63"), bad], &manifest_fetcher("0.0.63"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("0.0.64"));
    }
}
