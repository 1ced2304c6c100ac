//! Parsers for release-asset filenames and checksum manifests.
//!
//! Upgrade release assets follow the naming convention
//! `okctl-upgrade_<version>_<Os>_<arch>.<ext>`, and every release carries
//! a plain-text checksum manifest with one `<sha256-hex> <filename>` line
//! per binary asset. Both formats are strict: anything that does not
//! parse exactly aborts release parsing with the offending input in the
//! error.

use crate::core::OkctlError;
use crate::staging::DigestAlgorithm;
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;

static DIGEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z]+$").expect("digest regex is valid"));

/// The structured parts of an upgrade-binary asset filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUpgradeFilename {
    /// Raw version string encoded in the filename.
    pub version: String,
    /// OS token, e.g. `Darwin`.
    pub os: String,
    /// Architecture token, e.g. `amd64`.
    pub arch: String,
    /// Extension after the architecture, e.g. `tar.gz`.
    pub extension: String,
}

/// An expected digest for one OS/arch build of an upgrade binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    /// OS token the digest applies to.
    pub os: String,
    /// Architecture token the digest applies to.
    pub arch: String,
    /// Digest algorithm declared by the manifest format.
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

/// Parse `okctl-upgrade_<version>_<Os>_<arch>.<ext>` into its parts.
///
/// # Errors
///
/// Names the expected and actual part counts and the input string when
/// the underscore split does not yield exactly 4 parts, or when the last
/// part has no extension after the architecture.
pub fn parse_upgrade_filename(name: &str) -> Result<ParsedUpgradeFilename> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() != 4 {
        return Err(OkctlError::MalformedFilename {
            input: name.to_string(),
            expected: 4,
            actual: parts.len(),
        }
        .into());
    }

    let version = parts[1];
    let os = parts[2];
    let arch_and_ext = parts[3];

    let Some((arch, extension)) = arch_and_ext.split_once('.') else {
        return Err(OkctlError::MalformedArchSegment {
            input: arch_and_ext.to_string(),
            filename: name.to_string(),
        }
        .into());
    };
    if arch.is_empty() || extension.is_empty() {
        return Err(OkctlError::MalformedArchSegment {
            input: arch_and_ext.to_string(),
            filename: name.to_string(),
        }
        .into());
    }

    Ok(ParsedUpgradeFilename {
        version: version.to_string(),
        os: os.to_string(),
        arch: arch.to_string(),
        extension: extension.to_string(),
    })
}

/// Parse a checksum manifest into per-platform digests.
///
/// One non-empty line per binary asset, exactly two whitespace-separated
/// fields: the lowercase hex digest and the asset filename. OS and
/// architecture are recovered from the filename; the algorithm is fixed
/// to SHA-256, the only hash the manifest format declares.
pub fn parse_checksum_manifest(bytes: &[u8]) -> Result<Vec<Checksum>> {
    let text = std::str::from_utf8(bytes).context("Checksum manifest is not valid UTF-8")?;

    let mut checksums = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(OkctlError::MalformedChecksumLine {
                line: line.to_string(),
                fields: fields.len(),
            }
            .into());
        }

        let (digest, filename) = (fields[0], fields[1]);
        if !DIGEST_RE.is_match(digest) {
            return Err(OkctlError::InvalidDigest { digest: digest.to_string() }.into());
        }

        let parsed = parse_upgrade_filename(filename)?;
        checksums.push(Checksum {
            os: parsed.os,
            arch: parsed.arch,
            algorithm: DigestAlgorithm::Sha256,
            digest: digest.to_string(),
        });
    }

    Ok(checksums)
}
