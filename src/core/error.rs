//! Error handling for okctl's upgrade subsystem.
//!
//! The error system is built around two types:
//! - [`OkctlError`]: strongly-typed failure cases, used for precise
//!   handling and assertions in code
//! - [`ErrorContext`]: a wrapper adding a user-friendly message and an
//!   actionable suggestion, rendered at the CLI boundary
//!
//! # Error Categories
//!
//! Mirroring the failure taxonomy of the upgrade flow:
//! - **Structural/validation**: malformed versions, filenames, checksum
//!   lines, or release metadata. Detected while parsing, before anything
//!   is downloaded or executed.
//! - **Network/integrity**: non-HTTPS URLs, bad HTTP statuses, digest
//!   mismatches. Detected while staging one specific binary.
//! - **Execution**: a spawned upgrade binary exiting non-zero.
//! - **Preconditions**: an okctl binary older than the cluster it targets,
//!   or the operator declining the confirmation prompt.
//!
//! Nothing retries automatically. Re-running okctl is the supported
//! recovery path: completed upgrades are recorded and skipped on the next
//! invocation.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for okctl upgrade operations.
#[derive(Error, Debug)]
pub enum OkctlError {
    /// A version string did not have 3 or 4 dot-separated segments.
    #[error("not a valid version: {input}")]
    InvalidVersion {
        /// The offending version string.
        input: String,
    },

    /// The semver part of a version string failed to parse.
    #[error("parsing version '{input}': {source}")]
    InvalidSemver {
        /// The offending semver text.
        input: String,
        /// Underlying parse failure.
        source: semver::Error,
    },

    /// An upgrade-binary filename did not split into the expected parts.
    #[error("expected {expected} parts when splitting '{input}' on '_', got {actual}")]
    MalformedFilename {
        /// The filename being parsed.
        input: String,
        /// Number of underscore-separated parts required.
        expected: usize,
        /// Number of parts actually found.
        actual: usize,
    },

    /// The `<arch>.<ext>` segment of a filename had no extension.
    #[error("expected at least 2 dot-separated parts in '{input}', in filename '{filename}'")]
    MalformedArchSegment {
        /// The arch+extension segment.
        input: String,
        /// The full filename being parsed.
        filename: String,
    },

    /// A checksum manifest line did not contain exactly two fields.
    #[error("expected 2 whitespace-separated fields in checksum line '{line}', got {fields}")]
    MalformedChecksumLine {
        /// The offending manifest line.
        line: String,
        /// Number of fields actually found.
        fields: usize,
    },

    /// A checksum digest contained characters outside `[0-9a-z]`.
    #[error("'{digest}' is not a valid lowercase hex digest")]
    InvalidDigest {
        /// The offending digest text.
        digest: String,
    },

    /// A release was missing a required metadata field.
    #[error("release {id} ('{name}') is missing required field '{field}'")]
    MissingReleaseField {
        /// Release identifier from the release source.
        id: i64,
        /// Release name, possibly empty.
        name: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A release carried fewer assets than a valid upgrade release can have.
    #[error("release '{release}' has {count} assets, expected at least 2")]
    TooFewAssets {
        /// Release tag or name.
        release: String,
        /// Number of assets found.
        count: usize,
    },

    /// No checksum manifest asset was attached to a release.
    #[error("release '{release}' has no '{manifest}' asset, found: {}", .assets.join(", "))]
    ChecksumManifestNotFound {
        /// Release tag or name.
        release: String,
        /// Expected manifest filename.
        manifest: &'static str,
        /// All asset names seen on the release.
        assets: Vec<String>,
    },

    /// More than one checksum manifest asset was attached to a release.
    #[error("release '{release}' has {count} '{manifest}' assets, expected exactly 1")]
    DuplicateChecksumManifest {
        /// Release tag or name.
        release: String,
        /// Expected manifest filename.
        manifest: &'static str,
        /// Number of manifest assets found.
        count: usize,
    },

    /// An asset filename encoded a version different from the release tag.
    #[error("asset '{asset}' has version '{filename_version}', expected release tag '{tag}'")]
    ReleaseVersionMismatch {
        /// The offending asset filename.
        asset: String,
        /// Version parsed out of the filename.
        filename_version: String,
        /// The release's tag name.
        tag: String,
    },

    /// A fetch URL used a scheme other than HTTPS.
    #[error("refusing to fetch '{url}': only https URLs are allowed")]
    UnsupportedUrlScheme {
        /// The rejected URL.
        url: String,
    },

    /// An HTTP fetch returned a non-success status.
    #[error("fetching '{url}' returned HTTP status {status}")]
    HttpStatus {
        /// The fetched URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The verifier was configured with no expected digests.
    #[error("no digests configured, refusing to treat unverified content as trusted")]
    NoDigestsConfigured,

    /// A computed digest did not match its expected value.
    #[error("{algorithm} digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest algorithm name.
        algorithm: &'static str,
        /// The expected hex digest.
        expected: String,
        /// The computed hex digest.
        actual: String,
    },

    /// An expected digest algorithm was never computed during verification.
    #[error("{algorithm} digest was expected but never computed")]
    UnverifiedDigest {
        /// Digest algorithm name.
        algorithm: &'static str,
    },

    /// The named member was not present in a downloaded archive.
    #[error("couldn't find '{target}' in archive")]
    ArchiveMemberNotFound {
        /// The member name searched for.
        target: String,
    },

    /// An archive member exceeded the decompression size limit.
    #[error("archive member '{target}' exceeds the {limit} byte limit")]
    ArchiveMemberTooLarge {
        /// The member being extracted.
        target: String,
        /// The configured byte limit.
        limit: u64,
    },

    /// No checksum exists for the host platform in a release manifest.
    #[error("upgrade '{binary}' has no checksum for {os}/{arch}")]
    NoChecksumForPlatform {
        /// The upgrade binary name.
        binary: String,
        /// Host operating system token.
        os: String,
        /// Host architecture token.
        arch: String,
    },

    /// The running okctl binary is older than the cluster's version.
    #[error(
        "okctl version {okctl_version} is older than cluster version {cluster_version}; \
         upgrade okctl before upgrading the cluster"
    )]
    OkctlVersionBehindCluster {
        /// Version of the running binary.
        okctl_version: String,
        /// Persisted cluster version.
        cluster_version: String,
    },

    /// A spawned upgrade binary exited unsuccessfully.
    #[error("upgrade binary '{binary}' exited with {status}")]
    UpgradeBinaryFailed {
        /// Name of the binary that failed.
        binary: String,
        /// Exit status description.
        status: String,
    },

    /// Another okctl process already holds the upgrade lock.
    #[error("another okctl upgrade is already running against this repository")]
    UpgradeLockHeld,

    /// The host platform is not one upgrade binaries are published for.
    #[error("unsupported host platform: {detail}")]
    UnsupportedPlatform {
        /// Description of the unsupported OS or architecture.
        detail: String,
    },
}

/// Error wrapper that adds user-friendly context and suggestions.
///
/// Used at the CLI boundary to turn internal errors into something an
/// operator can act on.
pub struct ErrorContext {
    /// The underlying error.
    pub error: anyhow::Error,
    /// An actionable suggestion, if one applies.
    pub suggestion: Option<String>,
    /// Additional details about the failure.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without any extra context.
    pub fn new(error: anyhow::Error) -> Self {
        Self { error, suggestion: None, details: None }
    }

    /// Attach an actionable suggestion shown to the operator.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach extra detail lines shown below the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details, and suggestion to stderr with colors.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.error);
        if let Some(details) = &self.details {
            eprintln!("  {details}");
        }
        if let Some(suggestion) = &self.suggestion {
            eprintln!("{} {}", "hint:".yellow().bold(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(details) = &self.details {
            write!(f, "\n  {details}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into a user-friendly [`ErrorContext`] with a
/// suggestion matched to the failure mode.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let suggestion = match error.downcast_ref::<OkctlError>() {
        Some(OkctlError::OkctlVersionBehindCluster { .. }) => {
            Some("install the latest okctl release, then re-run the upgrade".to_string())
        }
        Some(OkctlError::DigestMismatch { .. }) => Some(
            "the downloaded binary failed integrity verification; \
             re-run the upgrade, and if it persists report it upstream"
                .to_string(),
        ),
        Some(OkctlError::UpgradeLockHeld) => {
            Some("wait for the other okctl process to finish, then retry".to_string())
        }
        Some(OkctlError::UpgradeBinaryFailed { .. }) => Some(
            "re-running 'okctl upgrade' is safe: completed upgrades are \
             recorded and will be skipped"
                .to_string(),
        ),
        Some(OkctlError::HttpStatus { .. }) => {
            Some("check network connectivity and GitHub availability, then retry".to_string())
        }
        _ => None,
    };

    let mut ctx = ErrorContext::new(error);
    if let Some(s) = suggestion {
        ctx = ctx.with_suggestion(s);
    }
    ctx
}
