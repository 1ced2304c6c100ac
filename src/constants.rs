//! Global constants used throughout the okctl codebase.
//!
//! Fixed filenames, naming conventions, and limits shared between the
//! release parser, the staging pipeline, and the upgrade runner. Defining
//! them centrally keeps the release-asset naming contract in one place.

use std::time::Duration;

/// GitHub organisation hosting the upgrade-binary releases.
pub const UPGRADE_REPO_OWNER: &str = "oslokommune";

/// GitHub repository hosting the upgrade-binary releases.
pub const UPGRADE_REPO_NAME: &str = "okctl-upgrade";

/// Prefix shared by every upgrade-binary release asset.
///
/// Full asset names follow `okctl-upgrade_<version>_<Os>_<arch>.<ext>`,
/// for example `okctl-upgrade_0.0.63_Darwin_amd64.tar.gz`.
pub const UPGRADE_BINARY_PREFIX: &str = "okctl-upgrade";

/// Fixed name of the checksum manifest attached to every upgrade release.
pub const UPGRADE_CHECKSUMS_FILENAME: &str = "okctl-upgrade-checksums.txt";

/// Archive extension used by upgrade-binary release assets.
pub const UPGRADE_ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Upper bound on the decompressed size of a single archive member.
///
/// Protects memory when extracting a staged binary from a malicious or
/// corrupted archive.
pub const MAX_ARCHIVE_MEMBER_BYTES: u64 = 128 * 1024 * 1024;

/// Default timeout for a single HTTP fetch in the staging pipeline.
///
/// Large upgrade binaries can take a while on slow links, but a hung
/// download must not stall the run forever.
pub fn default_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Directory under the repository root holding okctl's persisted state.
pub const STATE_DIR: &str = ".okctl";

/// Name of the persisted cluster-state document inside [`STATE_DIR`].
pub const STATE_FILENAME: &str = "state.json";

/// Name of the advisory lock file guarding a running upgrade.
pub const UPGRADE_LOCK_FILENAME: &str = "upgrade.lock";
