//! Version model for upgrade binaries.
//!
//! Upgrade releases are versioned with a semantic version plus an optional
//! *hotfix* suffix: `0.0.63` or `0.0.63.a`. A hotfix is a supplementary
//! upgrade for a version that has already been released, used to correct a
//! faulty prior upgrade without bumping the primary version.
//!
//! The total order is: numeric semver triple first; on a tie, no hotfix
//! sorts strictly before any hotfix, and hotfixes compare lexicographically.
//! So `0.0.2 < 0.0.2.a < 0.0.2.b < 0.0.3 < 0.0.20`.
//!
//! # Examples
//!
//! ```rust
//! use okctl::version::UpgradeVersion;
//!
//! # fn example() -> anyhow::Result<()> {
//! let plain = UpgradeVersion::parse("0.0.63")?;
//! assert_eq!(plain.hotfix(), None);
//!
//! let hotfix = UpgradeVersion::parse("0.0.63.a")?;
//! assert_eq!(hotfix.hotfix(), Some("a"));
//! assert!(plain < hotfix);
//! # Ok(())
//! # }
//! ```

use crate::core::OkctlError;
use anyhow::Result;
use semver::Version;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed upgrade-binary version: semver triple plus optional hotfix.
///
/// The original input string is retained in `raw` and is the canonical
/// form persisted to state and matched against execution records. `raw`
/// always reparses to the same triple and hotfix.
#[derive(Debug, Clone)]
pub struct UpgradeVersion {
    raw: String,
    version: Version,
    hotfix: Option<String>,
}

impl UpgradeVersion {
    /// Parse a version string of the form `X.Y.Z` or `X.Y.Z.H`.
    ///
    /// # Errors
    ///
    /// Returns [`OkctlError::InvalidVersion`] when the input does not have
    /// exactly 3 or 4 dot-separated segments, and
    /// [`OkctlError::InvalidSemver`] when the `X.Y.Z` part is not a valid
    /// semantic version.
    pub fn parse(text: &str) -> Result<Self> {
        let segments: Vec<&str> = text.split('.').collect();

        let (semver_text, hotfix) = match segments.len() {
            3 => (text.to_string(), None),
            4 => (segments[..3].join("."), Some(segments[3].to_string())),
            _ => {
                return Err(OkctlError::InvalidVersion { input: text.to_string() }.into());
            }
        };

        let version = Version::parse(&semver_text).map_err(|source| {
            OkctlError::InvalidSemver { input: semver_text.clone(), source }
        })?;

        Ok(Self { raw: text.to_string(), version, hotfix })
    }

    /// The original version string as it appeared in the release tag.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The semantic-version component.
    #[must_use]
    pub const fn semver(&self) -> &Version {
        &self.version
    }

    /// The hotfix suffix, if any.
    #[must_use]
    pub fn hotfix(&self) -> Option<&str> {
        self.hotfix.as_deref()
    }
}

impl PartialEq for UpgradeVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for UpgradeVersion {}

impl PartialOrd for UpgradeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UpgradeVersion {
    /// Semver triple first; on a tie, `None` hotfix sorts before any
    /// hotfix and hotfixes compare lexicographically. `Option`'s derived
    /// ordering gives exactly that.
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version).then_with(|| self.hotfix.cmp(&other.hotfix))
    }
}

impl fmt::Display for UpgradeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for UpgradeVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Stable ascending sort by the upgrade-version comparator.
///
/// Stability matters: candidates that compare equal keep their release
/// order, so the execution queue is deterministic.
pub fn sort_ascending(versions: &mut [UpgradeVersion]) {
    versions.sort();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> UpgradeVersion {
        UpgradeVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_three_segments_has_no_hotfix() {
        let version = v("0.0.63");
        assert_eq!(version.raw(), "0.0.63");
        assert_eq!(version.semver(), &Version::new(0, 0, 63));
        assert_eq!(version.hotfix(), None);
    }

    #[test]
    fn test_parse_four_segments_has_hotfix() {
        let version = v("0.0.63.a");
        assert_eq!(version.raw(), "0.0.63.a");
        assert_eq!(version.semver(), &Version::new(0, 0, 63));
        assert_eq!(version.hotfix(), Some("a"));
    }

    #[test]
    fn test_parse_rejects_other_segment_counts() {
        for input in ["", "1", "1.2", "1.2.3.4.5"] {
            let err = UpgradeVersion::parse(input).unwrap_err();
            assert_eq!(err.to_string(), format!("not a valid version: {input}"));
        }
    }

    #[test]
    fn test_parse_rejects_non_numeric_semver() {
        let err = UpgradeVersion::parse("1.2.x").unwrap_err();
        assert!(err.to_string().contains("1.2.x"), "got: {err}");
    }

    #[test]
    fn test_raw_reparses_deterministically() {
        for input in ["0.0.1", "0.0.63.a", "10.20.30.hotfix"] {
            let first = v(input);
            let second = v(first.raw());
            assert_eq!(first, second);
            assert_eq!(first.hotfix(), second.hotfix());
        }
    }

    #[test]
    fn test_sort_ascending_plain_versions() {
        let mut versions = vec![v("0.0.3"), v("0.0.2"), v("0.0.1")];
        sort_ascending(&mut versions);
        let raw: Vec<&str> = versions.iter().map(UpgradeVersion::raw).collect();
        assert_eq!(raw, ["0.0.1", "0.0.2", "0.0.3"]);
    }

    #[test]
    fn test_sort_ascending_with_hotfixes_and_double_digits() {
        let mut versions = vec![
            v("0.0.2.b"),
            v("0.0.3"),
            v("0.0.20"),
            v("0.0.2"),
            v("0.0.2.a"),
            v("0.0.1"),
        ];
        sort_ascending(&mut versions);
        let raw: Vec<&str> = versions.iter().map(UpgradeVersion::raw).collect();
        assert_eq!(raw, ["0.0.1", "0.0.2", "0.0.2.a", "0.0.2.b", "0.0.3", "0.0.20"]);
    }

    #[test]
    fn test_hotfix_sorts_after_plain_version() {
        assert!(v("0.0.2") < v("0.0.2.a"));
        assert!(v("0.0.2.a") < v("0.0.2.b"));
        assert!(v("0.0.2.b") < v("0.0.3"));
    }

    #[test]
    fn test_numeric_not_lexicographic_triple_comparison() {
        assert!(v("0.0.3") < v("0.0.20"));
        assert!(v("0.9.0") < v("0.10.0"));
    }
}
