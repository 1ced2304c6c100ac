//! Selection of the upgrades that must run now.
//!
//! Given the full candidate set, the filter removes everything that is
//! out of range or already applied and sorts the rest into execution
//! order. The function is pure: it reads its inputs and produces the
//! exact, ordered execution queue with no side effects.

use crate::upgrade::release::UpgradeBinary;
use crate::version::UpgradeVersion;
use std::collections::HashSet;
use tracing::debug;

/// Compute the ordered execution queue from `candidates`.
///
/// Filtering order matters:
///
/// 1. Drop candidates strictly newer than `okctl_version`: a cluster
///    must never run upgrades from a newer release line than the binary
///    executing them.
/// 2. Drop candidates not strictly newer than `original_cluster_version`:
///    a fresh cluster created at that version never needed them. The
///    comparison uses the immutable *original* version, not the current
///    one, so a later-published hotfix for an already-applied release is
///    still picked up.
/// 3. Drop candidates whose raw version string is in `already_executed`
///    (exact match, hotfix-sensitive).
/// 4. Stable-sort the remainder ascending.
pub fn filter_upgrades(
    candidates: Vec<UpgradeBinary>,
    okctl_version: &UpgradeVersion,
    original_cluster_version: &UpgradeVersion,
    already_executed: &HashSet<String>,
) -> Vec<UpgradeBinary> {
    let mut queue: Vec<UpgradeBinary> = candidates
        .into_iter()
        .filter(|candidate| {
            if candidate.version > *okctl_version {
                debug!("Skipping {}: newer than okctl {}", candidate.name, okctl_version);
                return false;
            }
            if candidate.version <= *original_cluster_version {
                debug!(
                    "Skipping {}: not newer than original cluster version {}",
                    candidate.name, original_cluster_version
                );
                return false;
            }
            if already_executed.contains(candidate.version.raw()) {
                debug!("Skipping {}: already executed", candidate.name);
                return false;
            }
            true
        })
        .collect();

    queue.sort_by(|a, b| a.version.cmp(&b.version));
    queue
}
