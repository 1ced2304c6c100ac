//! The self-upgrade subsystem.
//!
//! okctl releases ship companion *upgrade binaries*: standalone
//! executables, downloaded and run once each, that migrate cluster
//! resources created by an older okctl up to the current release. This
//! module resolves which upgrades a cluster needs, stages them through
//! the verified [`staging`](crate::staging) pipeline, and executes them
//! in version order.
//!
//! # Components
//!
//! - [`filename`]: parsers for the release-asset naming convention and
//!   the checksum manifest format
//! - [`release`]: validation of raw releases into [`UpgradeBinary`]
//!   descriptors
//! - [`filter`]: selection of the ordered execution queue
//! - [`runner`]: the `Init → ... → Finalize` state machine
//! - [`lock`]: the advisory lock keeping concurrent runs out
//!
//! # Safety model
//!
//! Upgrades mutate real cluster-adjacent resources, so the subsystem is
//! conservative everywhere: the candidate set must validate completely
//! before anything runs, every download is digest-verified, execution is
//! sequential and stops at the first failure, and completed upgrades are
//! persisted immediately so a re-run resumes instead of repeating work.

pub mod filename;
pub mod filter;
pub mod lock;
pub mod release;
pub mod runner;

#[cfg(test)]
mod tests;

pub use filename::{Checksum, ParsedUpgradeFilename, parse_checksum_manifest, parse_upgrade_filename};
pub use filter::filter_upgrades;
pub use lock::UpgradeLock;
pub use release::{UpgradeBinary, parse_releases};
pub use runner::{
    AutoConfirm, ConfirmPrompt, ConsoleSink, OutputSink, RunnerConfig, TerminalConfirm,
    UpgradeOutcome, UpgradeRunner,
};
