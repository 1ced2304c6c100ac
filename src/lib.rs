//! okctl is an opinionated CLI for provisioning and upgrading AWS-hosted
//! Kubernetes clusters.
//!
//! This crate centres on the **self-upgrade subsystem**: when okctl is
//! newer than the cluster it targets, it resolves which versioned
//! *upgrade binaries* the cluster still needs, stages them through a
//! verified download pipeline, and executes them in order so the cluster
//! ends in the same state a fresh cluster created with this okctl would
//! have.
//!
//! # Module map
//!
//! - [`version`]: semver-plus-hotfix version model and total order
//! - [`github`]: the release source collaborator
//! - [`upgrade`]: filename/manifest parsing, release validation,
//!   filtering, and the runner state machine
//! - [`staging`]: the generic fetch, verify, decompress, cache pipeline
//!   for release binaries
//! - [`state`]: persisted cluster-version and upgrade-record state
//! - [`core`]: error taxonomy and operator-facing error rendering
//! - [`cli`]: clap command wiring

pub mod cli;
pub mod constants;
pub mod core;
pub mod github;
pub mod staging;
pub mod state;
pub mod upgrade;
pub mod utils;
pub mod version;
