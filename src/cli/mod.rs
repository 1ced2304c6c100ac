//! Command-line interface wiring.
//!
//! okctl's provisioning commands talk to AWS and Kubernetes through their
//! own modules; this crate surfaces the self-upgrade subsystem, so the
//! CLI exposes the `upgrade` command plus the global flags shared by all
//! commands.

mod upgrade;

pub use upgrade::UpgradeArgs;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Top-level command-line interface for okctl.
#[derive(Parser)]
#[command(
    name = "okctl",
    about = "Opinionated CLI for provisioning and upgrading AWS-hosted Kubernetes clusters",
    version,
    long_about = "okctl provisions AWS-hosted Kubernetes clusters and keeps previously \
                  created clusters consistent with newer okctl releases through versioned \
                  upgrade binaries."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging.
    ///
    /// Equivalent to `RUST_LOG=debug`. Mutually exclusive with `--quiet`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors, for automation.
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Available okctl subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Upgrade the cluster to match the running okctl release.
    ///
    /// Determines which upgrade binaries the cluster still needs, downloads
    /// and verifies them, and runs them in version order. Safe to re-run:
    /// completed upgrades are recorded and skipped.
    Upgrade(UpgradeArgs),
}

impl Cli {
    /// The log filter directive implied by the global flags.
    #[must_use]
    pub fn log_directive(&self) -> Option<&'static str> {
        if self.quiet {
            None
        } else if self.verbose {
            Some("okctl=debug")
        } else {
            Some("okctl=info")
        }
    }

    /// Execute the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Upgrade(args) => args.execute().await,
        }
    }
}
