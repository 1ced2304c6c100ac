//! okctl CLI entry point.
//!
//! Parses command-line arguments, initialises logging, executes the
//! selected command, and renders failures as user-friendly errors.

use anyhow::Result;
use clap::Parser;
use okctl::cli::Cli;
use okctl::core::user_friendly_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over the CLI verbosity flags.
    if let Some(directive) = cli.log_directive() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directive));
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
