//! Host platform tokens for release-asset selection.
//!
//! Upgrade-binary release assets are named with a capitalized OS token
//! (`Linux`, `Darwin`) and a Go-style architecture token (`amd64`,
//! `arm64`). These helpers map the running host onto that convention so
//! the runner can pick the matching asset and checksum.

use crate::core::OkctlError;
use anyhow::Result;

/// The OS token used in upgrade-binary asset names for this host.
///
/// # Errors
///
/// Returns [`OkctlError::UnsupportedPlatform`] on operating systems that
/// upgrade binaries are not published for.
pub fn host_os_token() -> Result<&'static str> {
    match std::env::consts::OS {
        "linux" => Ok("Linux"),
        "macos" => Ok("Darwin"),
        other => Err(OkctlError::UnsupportedPlatform {
            detail: format!("operating system '{other}'"),
        }
        .into()),
    }
}

/// The architecture token used in upgrade-binary asset names for this host.
///
/// # Errors
///
/// Returns [`OkctlError::UnsupportedPlatform`] on architectures that
/// upgrade binaries are not published for.
pub fn host_arch_token() -> Result<&'static str> {
    match std::env::consts::ARCH {
        "x86_64" => Ok("amd64"),
        "aarch64" => Ok("arm64"),
        other => Err(OkctlError::UnsupportedPlatform {
            detail: format!("architecture '{other}'"),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn test_host_os_token_is_capitalized() {
        let token = host_os_token().unwrap();
        assert!(token.chars().next().unwrap().is_uppercase());
    }

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn test_host_arch_token_uses_go_naming() {
        let token = host_arch_token().unwrap();
        assert!(token == "amd64" || token == "arm64");
    }
}
