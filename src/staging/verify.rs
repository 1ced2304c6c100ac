//! Integrity verification for downloaded bytes.
//!
//! Every downloaded artifact is verified against the digests published in
//! the release's checksum manifest before it is decompressed or executed.
//! A verifier configured with zero digests is itself an error: there is no
//! code path that treats unverified content as trusted.

use crate::core::OkctlError;
use anyhow::Result;
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Digest algorithms supported by checksum manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    /// SHA-256, the algorithm used by the current manifest format.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Lowercase algorithm name, as used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(chunk),
            Self::Sha512(h) => h.update(chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Verifies bytes against a set of expected digests.
///
/// All configured algorithms are computed in a single pass over the input,
/// then every expected digest must match its computed value. Checksums may
/// be published in either case; comparison is case-insensitive.
#[derive(Debug, Default)]
pub struct Verifier {
    expected: BTreeMap<DigestAlgorithm, String>,
}

impl Verifier {
    /// Create a verifier with no digests configured.
    ///
    /// At least one digest must be added before [`verify`](Self::verify)
    /// will succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expected hex digest for `algorithm`.
    #[must_use]
    pub fn expect(mut self, algorithm: DigestAlgorithm, digest_hex: impl Into<String>) -> Self {
        self.expected.insert(algorithm, digest_hex.into());
        self
    }

    /// Verify `bytes` against every configured digest.
    ///
    /// # Errors
    ///
    /// - [`OkctlError::NoDigestsConfigured`] when nothing was expected
    /// - [`OkctlError::DigestMismatch`] naming the expected and computed
    ///   values on the first mismatch
    /// - [`OkctlError::UnverifiedDigest`] if an expected algorithm was
    ///   somehow never computed (defense against partial verification)
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        if self.expected.is_empty() {
            return Err(OkctlError::NoDigestsConfigured.into());
        }

        // Single pass: feed every hasher from the same chunk stream.
        let mut hashers: Vec<(DigestAlgorithm, Hasher)> =
            self.expected.keys().map(|&alg| (alg, Hasher::new(alg))).collect();
        for chunk in bytes.chunks(64 * 1024) {
            for (_, hasher) in &mut hashers {
                hasher.update(chunk);
            }
        }

        let mut computed = BTreeSet::new();
        for (algorithm, hasher) in hashers {
            let actual = hasher.finalize_hex();
            let expected = &self.expected[&algorithm];
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(OkctlError::DigestMismatch {
                    algorithm: algorithm.name(),
                    expected: expected.clone(),
                    actual,
                }
                .into());
            }
            computed.insert(algorithm);
        }

        for algorithm in self.expected.keys() {
            if !computed.contains(algorithm) {
                return Err(OkctlError::UnverifiedDigest { algorithm: algorithm.name() }.into());
            }
        }

        debug!("Verified {} digest(s) over {} bytes", self.expected.len(), bytes.len());
        Ok(())
    }
}
