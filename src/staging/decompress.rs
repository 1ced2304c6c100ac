//! Bounded extraction of a single member from a downloaded archive.
//!
//! Upgrade binaries ship as `.tar.gz` archives (and tool binaries okctl
//! stages with the same pipeline may ship as `.zip`). Extraction pulls
//! exactly one named member and enforces a byte limit, so a malicious or
//! corrupted archive cannot balloon memory. Unknown extensions pass the
//! bytes through unchanged, which covers assets published as bare
//! binaries.

use crate::core::OkctlError;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::result::ZipError;

/// Extract the member named `target` from `bytes`.
///
/// The archive format is chosen from `extension` (leading dot optional):
/// `tar.gz`/`tgz` and `zip` are decompressed, anything else is returned
/// unchanged. `max_bytes` bounds the decompressed size of the member.
///
/// # Errors
///
/// - [`OkctlError::ArchiveMemberNotFound`] when `target` is not in the
///   archive
/// - [`OkctlError::ArchiveMemberTooLarge`] when the member exceeds
///   `max_bytes`
pub fn extract_member(
    bytes: &[u8],
    extension: &str,
    target: &str,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    match extension.trim_start_matches('.') {
        "tar.gz" | "tgz" => extract_from_tar_gz(bytes, target, max_bytes),
        "zip" => extract_from_zip(bytes, target, max_bytes),
        other => {
            debug!("No decompressor for extension '{}', passing bytes through", other);
            Ok(bytes.to_vec())
        }
    }
}

fn extract_from_tar_gz(bytes: &[u8], target: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().context("Failed to read tar.gz archive")? {
        let entry = entry.context("Failed to read tar.gz entry")?;
        let path = entry.path().context("Failed to read tar.gz entry path")?;

        let matches = path.as_os_str() == target
            || path.file_name().is_some_and(|name| name == target);
        if !matches {
            continue;
        }

        if entry.size() > max_bytes {
            return Err(OkctlError::ArchiveMemberTooLarge {
                target: target.to_string(),
                limit: max_bytes,
            }
            .into());
        }

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .take(max_bytes)
            .read_to_end(&mut contents)
            .with_context(|| format!("Failed to extract '{target}' from tar.gz archive"))?;
        debug!("Extracted '{}' ({} bytes) from tar.gz archive", target, contents.len());
        return Ok(contents);
    }

    Err(OkctlError::ArchiveMemberNotFound { target: target.to_string() }.into())
}

fn extract_from_zip(bytes: &[u8], target: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("Failed to read zip archive")?;

    let mut file = match archive.by_name(target) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => {
            return Err(OkctlError::ArchiveMemberNotFound { target: target.to_string() }.into());
        }
        Err(e) => return Err(e).context("Failed to read zip archive"),
    };

    if file.size() > max_bytes {
        return Err(OkctlError::ArchiveMemberTooLarge {
            target: target.to_string(),
            limit: max_bytes,
        }
        .into());
    }

    let mut contents = Vec::with_capacity(file.size() as usize);
    file.by_ref()
        .take(max_bytes)
        .read_to_end(&mut contents)
        .with_context(|| format!("Failed to extract '{target}' from zip archive"))?;
    debug!("Extracted '{}' ({} bytes) from zip archive", target, contents.len());
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn tar_gz_with(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, contents).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn zip_with(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_named_member_from_tar_gz() {
        let archive = tar_gz_with("okctl-upgrade_0.0.63", b"#!/bin/sh\necho hi\n");
        let extracted =
            extract_member(&archive, ".tar.gz", "okctl-upgrade_0.0.63", 1024).unwrap();
        assert_eq!(extracted, b"#!/bin/sh\necho hi\n");
    }

    #[test]
    fn test_extract_named_member_from_zip() {
        let archive = zip_with("okctl-upgrade_0.0.63", b"binary bytes");
        let extracted = extract_member(&archive, "zip", "okctl-upgrade_0.0.63", 1024).unwrap();
        assert_eq!(extracted, b"binary bytes");
    }

    #[test]
    fn test_missing_member_names_target() {
        let archive = tar_gz_with("something-else", b"data");
        let err = extract_member(&archive, "tar.gz", "okctl-upgrade_0.0.63", 1024).unwrap_err();
        assert_eq!(err.to_string(), "couldn't find 'okctl-upgrade_0.0.63' in archive");
    }

    #[test]
    fn test_unknown_extension_passes_bytes_through() {
        let bytes = b"raw binary".to_vec();
        let out = extract_member(&bytes, "exe", "anything", 1024).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_member_over_limit_is_rejected() {
        let archive = tar_gz_with("big", &vec![0u8; 2048]);
        let err = extract_member(&archive, "tar.gz", "big", 1024).unwrap_err();
        assert!(err.to_string().contains("exceeds the 1024 byte limit"), "got: {err}");
    }

    #[test]
    fn test_zip_member_over_limit_is_rejected() {
        let archive = zip_with("big", &vec![0u8; 2048]);
        assert!(extract_member(&archive, ".zip", "big", 1024).is_err());
    }
}
