//! Firmware package resolution
//!
//! A firmware package is a zip archive containing `release.json` and the
//! files it lists:
//!
//! ```json
//! {
//!   "version": "v1.3", "version_date": "2024-05-01", "git_commit": "abc123",
//!   "files": [
//!     { "filename": "bootloader.bin", "offset": "0x1000" },
//!     { "filename": "partitions.bin", "offset": "0x8000" },
//!     { "filename": "firmware.bin",   "offset": "0x10000" }
//!   ]
//! }
//! ```
//!
//! [`PackageResolver::resolve`] turns the archive into a [`FirmwarePackage`]
//! holding a ready-to-run [`FlashJob`]. Checksum verification is a separate
//! step ([`verify_checksum`]) since the digest comes from the release list,
//! not from the package.

mod header;
mod manifest;

pub use header::{FirmwareHeader, HEADER_LEN, IMAGE_MAGIC};
pub use manifest::{parse_offset, Manifest, ManifestEntry, ReleaseInfo, MANIFEST_NAME};

use crate::error::PackageError;
use crate::flash::{FlashChunk, FlashJob};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

/// Offset a bare application image is written to
pub const DEFAULT_FIRMWARE_OFFSET: u32 = 0x10000;

/// Largest archive member accepted (the largest supported flash chip)
pub const MAX_MEMBER_SIZE: u64 = 16 * 1024 * 1024;

/// A validated firmware package
#[derive(Debug, Clone)]
pub struct FirmwarePackage {
    /// Release metadata from the manifest
    pub info: ReleaseInfo,
    /// Manifest entries in order
    pub entries: Vec<ManifestEntry>,
    /// Writes to perform
    pub job: FlashJob,
}

/// Turns package bytes into a [`FirmwarePackage`]
pub struct PackageResolver;

impl PackageResolver {
    /// Open, validate and load a firmware package archive
    pub fn resolve(data: &[u8]) -> Result<FirmwarePackage, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| PackageError::CorruptPackage(e.to_string()))?;

        let manifest_bytes = read_member(&mut archive, MANIFEST_NAME, MAX_MEMBER_SIZE)?
            .ok_or(PackageError::MissingManifest(MANIFEST_NAME))?;
        let manifest = Manifest::parse(&manifest_bytes)?;
        let firmware_name = manifest.firmware_entry()?.filename.clone();

        let mut chunks = Vec::with_capacity(manifest.entries.len());
        for (index, entry) in manifest.entries.iter().enumerate() {
            let data = read_member(&mut archive, &entry.filename, MAX_MEMBER_SIZE)?
                .ok_or_else(|| PackageError::MissingPackageFile(entry.filename.clone()))?;
            log::info!(
                "File {}: {}, Offset: 0x{:X}",
                index + 1,
                entry.filename,
                entry.offset
            );
            chunks.push(FlashChunk {
                offset: entry.offset,
                name: entry.filename.clone(),
                data: Bytes::from(data),
            });
        }

        let header = chunks
            .iter()
            .find(|chunk| chunk.name == firmware_name)
            .map(|chunk| FirmwareHeader::parse(&chunk.data))
            .ok_or(PackageError::MissingFirmwareEntry)??;
        let job = FlashJob::new(chunks, header.flash_mode, header.flash_frequency)?;

        Ok(FirmwarePackage {
            info: manifest.info,
            entries: manifest.entries,
            job,
        })
    }

    /// Build a job from a single bare application image
    pub fn resolve_image(image: Bytes, offset: u32) -> Result<FlashJob, PackageError> {
        let header = FirmwareHeader::parse(&image)?;
        FlashJob::new(
            vec![FlashChunk {
                offset,
                name: "firmware.bin".to_string(),
                data: image,
            }],
            header.flash_mode,
            header.flash_frequency,
        )
    }
}

/// Read an archive member, `None` if it does not exist.
///
/// The size recorded in the archive is not trusted: at most `limit` bytes
/// are decompressed and anything larger is rejected.
fn read_member(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, PackageError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(PackageError::CorruptPackage(e.to_string())),
    };

    let mut data = Vec::new();
    file.take(limit + 1)
        .read_to_end(&mut data)
        .map_err(|e| PackageError::CorruptPackage(format!("{}: {}", name, e)))?;
    if data.len() as u64 > limit {
        return Err(PackageError::CorruptPackage(format!(
            "{} is larger than {} bytes",
            name, limit
        )));
    }
    Ok(Some(data))
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check `data` against a published digest (case-insensitive)
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<(), PackageError> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        log::info!("sha256 {} OK", actual);
        Ok(())
    } else {
        log::error!("sha256 {} CHECKSUM ERROR", actual);
        Err(PackageError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
