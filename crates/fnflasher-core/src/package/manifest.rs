//! Package manifest (`release.json`)
//!
//! Unlike the catalog documents, the manifest is all-or-nothing: one bad
//! entry rejects the whole package, because the entries drive device writes.

use crate::catalog::scalar_text;
use crate::error::PackageError;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Name of the manifest member inside a firmware package
pub const MANIFEST_NAME: &str = "release.json";

/// One file listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Archive member name
    pub filename: String,
    /// Flash offset
    pub offset: u32,
    /// Whether this is the firmware image
    pub is_firmware: bool,
}

/// Release metadata carried by the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Firmware version
    pub version: String,
    /// Version date/time
    pub version_date: String,
    /// Git commit the firmware was built from
    pub git_commit: String,
}

/// Parsed and validated manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Files in manifest order
    pub entries: Vec<ManifestEntry>,
    /// Release metadata
    pub info: ReleaseInfo,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    files: Vec<RawEntry>,
    // display only, so any scalar is accepted
    #[serde(default)]
    version: Value,
    #[serde(default)]
    version_date: Value,
    #[serde(default)]
    git_commit: Value,
}

#[derive(Deserialize)]
struct RawEntry {
    filename: Option<String>,
    offset: Option<String>,
}

impl Manifest {
    /// Parse and validate manifest bytes
    pub fn parse(data: &[u8]) -> Result<Self, PackageError> {
        let raw: RawManifest = serde_json::from_slice(data).map_err(|e| {
            PackageError::CorruptPackage(format!("{} is not valid: {}", MANIFEST_NAME, e))
        })?;

        let entries = raw
            .files
            .into_iter()
            .enumerate()
            .map(|(index, entry)| validate_entry(index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entries,
            info: ReleaseInfo {
                version: scalar_text(&raw.version).unwrap_or_default(),
                version_date: scalar_text(&raw.version_date).unwrap_or_default(),
                git_commit: scalar_text(&raw.git_commit).unwrap_or_default(),
            },
        })
    }

    /// The single firmware entry
    pub fn firmware_entry(&self) -> Result<&ManifestEntry, PackageError> {
        let mut firmware = self.entries.iter().filter(|e| e.is_firmware);
        match (firmware.next(), firmware.count()) {
            (None, _) => Err(PackageError::MissingFirmwareEntry),
            (Some(entry), 0) => Ok(entry),
            (Some(_), others) => Err(PackageError::AmbiguousFirmwareEntry(others + 1)),
        }
    }
}

fn validate_entry(index: usize, entry: RawEntry) -> Result<ManifestEntry, PackageError> {
    let invalid = |reason: String| PackageError::InvalidManifestEntry { index, reason };

    let filename = entry
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| invalid("missing filename".to_string()))?;
    let offset = entry
        .offset
        .ok_or_else(|| invalid(format!("{}: missing offset", filename)))?;
    let offset = parse_offset(&offset).map_err(|e| invalid(format!("{}: {}", filename, e)))?;

    Ok(ManifestEntry {
        is_firmware: is_firmware_name(&filename),
        filename,
        offset,
    })
}

/// Parse a base-16 offset, with or without a `0x` prefix
pub fn parse_offset(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err(format!("invalid offset {:?}", s));
    }
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid offset {:?}: {}", s, e))
}

/// Whether the file stem is "firmware" (any case)
fn is_firmware_name(filename: &str) -> bool {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.eq_ignore_ascii_case("firmware"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_entries() {
        let manifest = Manifest::parse(
            br#"{"files":[{"filename":"firmware.bin","offset":"0x1000"},{"filename":"bootloader.bin","offset":"0x0"}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.entries.len(), 2);
        let firmware = manifest.firmware_entry().unwrap();
        assert_eq!(firmware.filename, "firmware.bin");
        assert_eq!(firmware.offset, 4096);
        assert!(!manifest.entries[1].is_firmware);
        assert_eq!(manifest.entries[1].offset, 0);
        assert_eq!(manifest.info, ReleaseInfo::default());
    }

    #[test]
    fn test_missing_offset_rejects_everything() {
        let err = Manifest::parse(
            br#"{"files":[{"filename":"firmware.bin","offset":"0x10000"},{"filename":"spiffs.bin"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PackageError::InvalidManifestEntry { index: 1, .. }
        ));
    }

    #[test]
    fn test_missing_filename() {
        let err = Manifest::parse(br#"{"files":[{"offset":"0x0"}]}"#).unwrap_err();
        assert!(matches!(
            err,
            PackageError::InvalidManifestEntry { index: 0, .. }
        ));
    }

    #[test]
    fn test_bad_hex_offset() {
        let err =
            Manifest::parse(br#"{"files":[{"filename":"firmware.bin","offset":"0xZZ"}]}"#)
                .unwrap_err();
        assert!(matches!(err, PackageError::InvalidManifestEntry { .. }));
    }

    #[test]
    fn test_no_firmware_entry() {
        let manifest =
            Manifest::parse(br#"{"files":[{"filename":"bootloader.bin","offset":"0x1000"}]}"#)
                .unwrap();
        assert!(matches!(
            manifest.firmware_entry(),
            Err(PackageError::MissingFirmwareEntry)
        ));
    }

    #[test]
    fn test_two_firmware_entries_ambiguous() {
        let manifest = Manifest::parse(
            br#"{"files":[{"filename":"firmware.bin","offset":"0x10000"},{"filename":"FIRMWARE.img","offset":"0x20000"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.firmware_entry(),
            Err(PackageError::AmbiguousFirmwareEntry(2))
        ));
    }

    #[test]
    fn test_parse_offset_forms() {
        assert_eq!(parse_offset("0x1000"), Ok(0x1000));
        assert_eq!(parse_offset("0X8000"), Ok(0x8000));
        assert_eq!(parse_offset("e000"), Ok(0xE000));
        assert!(parse_offset("0x").is_err());
        assert!(parse_offset("-1").is_err());
    }

    #[test]
    fn test_release_info() {
        let manifest = Manifest::parse(
            br#"{"files":[],"version":"v1.3","version_date":"2024-05-01 10:00:00","git_commit":"abc123"}"#,
        )
        .unwrap();
        assert_eq!(manifest.info.version, "v1.3");
        assert_eq!(manifest.info.git_commit, "abc123");
    }

    #[test]
    fn test_numeric_release_info_stringified() {
        let manifest = Manifest::parse(
            br#"{"files":[{"filename":"firmware.bin","offset":"0x10000"}],"version":1.3,"version_date":null,"git_commit":["x"]}"#,
        )
        .unwrap();
        assert_eq!(manifest.info.version, "1.3");
        assert_eq!(manifest.info.version_date, "");
        assert_eq!(manifest.info.git_commit, "");
        assert_eq!(manifest.entries.len(), 1);
    }
}
