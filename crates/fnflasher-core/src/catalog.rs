//! Platform catalog and release list documents
//!
//! Both documents are JSON objects with a single collection key:
//!
//! ```json
//! { "platforms": [ { "name": "ATARI", "url": "atari/releases.json", "build": "atari" } ] }
//! { "releases": [ { "version": "1.0", "url": "fw.zip", "sha256": "ab12..." } ] }
//! ```
//!
//! Parsing is forgiving: an element missing a mandatory field is skipped with
//! a warning, and a document that is not valid JSON yields an empty list with
//! an error logged. Nothing here returns an error to the caller.

use serde_json::{Map, Value};

/// A hardware platform from the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Display name
    pub name: String,
    /// Release list location, relative to the catalog URL
    pub url: String,
    /// Free-form description
    pub description: String,
    /// Build tag, upper case
    pub build_tag: String,
}

/// A published firmware release for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Version string
    pub version: String,
    /// Package location, relative to the release list URL
    pub url: String,
    /// Published SHA-256 of the package (hex, any case)
    pub sha256: String,
    /// Build tag of the platform the release belongs to
    pub platform_build_tag: String,
    /// Name of the platform the release belongs to
    pub platform_name: String,
    /// Version date/time
    pub version_date: String,
    /// Build date/time
    pub build_date: String,
    /// Free-form description
    pub description: String,
}

impl Release {
    /// "<platform> - <version>"
    pub fn named_version(&self) -> String {
        format!("{} - {}", self.platform_name, self.version)
    }

    /// Multi-line summary for display
    pub fn info_text(&self) -> String {
        format!(
            "Platform: {}\nVersion: {}\nVersion Date/Time: {}\nBuild Date/Time: {}\nDescription: {}\n",
            self.platform_name, self.version, self.version_date, self.build_date, self.description
        )
    }

    /// Whether `digest` matches the published checksum (case-insensitive)
    pub fn sha256_matches(&self, digest: &str) -> bool {
        self.sha256.eq_ignore_ascii_case(digest)
    }
}

/// Parse a platform catalog document
pub fn parse_platforms(data: &[u8]) -> Vec<Platform> {
    parse_collection(data, "platforms")
        .iter()
        .enumerate()
        .filter_map(|(index, element)| as_platform(index, element))
        .collect()
}

/// Parse a release list document for the given platform
pub fn parse_releases(data: &[u8], build_tag: &str, platform_name: &str) -> Vec<Release> {
    parse_collection(data, "releases")
        .iter()
        .enumerate()
        .filter_map(|(index, element)| as_release(index, element, build_tag, platform_name))
        .collect()
}

/// Extract the top-level collection, or nothing if the document is malformed
fn parse_collection(data: &[u8], key: &str) -> Vec<Value> {
    let document: Value = match serde_json::from_slice(data) {
        Ok(document) => document,
        Err(e) => {
            log::error!("JSON error in {} document: {}", key, e);
            return Vec::new();
        }
    };

    match document.get(key) {
        Some(Value::Array(elements)) => elements.clone(),
        Some(_) => {
            log::error!("\"{}\" is not a list", key);
            Vec::new()
        }
        None => {
            log::warn!("Document has no \"{}\" list", key);
            Vec::new()
        }
    }
}

fn as_platform(index: usize, element: &Value) -> Option<Platform> {
    let Some(fields) = element.as_object() else {
        log::warn!("Platform entry #{} is not an object, skipped", index);
        return None;
    };

    let (Some(name), Some(url)) = (text(fields, "name"), text(fields, "url")) else {
        log::warn!(
            "Missing mandatory key(s) for platform entry #{}, platform entry skipped",
            index
        );
        return None;
    };

    Some(Platform {
        name,
        url,
        description: text(fields, "description").unwrap_or_default(),
        build_tag: text(fields, "build").unwrap_or_default().to_uppercase(),
    })
}

fn as_release(
    index: usize,
    element: &Value,
    build_tag: &str,
    platform_name: &str,
) -> Option<Release> {
    let Some(fields) = element.as_object() else {
        log::warn!("Release entry #{} is not an object, skipped", index);
        return None;
    };

    let (Some(version), Some(url), Some(sha256)) = (
        text(fields, "version"),
        text(fields, "url"),
        text(fields, "sha256"),
    ) else {
        log::warn!(
            "Missing mandatory key(s) for release entry #{}, release entry skipped",
            index
        );
        return None;
    };

    Some(Release {
        version,
        url,
        sha256,
        platform_build_tag: build_tag.to_string(),
        platform_name: platform_name.to_string(),
        version_date: text(fields, "version_date").unwrap_or_default(),
        build_date: text(fields, "build_date").unwrap_or_default(),
        description: text(fields, "description").unwrap_or_default(),
    })
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(scalar_text)
}

/// A JSON value as text; scalars are stringified, null and containers are absent
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
