//! URL-keyed artifact cache
//!
//! Catalog and release list documents are small and effectively immutable per
//! URL, so the cache has no expiry: entries live until [`ArtifactCache::flush`]
//! is called (the "reload" action). Firmware packages are never cached.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Process-wide store of downloaded documents
///
/// Construct one at startup and share it as `Arc<ArtifactCache>` with every
/// fetcher. The lock is only held for the map operation itself.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl ArtifactCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the bytes stored for `url`
    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.entries.lock().get(url).cloned()
    }

    /// Store `data` for `url`, replacing any previous entry
    pub fn set(&self, url: impl Into<String>, data: Bytes) {
        let url = url.into();
        log::trace!("cache update: {} ({} bytes)", url, data.len());
        self.entries.lock().insert(url, data);
    }

    /// Drop every entry
    ///
    /// Fetches that already hold their bytes are unaffected; one that writes
    /// back after the flush simply repopulates its entry.
    pub fn flush(&self) {
        let mut entries = self.entries.lock();
        log::debug!("Flushing {} cached artifact(s)", entries.len());
        entries.clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
