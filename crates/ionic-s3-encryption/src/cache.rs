//! Response key cache
//!
//! Holds the full key service response for each retrieved key until the
//! caller that triggered the read asks for it. Entries never expire; an entry
//! that nobody takes stays for the life of the provider.

use dashmap::DashMap;
use ionic_s3_core::ServiceKey;

/// Key id to the key service response that backed the most recent fetch
#[derive(Debug, Default)]
pub struct ResponseKeyCache {
    keys: DashMap<String, ServiceKey>,
}

impl ResponseKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key, replacing and returning any previous entry for `id`
    pub fn put(&self, id: impl Into<String>, key: ServiceKey) -> Option<ServiceKey> {
        self.keys.insert(id.into(), key)
    }

    /// Remove and return the entry for `id`
    ///
    /// `None` means attributes are unavailable for that id, not an error.
    pub fn take(&self, id: &str) -> Option<ServiceKey> {
        self.keys.remove(id).map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
