//! Configuration file sections

use crate::types::KeyAttributes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Key service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyServiceConfig {
    /// Base URL of the key service (e.g. `https://keys.example.com`)
    #[serde(default)]
    pub url: String,
    /// Bearer token presented on every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Client metadata sent with every request (application name, version, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl KeyServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}

impl Default for KeyServiceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            timeout_secs: default_timeout_secs(),
            metadata: BTreeMap::new(),
        }
    }
}

/// S3 connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
        }
    }
}

/// Materials provider settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Attributes applied to every key creation request
    #[serde(default)]
    pub default_attributes: KeyAttributes,
    /// Fold user object metadata into key attributes at creation time
    #[serde(default)]
    pub metadata_capture: bool,
}

/// Content encryption settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Plaintext bytes sealed per AES-GCM chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}
