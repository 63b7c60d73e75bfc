//! Configuration file loading and parsing

use super::types::{CryptoConfig, KeyServiceConfig, ProviderConfig, S3Config};
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::debug;

/// Location searched when no explicit config path is given
pub const DEFAULT_CONFIG_PATH: &str = "~/.ionic-s3/config.yaml";

/// Largest accepted chunk size; the per-part chunk index is 32 bits wide
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// ionic-s3 configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IonicS3Config {
    #[serde(default)]
    pub key_service: KeyServiceConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
}

impl IonicS3Config {
    /// Load configuration from the specified path or the default location
    ///
    /// An explicit path that does not exist is an error; a missing file at the
    /// default location yields the defaults. Environment overrides are applied
    /// in both cases.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("No config at {}, using defaults", default_path);
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without environment overrides
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;

        debug!("Loaded configuration from {}", path);
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Apply `IONIC_KEYSERVICE_URL`, `IONIC_KEYSERVICE_TOKEN`, `AWS_REGION` and
    /// `IONIC_S3_ENDPOINT`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("IONIC_KEYSERVICE_URL") {
            self.key_service.url = url;
        }
        if let Ok(token) = std::env::var("IONIC_KEYSERVICE_TOKEN") {
            self.key_service.token = Some(token);
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.s3.region = region;
        }
        if let Ok(endpoint) = std::env::var("IONIC_S3_ENDPOINT") {
            self.s3.endpoint = Some(endpoint);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.crypto.chunk_size == 0 || self.crypto.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::invalid_config(format!(
                "crypto.chunk_size must be between 1 and {} bytes",
                MAX_CHUNK_SIZE
            )));
        }
        if self.key_service.timeout_secs == 0 {
            return Err(Error::invalid_config(
                "key_service.timeout_secs must be positive",
            ));
        }
        Ok(())
    }

    /// Path of the default configuration file
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).into_owned())
    }
}
