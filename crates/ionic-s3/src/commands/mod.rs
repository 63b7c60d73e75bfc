//! Subcommand implementations

pub mod get;
pub mod multipart;
pub mod put;
pub mod version;

use crate::cli::KeyArgs;
use anyhow::{Context, Result};
use camino::Utf8Path;
use ionic_s3_core::{Error, IonicS3Config, KeyParams};
use ionic_s3_encryption::{IonicS3EncryptionClient, IonicS3EncryptionClientBuilder};

/// Load configuration and build a client against the configured services
pub(crate) async fn load_client(config_path: Option<&Utf8Path>) -> Result<IonicS3EncryptionClient> {
    let config = IonicS3Config::load(config_path).context("Failed to load configuration")?;
    if !config.key_service.is_configured() {
        anyhow::bail!(
            "No key service configured; set key_service.url in the config file or IONIC_KEYSERVICE_URL"
        );
    }

    Ok(IonicS3EncryptionClientBuilder::default_client(&config).await?)
}

impl KeyArgs {
    pub(crate) fn key_params(&self) -> KeyParams {
        KeyParams::new()
            .with_attributes(self.attributes.clone().unwrap_or_default())
            .with_mutable_attributes(self.mutable_attributes.clone().unwrap_or_default())
    }
}

/// User-facing message for a command failure
pub fn describe_error(err: &anyhow::Error) -> String {
    let Some(ionic) = err.chain().find_map(|e| e.downcast_ref::<Error>()) else {
        return format!("{:#}", err);
    };

    match ionic {
        Error::PolicyDenied { .. } => "Permission denied by Ionic policy".to_string(),
        Error::Store { code: Some(code), .. } if code == "NoSuchKey" => {
            "The specified key does not exist in the bucket".to_string()
        }
        Error::Store { code: Some(code), .. } if code == "NoSuchBucket" => {
            "The specified bucket does not exist".to_string()
        }
        _ => format!("{:#}", err),
    }
}
