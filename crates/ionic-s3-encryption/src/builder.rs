//! Builder for [`IonicS3EncryptionClient`]

use crate::client::EncryptionClient;
use crate::facade::IonicS3EncryptionClient;
use crate::provider::IonicEncryptionMaterialsProvider;
use crate::store::{ObjectStore, S3ObjectStore};
use ionic_s3_core::config::CryptoConfig;
use ionic_s3_core::{Error, HttpKeyService, IonicS3Config, Result};
use std::sync::Arc;
use tracing::debug;

/// Assembles a client from a materials provider and an object store
///
/// The provider is mandatory; [`IonicS3EncryptionClientBuilder::build`] fails
/// without one.
#[derive(Debug, Default)]
pub struct IonicS3EncryptionClientBuilder {
    provider: Option<Arc<IonicEncryptionMaterialsProvider>>,
    crypto: CryptoConfig,
}

impl IonicS3EncryptionClientBuilder {
    pub fn standard() -> Self {
        Self::default()
    }

    pub fn with_encryption_materials(mut self, provider: Arc<IonicEncryptionMaterialsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_crypto_configuration(mut self, crypto: CryptoConfig) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn build<S: ObjectStore>(self, store: Arc<S>) -> Result<IonicS3EncryptionClient<S>> {
        let provider = self.provider.ok_or_else(|| {
            Error::invalid_argument("an encryption materials provider must be set before build")
        })?;

        let inner = EncryptionClient::new(store, provider.clone(), self.crypto);
        Ok(IonicS3EncryptionClient::new(inner, provider))
    }

    /// Client talking to the configured key service and S3 endpoint
    pub async fn default_client(config: &IonicS3Config) -> Result<IonicS3EncryptionClient<S3ObjectStore>> {
        let key_service = Arc::new(HttpKeyService::new(&config.key_service)?);
        let provider = Arc::new(IonicEncryptionMaterialsProvider::from_config(
            key_service,
            &config.provider,
        ));
        let store = Arc::new(S3ObjectStore::new(&config.s3).await);

        debug!(
            "Built client for key service {} in region {}",
            config.key_service.url, config.s3.region
        );
        Self::standard()
            .with_encryption_materials(provider)
            .with_crypto_configuration(config.crypto)
            .build(store)
    }
}
