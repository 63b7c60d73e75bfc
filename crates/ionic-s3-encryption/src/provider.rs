//! Key-service backed encryption materials provider
//!
//! The provider branches on the incoming materials description:
//!
//! - **Generate** (no `key-id`): builds key attributes from the configured
//!   defaults, optionally the captured object metadata, and the pending request
//!   behind `request-token`; creates a key; returns it with a description of
//!   `{"key-id": <id>, "version": "1.0.0"}`.
//! - **Retrieve** (`key-id` present): fetches the key, caches the full response
//!   for the facade to hand out, and returns it with an empty description.
//!
//! Defaults are read once per generate call, so a concurrent
//! [`IonicEncryptionMaterialsProvider::set_default_attributes`] takes effect on
//! the next call and never on one already in flight.

use crate::cache::ResponseKeyCache;
use crate::correlator::PendingRequestCorrelator;
use crate::materials::{EncryptionMaterials, MaterialsProvider};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use ionic_s3_core::config::ProviderConfig;
use ionic_s3_core::types::{KEY_ID_KEY, PROVIDER_VERSION, VERSION_KEY};
use ionic_s3_core::{Error, KeyAttributes, KeyParams, KeyService, MaterialsDescription, Result, ServiceKey};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct ProviderSettings {
    default_attributes: KeyAttributes,
    metadata_capture: bool,
}

/// Materials provider that creates and fetches keys through a [`KeyService`]
pub struct IonicEncryptionMaterialsProvider {
    key_service: Arc<dyn KeyService>,
    settings: ArcSwap<ProviderSettings>,
    requests: PendingRequestCorrelator,
    responses: ResponseKeyCache,
}

impl IonicEncryptionMaterialsProvider {
    /// Create a provider with no default attributes and metadata capture off
    pub fn new(key_service: Arc<dyn KeyService>) -> Self {
        Self {
            key_service,
            settings: ArcSwap::from_pointee(ProviderSettings::default()),
            requests: PendingRequestCorrelator::new(),
            responses: ResponseKeyCache::new(),
        }
    }

    /// Create a provider seeded from the `provider` config section
    pub fn from_config(key_service: Arc<dyn KeyService>, config: &ProviderConfig) -> Self {
        let provider = Self::new(key_service);
        provider.settings.store(Arc::new(ProviderSettings {
            default_attributes: config.default_attributes.clone(),
            metadata_capture: config.metadata_capture,
        }));
        provider
    }

    /// Whether user object metadata is folded into key attributes
    pub fn is_metadata_capture_enabled(&self) -> bool {
        self.settings.load().metadata_capture
    }

    pub fn set_metadata_capture(&self, enabled: bool) {
        self.settings.rcu(|current| ProviderSettings {
            metadata_capture: enabled,
            ..ProviderSettings::clone(current)
        });
    }

    /// Snapshot of the attributes applied to every created key
    pub fn default_attributes(&self) -> KeyAttributes {
        self.settings.load().default_attributes.clone()
    }

    /// Replace the default attributes wholesale
    pub fn set_default_attributes(&self, attributes: KeyAttributes) {
        self.settings.rcu(|current| ProviderSettings {
            default_attributes: attributes.clone(),
            ..ProviderSettings::clone(current)
        });
    }

    /// Park key creation parameters and return the token to put in the description
    pub fn store_request_key(&self, params: KeyParams) -> String {
        self.requests.store(params)
    }

    /// Remove and return the key service response for the most recent fetch of `id`
    pub fn take_response_key(&self, id: &str) -> Option<ServiceKey> {
        self.responses.take(id)
    }

    /// Pending requests not yet consumed by a generate call
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Create a key with only the default attributes
    pub async fn encryption_materials_default(&self) -> Result<EncryptionMaterials> {
        self.generate(None).await
    }

    async fn generate(&self, description: Option<&MaterialsDescription>) -> Result<EncryptionMaterials> {
        let settings = self.settings.load_full();
        let mut request = KeyParams::new().with_attributes(settings.default_attributes.clone());

        if let Some(description) = description {
            if settings.metadata_capture {
                for (name, value) in description
                    .iter()
                    .filter(|(name, _)| !MaterialsDescription::is_reserved(name))
                {
                    request.attributes.insert(name.clone(), [value.clone()]);
                }
            }

            if let Some(token) = description.request_token() {
                let pending = self
                    .requests
                    .take(token)
                    .ok_or_else(|| Error::correlation_miss(token))?;
                request.attributes.merge(&pending.attributes);
                request.mutable_attributes = pending.mutable_attributes;
                request.reference = pending.reference;
            }
        }

        debug!(
            "Creating key with {} attribute(s) via {}",
            request.attributes.len(),
            self.key_service.name()
        );
        let key = self.key_service.create_key(&request).await.inspect_err(|e| {
            if e.is_policy_denied() {
                warn!("Key creation denied by key service policy");
            }
        })?;
        info!("Created key {}", key.id);

        let description = MaterialsDescription::new()
            .with(KEY_ID_KEY, key.id.as_str())
            .with(VERSION_KEY, PROVIDER_VERSION);

        Ok(EncryptionMaterials::new(key.secret, description))
    }

    async fn retrieve(&self, key_id: &str) -> Result<EncryptionMaterials> {
        if key_id.is_empty() {
            return Err(Error::invalid_argument("materials description has an empty key id"));
        }

        debug!("Fetching key {} via {}", key_id, self.key_service.name());
        let key = self.key_service.get_key(key_id).await?;
        let secret = key.secret.clone();
        self.responses.put(key_id, key);

        Ok(EncryptionMaterials::new(secret, MaterialsDescription::new()))
    }
}

#[async_trait]
impl MaterialsProvider for IonicEncryptionMaterialsProvider {
    async fn encryption_materials(
        &self,
        description: Option<&MaterialsDescription>,
    ) -> Result<EncryptionMaterials> {
        match description.and_then(MaterialsDescription::key_id) {
            Some(key_id) => self.retrieve(key_id).await,
            None => self.generate(description).await,
        }
    }
}

impl std::fmt::Debug for IonicEncryptionMaterialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IonicEncryptionMaterialsProvider")
            .field("key_service", &self.key_service.name())
            .field("metadata_capture", &self.is_metadata_capture_enabled())
            .field("pending_requests", &self.requests.len())
            .field("cached_responses", &self.responses.len())
            .finish_non_exhaustive()
    }
}
