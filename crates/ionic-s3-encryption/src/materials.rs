//! Encryption materials and the provider hook

use async_trait::async_trait;
use ionic_s3_core::{MaterialsDescription, Result, SecretBytes};

/// A key-encryption key plus the description persisted next to the object
///
/// Lives for a single put/get; the raw key is never persisted.
#[derive(Debug, Clone)]
pub struct EncryptionMaterials {
    pub key: SecretBytes,
    pub description: MaterialsDescription,
}

impl EncryptionMaterials {
    pub fn new(key: SecretBytes, description: MaterialsDescription) -> Self {
        Self { key, description }
    }
}

/// Hook the encryption client calls to obtain key-encryption keys
///
/// On write the client passes the description attached to the request; on
/// read it passes the description stored with the object.
#[async_trait]
pub trait MaterialsProvider: Send + Sync {
    async fn encryption_materials(
        &self,
        description: Option<&MaterialsDescription>,
    ) -> Result<EncryptionMaterials>;

    /// Drop any provider-side caching of materials
    fn refresh(&self) {}
}
