//! Common test infrastructure for ionic-s3-encryption tests
//!
//! Builds a facade over the in-memory key service and object store.

#![allow(dead_code)]

use ionic_s3_core::config::CryptoConfig;
use ionic_s3_core::MemoryKeyService;
use ionic_s3_encryption::{
    IonicEncryptionMaterialsProvider, IonicS3EncryptionClient, IonicS3EncryptionClientBuilder,
    MemoryObjectStore,
};
use std::sync::Arc;

pub const BUCKET: &str = "test-bucket";

/// Small chunks so short test bodies still span several chunks
pub const TEST_CHUNK_SIZE: usize = 16;

pub struct Harness {
    pub keys: Arc<MemoryKeyService>,
    pub store: Arc<MemoryObjectStore>,
    pub provider: Arc<IonicEncryptionMaterialsProvider>,
    pub client: IonicS3EncryptionClient<MemoryObjectStore>,
}

pub fn harness() -> Harness {
    harness_with(MemoryKeyService::new())
}

pub fn harness_with(keys: MemoryKeyService) -> Harness {
    let keys = Arc::new(keys);
    let store = Arc::new(MemoryObjectStore::new());
    let provider = Arc::new(IonicEncryptionMaterialsProvider::new(keys.clone()));
    let client = IonicS3EncryptionClientBuilder::standard()
        .with_encryption_materials(provider.clone())
        .with_crypto_configuration(CryptoConfig {
            chunk_size: TEST_CHUNK_SIZE,
        })
        .build(store.clone())
        .expect("client should build");

    Harness {
        keys,
        store,
        provider,
        client,
    }
}
