//! In-process key service
//!
//! Issues random 256-bit keys with short random ids and keeps them in memory.
//! Used for tests and local runs without a reachable key service.

use crate::error::{Error, Result, POLICY_DENIED_STATUS};
use crate::keyservice::KeyService;
use crate::types::{KeyAttributes, KeyParams, SecretBytes, ServiceKey};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Length of generated key ids
const KEY_ID_LEN: usize = 11;

/// Size of generated keys in bytes
const KEY_SIZE: usize = 32;

/// Status returned for unknown key ids
pub const KEY_NOT_FOUND_STATUS: i32 = 40004;

type PolicyFn = dyn Fn(&KeyAttributes) -> bool + Send + Sync;

/// Key service holding its keys in a concurrent map
#[derive(Default)]
pub struct MemoryKeyService {
    keys: DashMap<String, ServiceKey>,
    deny: Option<Box<PolicyFn>>,
    creates: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryKeyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny any create or get whose key attributes match `deny`
    pub fn with_deny_policy<F>(mut self, deny: F) -> Self
    where
        F: Fn(&KeyAttributes) -> bool + Send + Sync + 'static,
    {
        self.deny = Some(Box::new(deny));
        self
    }

    /// Number of `create_key` calls received, including denied ones
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `get_key` calls received, including failed ones
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of keys issued
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Attributes of an issued key, without counting as a fetch
    pub fn attributes_of(&self, id: &str) -> Option<KeyAttributes> {
        self.keys.get(id).map(|k| k.attributes.clone())
    }

    fn denied(&self, attributes: &KeyAttributes) -> bool {
        self.deny.as_ref().is_some_and(|deny| deny(attributes))
    }

    fn generate_id(&self) -> String {
        loop {
            let id: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(KEY_ID_LEN)
                .map(char::from)
                .collect();
            if !self.keys.contains_key(&id) {
                return id;
            }
        }
    }
}

#[async_trait]
impl KeyService for MemoryKeyService {
    async fn create_key(&self, request: &KeyParams) -> Result<ServiceKey> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        if self.denied(&request.attributes) {
            return Err(Error::key_service(
                POLICY_DENIED_STATUS,
                "create request matched a deny policy",
            ));
        }

        let mut secret = vec![0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut secret);

        let key = ServiceKey {
            id: self.generate_id(),
            secret: SecretBytes::new(secret),
            attributes: request.attributes.clone(),
            mutable_attributes: request.mutable_attributes.clone(),
        };

        debug!("Issued in-memory key {}", key.id);
        self.keys.insert(key.id.clone(), key.clone());
        Ok(key)
    }

    async fn get_key(&self, id: &str) -> Result<ServiceKey> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        let key = self
            .keys
            .get(id)
            .map(|k| k.value().clone())
            .ok_or_else(|| Error::key_service(KEY_NOT_FOUND_STATUS, format!("key {} not found", id)))?;

        if self.denied(&key.attributes) {
            return Err(Error::key_service(
                POLICY_DENIED_STATUS,
                "get request matched a deny policy",
            ));
        }

        Ok(key)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyService")
            .field("keys", &self.keys.len())
            .field("deny_policy", &self.deny.is_some())
            .finish()
    }
}
