//! Key service trait and implementations
//!
//! The key service issues symmetric keys bound to attribute sets and returns
//! them later by id. Failures carry the service's numeric status code; status
//! `40024` is mapped to [`Error::PolicyDenied`](crate::Error::PolicyDenied).

pub mod http;
pub mod memory;

use crate::error::Result;
use crate::types::{KeyParams, ServiceKey};
use async_trait::async_trait;

/// Remote key management service
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Create a new key bound to the request's attributes and mutable attributes
    async fn create_key(&self, request: &KeyParams) -> Result<ServiceKey>;

    /// Fetch an existing key by id
    async fn get_key(&self, id: &str) -> Result<ServiceKey>;

    /// Service name for log messages
    fn name(&self) -> &'static str;
}

pub use http::HttpKeyService;
pub use memory::MemoryKeyService;
