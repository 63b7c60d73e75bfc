//! Object store abstraction
//!
//! The encryption client only needs single puts, gets and the multipart
//! lifecycle. [`S3ObjectStore`] talks to AWS S3 or any S3-compatible service;
//! [`MemoryObjectStore`] keeps objects in process for tests and dry runs.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use ionic_s3_core::Result;
use std::collections::BTreeMap;

/// System and user metadata stored with an object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// User metadata, without the `x-amz-meta-` prefix
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }

    pub fn user(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectResult {
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// An object as returned by the store
#[derive(Debug, Clone)]
pub struct S3Object {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub metadata: ObjectMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Minimal object store surface used by the encryption client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<PutObjectResult>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<S3Object>;

    /// Start a multipart upload and return its upload id
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<PutObjectResult>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}
