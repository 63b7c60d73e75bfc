//! Key-service backed S3 client-side encryption
//!
//! Objects are encrypted with a per-object content key that is itself sealed
//! under a key issued by the remote key service. The key id travels with the
//! object as a JSON materials description in the `x-amz-matdesc` metadata
//! field, so any reader with access to the key service can decrypt it.
//!
//! ## Architecture
//!
//! - [`IonicS3EncryptionClient`] is the public facade. It seeds each write
//!   with a correlator token and resolves the key behind each read.
//! - [`EncryptionClient`] performs envelope encryption over an
//!   [`ObjectStore`], calling a [`MaterialsProvider`] as its key hook.
//! - [`IonicEncryptionMaterialsProvider`] decides per call whether to create
//!   a key (no key id in the description) or fetch one (key id present).
//!
//! ## Usage
//!
//! ```ignore
//! use ionic_s3_encryption::{IonicS3EncryptionClientBuilder, PutObjectRequest};
//!
//! let s3 = IonicS3EncryptionClientBuilder::default_client(&config).await?;
//! s3.put_string("bucket", "hello.txt", "Hello, world", KeyParams::new()).await?;
//! let pair = s3.get_object_and_key(GetObjectRequest::new("bucket", "hello.txt")).await?;
//! ```

pub mod builder;
pub mod cache;
pub mod client;
pub mod correlator;
pub mod crypto;
pub mod facade;
pub mod materials;
pub mod provider;
pub mod requests;
pub mod store;

pub use builder::IonicS3EncryptionClientBuilder;
pub use cache::ResponseKeyCache;
pub use client::EncryptionClient;
pub use correlator::PendingRequestCorrelator;
pub use facade::{IonicKeyObjectMetadataPair, IonicKeyObjectPair, IonicS3EncryptionClient};
pub use materials::{EncryptionMaterials, MaterialsProvider};
pub use provider::IonicEncryptionMaterialsProvider;
pub use requests::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, GetObjectRequest,
    InitiateMultipartUploadRequest, InitiateMultipartUploadResult, PartBody, PutBody,
    PutObjectRequest, UploadPartRequest,
};
pub use store::{
    CompletedPart, MemoryObjectStore, ObjectMetadata, ObjectStore, PutObjectResult, S3Object,
    S3ObjectStore,
};

pub use ionic_s3_core::{Error, KeyAttributes, KeyParams, MaterialsDescription, Result, ServiceKey};
