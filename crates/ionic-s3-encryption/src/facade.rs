//! Public store client with per-request key attributes
//!
//! The facade is the only place that talks to both the correlator and the
//! response-key cache: writes park their [`KeyParams`] under a token placed in
//! the materials description, reads hand back the key service response that
//! the provider cached while decrypting.

use crate::client::EncryptionClient;
use crate::crypto::META_MATDESC;
use crate::provider::IonicEncryptionMaterialsProvider;
use crate::requests::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, GetObjectRequest,
    InitiateMultipartUploadRequest, InitiateMultipartUploadResult, PutBody, PutObjectRequest,
    UploadPartRequest,
};
use crate::store::{CompletedPart, ObjectMetadata, ObjectStore, PutObjectResult, S3Object, S3ObjectStore};
use bytes::Bytes;
use ionic_s3_core::types::REQUEST_TOKEN_KEY;
use ionic_s3_core::{KeyParams, MaterialsDescription, Result, ServiceKey};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Content type used by [`IonicS3EncryptionClient::put_string`]
const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Prefix of the encryption client's own metadata entries
const ENVELOPE_PREFIX: &str = "x-amz-";

/// A decrypted object plus the key service response that protected it
#[derive(Debug, Clone)]
pub struct IonicKeyObjectPair {
    pub object: S3Object,
    /// `None` for objects that are not key-service encrypted, or when the
    /// cached response was already handed out
    pub key: Option<ServiceKey>,
}

/// Metadata of an object written to disk plus its key service response
#[derive(Debug, Clone)]
pub struct IonicKeyObjectMetadataPair {
    pub metadata: ObjectMetadata,
    pub key: Option<ServiceKey>,
}

/// S3 encryption client whose keys come from the key service
pub struct IonicS3EncryptionClient<S = S3ObjectStore> {
    inner: EncryptionClient<S>,
    provider: Arc<IonicEncryptionMaterialsProvider>,
}

impl<S: ObjectStore> IonicS3EncryptionClient<S> {
    /// Wrap an encryption client already wired to `provider`
    pub fn new(inner: EncryptionClient<S>, provider: Arc<IonicEncryptionMaterialsProvider>) -> Self {
        Self { inner, provider }
    }

    pub fn provider(&self) -> &Arc<IonicEncryptionMaterialsProvider> {
        &self.provider
    }

    pub fn encryption_client(&self) -> &EncryptionClient<S> {
        &self.inner
    }

    /// Upload with the provider's default attributes only
    pub async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectResult> {
        self.put_object_with_key(request, KeyParams::default()).await
    }

    /// Upload, creating the object's key with `key` attributes on top of the defaults
    ///
    /// A request with neither a body nor a materials description is stored
    /// unencrypted.
    pub async fn put_object_with_key(
        &self,
        mut request: PutObjectRequest,
        key: KeyParams,
    ) -> Result<PutObjectResult> {
        if request.body.is_none() && request.materials_description.is_none() {
            debug!(
                "No body for s3://{}/{}, storing unencrypted",
                request.bucket, request.key
            );
            return self.inner.put_object_plain(request).await;
        }

        request.materials_description = Some(self.seed_description(&request.metadata, key));
        self.inner.put_object(request).await
    }

    /// Upload a string as `text/plain`
    pub async fn put_string(
        &self,
        bucket: &str,
        key: &str,
        content: &str,
        key_params: KeyParams,
    ) -> Result<PutObjectResult> {
        let request = PutObjectRequest::new(bucket, key)
            .with_body(Bytes::from(content.to_string()))
            .with_metadata(ObjectMetadata::new().with_content_type(TEXT_CONTENT_TYPE));
        self.put_object_with_key(request, key_params).await
    }

    /// Upload the contents of a local file
    pub async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
        key_params: KeyParams,
    ) -> Result<PutObjectResult> {
        let request =
            PutObjectRequest::new(bucket, key).with_body(PutBody::File(path.as_ref().to_path_buf()));
        self.put_object_with_key(request, key_params).await
    }

    /// Download and decrypt an object, discarding its key service response
    pub async fn get_object(&self, request: GetObjectRequest) -> Result<S3Object> {
        Ok(self.get_object_and_key(request).await?.object)
    }

    /// Download and decrypt an object, returning the key service response too
    pub async fn get_object_and_key(&self, request: GetObjectRequest) -> Result<IonicKeyObjectPair> {
        let object = self.inner.get_object(request).await?;
        let key = key_id_of(&object.metadata).and_then(|id| self.provider.take_response_key(&id));
        Ok(IonicKeyObjectPair { object, key })
    }

    /// Download and decrypt an object into `destination`
    pub async fn get_object_to_file(
        &self,
        request: GetObjectRequest,
        destination: impl AsRef<Path>,
    ) -> Result<ObjectMetadata> {
        Ok(self
            .get_object_to_file_and_key(request, destination)
            .await?
            .metadata)
    }

    pub async fn get_object_to_file_and_key(
        &self,
        request: GetObjectRequest,
        destination: impl AsRef<Path>,
    ) -> Result<IonicKeyObjectMetadataPair> {
        let IonicKeyObjectPair { object, key } = self.get_object_and_key(request).await?;
        tokio::fs::write(destination.as_ref(), &object.body).await?;
        debug!(
            "Wrote {} bytes to {}",
            object.body.len(),
            destination.as_ref().display()
        );

        Ok(IonicKeyObjectMetadataPair {
            metadata: object.metadata,
            key,
        })
    }

    /// Start a multipart upload with the provider's default attributes only
    pub async fn initiate_multipart_upload(
        &self,
        request: InitiateMultipartUploadRequest,
    ) -> Result<InitiateMultipartUploadResult> {
        self.initiate_multipart_upload_with_key(request, KeyParams::default())
            .await
    }

    /// Start a multipart upload; the key is created here, once for all parts
    pub async fn initiate_multipart_upload_with_key(
        &self,
        mut request: InitiateMultipartUploadRequest,
        key: KeyParams,
    ) -> Result<InitiateMultipartUploadResult> {
        request.materials_description = Some(self.seed_description(&request.metadata, key));
        self.inner.initiate_multipart_upload(request).await
    }

    pub async fn upload_part(&self, request: UploadPartRequest) -> Result<CompletedPart> {
        self.inner.upload_part(request).await
    }

    pub async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest,
    ) -> Result<PutObjectResult> {
        self.inner.complete_multipart_upload(request).await
    }

    pub async fn abort_multipart_upload(&self, request: AbortMultipartUploadRequest) -> Result<()> {
        self.inner.abort_multipart_upload(request).await
    }

    fn seed_description(&self, metadata: &ObjectMetadata, key: KeyParams) -> MaterialsDescription {
        let mut description = MaterialsDescription::new();
        if self.provider.is_metadata_capture_enabled() {
            description.extend(metadata.user_metadata.iter().filter(|(name, _)| {
                !MaterialsDescription::is_reserved(name) && !name.starts_with(ENVELOPE_PREFIX)
            }));
        }
        description.insert(REQUEST_TOKEN_KEY, self.provider.store_request_key(key));
        description
    }
}

/// Key id recorded in an object's stored materials description
///
/// Unreadable descriptions are logged and treated as "no key".
fn key_id_of(metadata: &ObjectMetadata) -> Option<String> {
    let json = metadata.user(META_MATDESC)?;
    match MaterialsDescription::from_json(json) {
        Ok(description) => description.key_id().map(str::to_string),
        Err(e) => {
            warn!("Could not read key id from materials description: {}", e);
            None
        }
    }
}

impl<S> std::fmt::Debug for IonicS3EncryptionClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IonicS3EncryptionClient")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
