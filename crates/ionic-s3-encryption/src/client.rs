//! Envelope encryption over an object store
//!
//! Every encrypted write asks the [`MaterialsProvider`] for a key-encryption
//! key exactly once (once per upload for multipart) and every encrypted read
//! asks it once with the description stored on the object. Objects without a
//! wrapped key are returned untouched.
//!
//! A multipart upload must number its parts 1, 2, 3 ... and flag the final
//! part with [`UploadPartRequest::last_part`]; completion checks both before
//! the store assembles the object.

use crate::crypto::{
    ContentKey, CEK_ALGORITHM, META_CEK_ALG, META_IV, META_KEY, META_MATDESC, META_PLAINTEXT_LEN,
    META_TAG_LEN, META_WRAP_ALG, TAG_LENGTH_BITS, WRAP_ALGORITHM,
};
use crate::materials::{EncryptionMaterials, MaterialsProvider};
use crate::requests::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, GetObjectRequest,
    InitiateMultipartUploadRequest, InitiateMultipartUploadResult, PutObjectRequest,
    UploadPartRequest,
};
use crate::store::{CompletedPart, ObjectMetadata, ObjectStore, PutObjectResult, S3Object};
use bytes::Bytes;
use dashmap::DashMap;
use ionic_s3_core::config::CryptoConfig;
use ionic_s3_core::{Error, MaterialsDescription, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Highest part number S3 accepts
pub const MAX_PART_NUMBER: i32 = 10_000;

/// In-flight encrypted multipart upload
struct UploadState {
    bucket: String,
    key: String,
    content_key: Arc<ContentKey>,
    last_part: Option<i32>,
}

impl UploadState {
    fn check_target(&self, upload_id: &str, bucket: &str, key: &str) -> Result<()> {
        if self.bucket != bucket || self.key != key {
            return Err(Error::invalid_argument(format!(
                "upload {} belongs to s3://{}/{}, not s3://{}/{}",
                upload_id, self.bucket, self.key, bucket, key
            )));
        }
        Ok(())
    }
}

/// Client-side encrypting wrapper around an [`ObjectStore`]
pub struct EncryptionClient<S> {
    store: Arc<S>,
    provider: Arc<dyn MaterialsProvider>,
    crypto: CryptoConfig,
    uploads: DashMap<String, UploadState>,
}

impl<S: ObjectStore> EncryptionClient<S> {
    pub fn new(store: Arc<S>, provider: Arc<dyn MaterialsProvider>, crypto: CryptoConfig) -> Self {
        Self {
            store,
            provider,
            crypto,
            uploads: DashMap::new(),
        }
    }

    /// Underlying object store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn MaterialsProvider> {
        &self.provider
    }

    /// Encrypt and upload a single object
    pub async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectResult> {
        let plaintext = match &request.body {
            Some(body) => body.load().await?,
            None => Bytes::new(),
        };

        let materials = self
            .provider
            .encryption_materials(request.materials_description.as_ref())
            .await?;
        let content_key = ContentKey::generate();
        let sealed = content_key.seal_segment(0, true, &plaintext, self.crypto.chunk_size)?;

        let mut metadata = envelope_metadata(&request.metadata, &content_key, &materials)?;
        metadata
            .user_metadata
            .insert(META_PLAINTEXT_LEN.to_string(), plaintext.len().to_string());

        debug!(
            "Encrypted {} bytes for s3://{}/{}",
            plaintext.len(),
            request.bucket,
            request.key
        );
        self.store
            .put_object(&request.bucket, &request.key, Bytes::from(sealed), &metadata)
            .await
    }

    /// Upload a single object without encryption
    pub async fn put_object_plain(&self, request: PutObjectRequest) -> Result<PutObjectResult> {
        let body = match &request.body {
            Some(body) => body.load().await?,
            None => Bytes::new(),
        };
        self.store
            .put_object(&request.bucket, &request.key, body, &request.metadata)
            .await
    }

    /// Download an object, decrypting it when it carries a wrapped content key
    pub async fn get_object(&self, request: GetObjectRequest) -> Result<S3Object> {
        let mut object = self.store.get_object(&request.bucket, &request.key).await?;

        let Some(wrapped) = object.metadata.user(META_KEY).map(str::to_string) else {
            debug!("s3://{}/{} is not encrypted", request.bucket, request.key);
            return Ok(object);
        };

        let description = object
            .metadata
            .user(META_MATDESC)
            .ok_or_else(|| Error::crypto(format!("object has {} but no {}", META_KEY, META_MATDESC)))
            .and_then(|json| {
                MaterialsDescription::from_json(json)
                    .map_err(|e| Error::crypto(format!("invalid materials description: {}", e)))
            })?;
        let iv = object
            .metadata
            .user(META_IV)
            .ok_or_else(|| Error::crypto(format!("object has {} but no {}", META_KEY, META_IV)))?;
        let expected_len = object
            .metadata
            .user(META_PLAINTEXT_LEN)
            .map(|len| {
                len.parse::<u64>()
                    .map_err(|_| Error::crypto(format!("invalid {}: {}", META_PLAINTEXT_LEN, len)))
            })
            .transpose()?;

        let materials = self.provider.encryption_materials(Some(&description)).await?;
        let content_key = ContentKey::unwrap(materials.key.as_bytes(), &wrapped, iv)?;
        let plaintext = content_key.open_body(&object.body, expected_len)?;

        debug!(
            "Decrypted {} bytes from s3://{}/{}",
            plaintext.len(),
            request.bucket,
            request.key
        );
        object.metadata.content_length = Some(plaintext.len() as u64);
        object.body = Bytes::from(plaintext);
        Ok(object)
    }

    /// Start an encrypted multipart upload; all parts share one content key
    pub async fn initiate_multipart_upload(
        &self,
        request: InitiateMultipartUploadRequest,
    ) -> Result<InitiateMultipartUploadResult> {
        let materials = self
            .provider
            .encryption_materials(request.materials_description.as_ref())
            .await?;
        let content_key = ContentKey::generate();
        let metadata = envelope_metadata(&request.metadata, &content_key, &materials)?;

        let upload_id = self
            .store
            .create_multipart_upload(&request.bucket, &request.key, &metadata)
            .await?;
        self.uploads.insert(
            upload_id.clone(),
            UploadState {
                bucket: request.bucket.clone(),
                key: request.key.clone(),
                content_key: Arc::new(content_key),
                last_part: None,
            },
        );

        info!(
            "Started encrypted multipart upload {} for s3://{}/{}",
            upload_id, request.bucket, request.key
        );
        Ok(InitiateMultipartUploadResult {
            bucket: request.bucket,
            key: request.key,
            upload_id,
        })
    }

    /// Encrypt and upload one part
    pub async fn upload_part(&self, request: UploadPartRequest) -> Result<CompletedPart> {
        if !(1..=MAX_PART_NUMBER).contains(&request.part_number) {
            return Err(Error::invalid_argument(format!(
                "part number {} is outside 1..={}",
                request.part_number, MAX_PART_NUMBER
            )));
        }

        let content_key = {
            let state = self.upload_state(&request.upload_id)?;
            state.check_target(&request.upload_id, &request.bucket, &request.key)?;
            if let Some(last) = state.last_part {
                if request.last_part && last != request.part_number {
                    return Err(Error::invalid_argument(format!(
                        "part {} is already the last part of upload {}",
                        last, request.upload_id
                    )));
                }
                if request.part_number > last {
                    return Err(Error::invalid_argument(format!(
                        "part {} comes after the last part {} of upload {}",
                        request.part_number, last, request.upload_id
                    )));
                }
            }
            Arc::clone(&state.content_key)
        };

        let plaintext = request.body.load().await?;
        // part_number is in 1..=10000 here
        let sealed = content_key.seal_segment(
            request.part_number as u32,
            request.last_part,
            &plaintext,
            self.crypto.chunk_size,
        )?;

        let part = self
            .store
            .upload_part(
                &request.bucket,
                &request.key,
                &request.upload_id,
                request.part_number,
                Bytes::from(sealed),
            )
            .await?;

        if request.last_part {
            if let Some(mut state) = self.uploads.get_mut(&request.upload_id) {
                state.last_part = Some(request.part_number);
            }
        }
        Ok(part)
    }

    /// Complete an upload; its content key is released once the store accepts it
    pub async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest,
    ) -> Result<PutObjectResult> {
        {
            let state = self.upload_state(&request.upload_id)?;
            state.check_target(&request.upload_id, &request.bucket, &request.key)?;
            let last = state.last_part.ok_or_else(|| {
                Error::invalid_argument(format!(
                    "upload {} has no part flagged as the last part",
                    request.upload_id
                ))
            })?;
            if !request.parts.iter().map(|p| p.part_number).eq(1..=last) {
                return Err(Error::invalid_argument(format!(
                    "upload {} must complete with parts 1..={} in order",
                    request.upload_id, last
                )));
            }
        }

        let result = self
            .store
            .complete_multipart_upload(&request.bucket, &request.key, &request.upload_id, &request.parts)
            .await?;
        self.uploads.remove(&request.upload_id);

        info!(
            "Completed multipart upload {} ({} parts)",
            request.upload_id,
            request.parts.len()
        );
        Ok(result)
    }

    pub async fn abort_multipart_upload(&self, request: AbortMultipartUploadRequest) -> Result<()> {
        self.uploads.remove(&request.upload_id);
        self.store
            .abort_multipart_upload(&request.bucket, &request.key, &request.upload_id)
            .await
    }

    /// Multipart uploads with a live content key
    pub fn active_uploads(&self) -> usize {
        self.uploads.len()
    }

    fn upload_state(
        &self,
        upload_id: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, UploadState>> {
        self.uploads.get(upload_id).ok_or_else(|| {
            Error::invalid_argument(format!("no encrypted multipart upload with id {}", upload_id))
        })
    }
}

fn envelope_metadata(
    base: &ObjectMetadata,
    content_key: &ContentKey,
    materials: &EncryptionMaterials,
) -> Result<ObjectMetadata> {
    let mut metadata = base.clone();
    metadata.content_length = None;

    let user = &mut metadata.user_metadata;
    user.insert(META_KEY.to_string(), content_key.wrap(materials.key.as_bytes())?);
    user.insert(META_IV.to_string(), content_key.iv_base64());
    user.insert(META_MATDESC.to_string(), materials.description.to_json()?);
    user.insert(META_CEK_ALG.to_string(), CEK_ALGORITHM.to_string());
    user.insert(META_WRAP_ALG.to_string(), WRAP_ALGORITHM.to_string());
    user.insert(META_TAG_LEN.to_string(), TAG_LENGTH_BITS.to_string());
    Ok(metadata)
}

impl<S> std::fmt::Debug for EncryptionClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionClient")
            .field("crypto", &self.crypto)
            .field("active_uploads", &self.uploads.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::PartBody;
    use crate::store::MemoryObjectStore;
    use async_trait::async_trait;
    use ionic_s3_core::SecretBytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out one fixed key and counts calls
    #[derive(Default)]
    struct FixedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MaterialsProvider for FixedProvider {
        async fn encryption_materials(
            &self,
            _description: Option<&MaterialsDescription>,
        ) -> Result<EncryptionMaterials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EncryptionMaterials::new(
                SecretBytes::new(vec![5; 32]),
                MaterialsDescription::new().with("key-id", "fixed"),
            ))
        }
    }

    fn client(chunk_size: usize) -> (Arc<MemoryObjectStore>, Arc<FixedProvider>, EncryptionClient<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let provider = Arc::new(FixedProvider::default());
        let client = EncryptionClient::new(store.clone(), provider.clone(), CryptoConfig { chunk_size });
        (store, provider, client)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (store, provider, client) = client(8);
        let request = PutObjectRequest::new("b", "k").with_body(b"attack at dawn, bring snacks".to_vec());
        client.put_object(request).await.unwrap();

        let (raw, metadata) = store.raw_object("b", "k").unwrap();
        assert!(!raw.windows(6).any(|w| w == b"attack"));
        assert_eq!(metadata.user(META_MATDESC), Some(r#"{"key-id":"fixed"}"#));
        assert_eq!(metadata.user(META_CEK_ALG), Some(CEK_ALGORITHM));
        assert_eq!(metadata.user(META_PLAINTEXT_LEN), Some("28"));

        let object = client.get_object(GetObjectRequest::new("b", "k")).await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"attack at dawn, bring snacks"));
        assert_eq!(object.metadata.content_length, Some(28));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_plain_object_passes_through() {
        let (_store, provider, client) = client(8);
        client
            .put_object_plain(PutObjectRequest::new("b", "plain").with_body(b"visible".to_vec()))
            .await
            .unwrap();

        let object = client.get_object(GetObjectRequest::new("b", "plain")).await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"visible"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_description_is_rejected() {
        let (store, _provider, client) = client(8);
        client
            .put_object(PutObjectRequest::new("b", "k").with_body(b"data".to_vec()))
            .await
            .unwrap();

        let (body, mut metadata) = store.raw_object("b", "k").unwrap();
        metadata.user_metadata.remove(META_MATDESC);
        store.put_object("b", "k", body, &metadata).await.unwrap();

        let err = client.get_object(GetObjectRequest::new("b", "k")).await.unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let (store, _provider, client) = client(8);
        client
            .put_object(PutObjectRequest::new("b", "k").with_body(b"integrity matters".to_vec()))
            .await
            .unwrap();

        let (body, _) = store.raw_object("b", "k").unwrap();
        let mut tampered = body.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        store.replace_body("b", "k", Bytes::from(tampered));

        let err = client.get_object(GetObjectRequest::new("b", "k")).await.unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[tokio::test]
    async fn test_multipart_round_trip() {
        let (_store, provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();

        let chunks = [&b"first part "[..], b"second part ", b"third"];
        let mut parts = Vec::new();
        for (n, chunk) in chunks.iter().enumerate() {
            let part = client
                .upload_part(
                    UploadPartRequest::new(
                        "b",
                        "big",
                        &upload.upload_id,
                        n as i32 + 1,
                        PartBody::Bytes(Bytes::copy_from_slice(chunk)),
                    )
                    .with_last_part(n == chunks.len() - 1),
                )
                .await
                .unwrap();
            parts.push(part);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        client
            .complete_multipart_upload(CompleteMultipartUploadRequest {
                bucket: "b".to_string(),
                key: "big".to_string(),
                upload_id: upload.upload_id.clone(),
                parts,
            })
            .await
            .unwrap();
        assert_eq!(client.active_uploads(), 0);

        let object = client.get_object(GetObjectRequest::new("b", "big")).await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"first part second part third"));
    }

    #[tokio::test]
    async fn test_upload_part_unknown_upload() {
        let (_store, _provider, client) = client(4);
        let err = client
            .upload_part(UploadPartRequest::new("b", "k", "missing", 1, PartBody::Bytes(Bytes::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_upload_part_number_range() {
        let (_store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();

        for part_number in [0, MAX_PART_NUMBER + 1] {
            let err = client
                .upload_part(UploadPartRequest::new(
                    "b",
                    "big",
                    &upload.upload_id,
                    part_number,
                    PartBody::Bytes(Bytes::from_static(b"x")),
                ))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { .. }));
        }
    }

    #[tokio::test]
    async fn test_abort_releases_content_key() {
        let (store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();
        assert_eq!(client.active_uploads(), 1);

        client
            .abort_multipart_upload(AbortMultipartUploadRequest {
                bucket: "b".to_string(),
                key: "big".to_string(),
                upload_id: upload.upload_id,
            })
            .await
            .unwrap();
        assert_eq!(client.active_uploads(), 0);
        assert_eq!(store.pending_uploads(), 0);
    }

    fn bytes_part(upload_id: &str, number: i32, data: &'static [u8]) -> UploadPartRequest {
        UploadPartRequest::new("b", "big", upload_id, number, PartBody::Bytes(Bytes::from_static(data)))
    }

    fn complete_request(upload_id: &str, parts: Vec<CompletedPart>) -> CompleteMultipartUploadRequest {
        CompleteMultipartUploadRequest {
            bucket: "b".to_string(),
            key: "big".to_string(),
            upload_id: upload_id.to_string(),
            parts,
        }
    }

    #[tokio::test]
    async fn test_reuploaded_part_replaces_previous() {
        let (_store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();

        client.upload_part(bytes_part(&upload.upload_id, 1, b"AAAAAAAA")).await.unwrap();
        let first = client.upload_part(bytes_part(&upload.upload_id, 1, b"BBBBBBBB")).await.unwrap();
        let second = client
            .upload_part(bytes_part(&upload.upload_id, 2, b"end").with_last_part(true))
            .await
            .unwrap();
        client
            .complete_multipart_upload(complete_request(&upload.upload_id, vec![first, second]))
            .await
            .unwrap();

        let object = client.get_object(GetObjectRequest::new("b", "big")).await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"BBBBBBBBend"));
    }

    #[tokio::test]
    async fn test_complete_requires_last_part() {
        let (_store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();
        let first = client.upload_part(bytes_part(&upload.upload_id, 1, b"alpha ")).await.unwrap();

        let err = client
            .complete_multipart_upload(complete_request(&upload.upload_id, vec![first]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(client.active_uploads(), 1);
    }

    #[tokio::test]
    async fn test_complete_rejects_dropped_parts() {
        let (_store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();
        let first = client.upload_part(bytes_part(&upload.upload_id, 1, b"alpha ")).await.unwrap();
        client
            .upload_part(bytes_part(&upload.upload_id, 2, b"beta").with_last_part(true))
            .await
            .unwrap();

        let err = client
            .complete_multipart_upload(complete_request(&upload.upload_id, vec![first]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_truncated_multipart_object_is_rejected() {
        let (store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();
        let first = client.upload_part(bytes_part(&upload.upload_id, 1, b"alpha ")).await.unwrap();
        client
            .upload_part(bytes_part(&upload.upload_id, 2, b"beta").with_last_part(true))
            .await
            .unwrap();

        // assemble the object directly in the store without the final part
        store
            .complete_multipart_upload("b", "big", &upload.upload_id, &[first])
            .await
            .unwrap();

        let err = client.get_object(GetObjectRequest::new("b", "big")).await.unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[tokio::test]
    async fn test_part_after_last_part_is_rejected() {
        let (_store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();
        client
            .upload_part(bytes_part(&upload.upload_id, 2, b"beta").with_last_part(true))
            .await
            .unwrap();

        for request in [
            bytes_part(&upload.upload_id, 3, b"gamma"),
            bytes_part(&upload.upload_id, 1, b"alpha").with_last_part(true),
        ] {
            let err = client.upload_part(request).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { .. }));
        }
    }

    #[tokio::test]
    async fn test_upload_target_must_match() {
        let (_store, _provider, client) = client(4);
        let upload = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest::new("b", "big"))
            .await
            .unwrap();

        let wrong_key = UploadPartRequest::new(
            "b",
            "other",
            &upload.upload_id,
            1,
            PartBody::Bytes(Bytes::from_static(b"x")),
        );
        let err = client.upload_part(wrong_key).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let wrong_bucket = UploadPartRequest::new(
            "elsewhere",
            "big",
            &upload.upload_id,
            1,
            PartBody::Bytes(Bytes::from_static(b"x")),
        );
        let err = client.upload_part(wrong_bucket).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let mut complete = complete_request(&upload.upload_id, Vec::new());
        complete.key = "other".to_string();
        let err = client.complete_multipart_upload(complete).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }
}
