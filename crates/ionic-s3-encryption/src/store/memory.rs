//! In-process object store
//!
//! Error codes mirror the S3 ones (`NoSuchBucket` is never raised; every
//! bucket exists).

use super::{CompletedPart, ObjectMetadata, ObjectStore, PutObjectResult, S3Object};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use ionic_s3_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    metadata: ObjectMetadata,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    metadata: ObjectMetadata,
    parts: BTreeMap<i32, Bytes>,
}

/// Object store holding objects in a concurrent map
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), StoredObject>,
    uploads: DashMap<String, PendingUpload>,
    sequence: AtomicU64,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored body and metadata exactly as written, without decryption
    pub fn raw_object(&self, bucket: &str, key: &str) -> Option<(Bytes, ObjectMetadata)> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| (o.body.clone(), o.metadata.clone()))
    }

    /// Overwrite a stored body, keeping its metadata
    pub fn replace_body(&self, bucket: &str, key: &str, body: Bytes) -> bool {
        match self.objects.get_mut(&(bucket.to_string(), key.to_string())) {
            Some(mut object) => {
                object.body = body;
                true
            }
            None => false,
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Multipart uploads neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn no_such_upload(upload_id: &str) -> Error {
        Error::store(
            Some("NoSuchUpload".to_string()),
            format!("upload {} does not exist", upload_id),
        )
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<PutObjectResult> {
        let etag = format!("\"{}\"", self.next_id());
        let mut metadata = metadata.clone();
        metadata.content_length = Some(body.len() as u64);

        self.objects
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, metadata });

        Ok(PutObjectResult {
            etag: Some(etag),
            version_id: None,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<S3Object> {
        let object = self
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.value().clone())
            .ok_or_else(|| {
                Error::store(
                    Some("NoSuchKey".to_string()),
                    "The specified key does not exist.",
                )
            })?;

        Ok(S3Object {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: object.body,
            metadata: object.metadata,
        })
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String> {
        let upload_id = format!("upload-{}", self.next_id());
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let mut upload = self
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;
        upload.parts.insert(part_number, body);

        Ok(CompletedPart {
            part_number,
            etag: format!("\"{}-{}\"", upload_id, part_number),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<PutObjectResult> {
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(Error::store(
                Some("InvalidPartOrder".to_string()),
                "The list of parts was not in ascending order.",
            ));
        }

        let (_, upload) = self
            .uploads
            .remove(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;
        if upload.bucket != bucket || upload.key != key {
            return Err(Self::no_such_upload(upload_id));
        }

        let mut body = BytesMut::new();
        for part in parts {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                Error::store(
                    Some("InvalidPart".to_string()),
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            body.extend_from_slice(data);
        }

        self.put_object(bucket, key, body.freeze(), &upload.metadata).await
    }

    async fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        self.uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| Self::no_such_upload(upload_id))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryObjectStore::new();
        let metadata = ObjectMetadata::new()
            .with_content_type("text/plain")
            .with_user_metadata("owner", "alice");

        store
            .put_object("bucket", "a.txt", Bytes::from_static(b"hello"), &metadata)
            .await
            .unwrap();

        let object = store.get_object("bucket", "a.txt").await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"hello"));
        assert_eq!(object.metadata.user("owner"), Some("alice"));
        assert_eq!(object.metadata.content_length, Some(5));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = MemoryObjectStore::new();
        let err = store.get_object("bucket", "missing").await.unwrap_err();
        assert_eq!(err.store_code(), Some("NoSuchKey"));
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_part_order() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart_upload("bucket", "big", &ObjectMetadata::new())
            .await
            .unwrap();

        let second = store
            .upload_part("bucket", "big", &upload_id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let first = store
            .upload_part("bucket", "big", &upload_id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();

        store
            .complete_multipart_upload("bucket", "big", &upload_id, &[first, second])
            .await
            .unwrap();

        let object = store.get_object("bucket", "big").await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"hello world"));
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_complete_rejects_unordered_parts() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart_upload("bucket", "big", &ObjectMetadata::new())
            .await
            .unwrap();
        let parts = vec![
            CompletedPart {
                part_number: 2,
                etag: String::new(),
            },
            CompletedPart {
                part_number: 1,
                etag: String::new(),
            },
        ];

        let err = store
            .complete_multipart_upload("bucket", "big", &upload_id, &parts)
            .await
            .unwrap_err();
        assert_eq!(err.store_code(), Some("InvalidPartOrder"));
    }

    #[tokio::test]
    async fn test_abort_unknown_upload() {
        let store = MemoryObjectStore::new();
        let err = store
            .abort_multipart_upload("bucket", "big", "nope")
            .await
            .unwrap_err();
        assert_eq!(err.store_code(), Some("NoSuchUpload"));
    }
}
