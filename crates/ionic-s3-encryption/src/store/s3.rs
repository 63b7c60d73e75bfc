//! AWS S3 object store
//!
//! Supports AWS S3 and S3-compatible storage (MinIO, Wasabi, DigitalOcean
//! Spaces) through a custom endpoint.

use super::{CompletedPart, ObjectMetadata, ObjectStore, PutObjectResult, S3Object};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use ionic_s3_core::config::S3Config;
use ionic_s3_core::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Object store backed by the AWS SDK S3 client
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a store from the `s3` config section, using the default AWS
    /// credential chain
    pub async fn new(config: &S3Config) -> Self {
        let region = Region::new(config.region.clone());

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = config.endpoint.as_deref() {
            debug!("Using custom S3 endpoint: {}", endpoint_url);
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn store_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    Error::store(code, message)
}

fn user_metadata(metadata: Option<&HashMap<String, String>>) -> std::collections::BTreeMap<String, String> {
    metadata
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn sdk_metadata(metadata: &ObjectMetadata) -> Option<HashMap<String, String>> {
    if metadata.user_metadata.is_empty() {
        None
    } else {
        Some(metadata.user_metadata.clone().into_iter().collect())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<PutObjectResult> {
        debug!("Uploading {} bytes to s3://{}/{}", body.len(), bucket, key);

        let resp = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(body.len() as i64)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(sdk_metadata(metadata))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(store_error)?;

        Ok(PutObjectResult {
            etag: resp.e_tag().map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<S3Object> {
        debug!("Downloading s3://{}/{}", bucket, key);

        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(store_error)?;

        let metadata = ObjectMetadata {
            content_type: resp.content_type().map(str::to_string),
            content_length: resp.content_length().and_then(|l| u64::try_from(l).ok()),
            user_metadata: user_metadata(resp.metadata()),
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::store(None, format!("failed to read response body: {}", e)))?
            .into_bytes();

        Ok(S3Object {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
            metadata,
        })
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(sdk_metadata(metadata))
            .send()
            .await
            .map_err(store_error)?;

        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::store(None, "create multipart upload returned no upload id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        debug!(
            "Uploading part {} ({} bytes) of s3://{}/{}",
            part_number,
            body.len(),
            bucket,
            key
        );

        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(store_error)?;

        Ok(CompletedPart {
            part_number,
            etag: resp.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<PutObjectResult> {
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        S3CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(store_error)?;

        Ok(PutObjectResult {
            etag: resp.e_tag().map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
