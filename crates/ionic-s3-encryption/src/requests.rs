//! Object store request and result types

use crate::store::ObjectMetadata;
use bytes::Bytes;
use ionic_s3_core::{MaterialsDescription, Result};
use std::path::PathBuf;

/// Source of an object body
#[derive(Debug, Clone)]
pub enum PutBody {
    Bytes(Bytes),
    File(PathBuf),
}

impl PutBody {
    /// Load the full body into memory
    pub async fn load(&self) -> Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

impl From<Bytes> for PutBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for PutBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<PathBuf> for PutBody {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Upload a single object
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    /// `None` for a request without a body (e.g. a redirect-only object)
    pub body: Option<PutBody>,
    pub metadata: ObjectMetadata,
    /// Description handed to the materials provider on the encrypted path
    pub materials_description: Option<MaterialsDescription>,
}

impl PutObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body: None,
            metadata: ObjectMetadata::default(),
            materials_description: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<PutBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ObjectMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_materials_description(mut self, description: MaterialsDescription) -> Self {
        self.materials_description = Some(description);
        self
    }
}

/// Download a single object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
}

impl GetObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Start an encrypted multipart upload
#[derive(Debug, Clone)]
pub struct InitiateMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub metadata: ObjectMetadata,
    pub materials_description: Option<MaterialsDescription>,
}

impl InitiateMultipartUploadRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            metadata: ObjectMetadata::default(),
            materials_description: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ObjectMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_materials_description(mut self, description: MaterialsDescription) -> Self {
        self.materials_description = Some(description);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateMultipartUploadResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// Source of a single part body
#[derive(Debug, Clone)]
pub enum PartBody {
    Bytes(Bytes),
    /// A byte range of a local file
    File {
        path: PathBuf,
        offset: u64,
        size: u64,
    },
}

impl PartBody {
    /// Load the part into memory
    pub async fn load(&self) -> Result<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File { path, offset, size } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(*offset)).await?;
                let mut buf = Vec::with_capacity(usize::try_from(*size).unwrap_or_default());
                file.take(*size).read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Upload one part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadPartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    /// 1-based part number
    pub part_number: i32,
    pub body: PartBody,
    /// Final part of the upload; exactly one part must carry it
    pub last_part: bool,
}

impl UploadPartRequest {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        part_number: i32,
        body: PartBody,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            part_number,
            body,
            last_part: false,
        }
    }

    pub fn with_last_part(mut self, last_part: bool) -> Self {
        self.last_part = last_part;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<crate::store::CompletedPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_part_body_file_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        let part = PartBody::File {
            path: file.path().to_path_buf(),
            offset: 3,
            size: 4,
        };
        assert_eq!(part.load().await.unwrap(), Bytes::from_static(b"3456"));

        let tail = PartBody::File {
            path: file.path().to_path_buf(),
            offset: 8,
            size: 10,
        };
        assert_eq!(tail.load().await.unwrap(), Bytes::from_static(b"89"));
    }

    #[tokio::test]
    async fn test_put_body_missing_file() {
        let body = PutBody::File(PathBuf::from("/nonexistent/ionic-s3/body"));
        assert!(body.load().await.is_err());
    }
}
