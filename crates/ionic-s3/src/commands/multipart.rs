//! Multipart upload command
//!
//! The key is created once when the upload is initiated; parts are then
//! encrypted and uploaded concurrently. Any part failure aborts the upload.

use crate::cli::{PutFileArgs, PutMultipartArgs};
use crate::output;
use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use futures::stream::{self, StreamExt};
use ionic_s3_encryption::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedPart,
    InitiateMultipartUploadRequest, IonicS3EncryptionClient, PartBody, UploadPartRequest,
};
use tracing::{debug, warn};

use super::load_client;

/// Smallest part size S3 accepts for every part but the last
const MIN_PART_SIZE_MB: u64 = 5;

/// Most parts a single upload may have
const MAX_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// One part of a file: 1-based number, byte offset and length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub number: i32,
    pub offset: u64,
    pub size: u64,
}

/// Split a file of `file_len` bytes into parts of `part_size_mb` MiB
pub fn plan_parts(file_len: u64, part_size_mb: u64) -> Result<Vec<PartRange>> {
    if part_size_mb < MIN_PART_SIZE_MB {
        bail!("Part size must be at least {} MB", MIN_PART_SIZE_MB);
    }
    if file_len == 0 {
        bail!("Cannot upload an empty file");
    }

    let part_size = part_size_mb
        .checked_mul(MIB)
        .context("Part size is too large")?;
    let count = file_len.div_ceil(part_size);
    if count > MAX_PARTS {
        bail!(
            "File needs {} parts of {} MB; the limit is {} parts, use a larger part size",
            count,
            part_size_mb,
            MAX_PARTS
        );
    }

    Ok((0..count)
        .map(|index| {
            let offset = index * part_size;
            PartRange {
                // count <= MAX_PARTS, so this fits in i32
                number: index as i32 + 1,
                offset,
                size: part_size.min(file_len - offset),
            }
        })
        .collect())
}

pub async fn run(args: PutMultipartArgs, config: Option<&Utf8Path>) -> Result<()> {
    let file_len = tokio::fs::metadata(&args.path)
        .await
        .with_context(|| format!("Cannot read {}", args.path.display()))?
        .len();
    let plan = plan_parts(file_len, args.part_size_mb)?;

    if plan.len() == 1 {
        output::info("File fits in a single part, uploading it in one request");
        let file_args = PutFileArgs {
            bucket: args.bucket,
            key: args.key,
            path: args.path,
            key_args: args.key_args,
        };
        return super::put::put_file(file_args, config).await;
    }

    let client = load_client(config).await?;
    let upload = client
        .initiate_multipart_upload_with_key(
            InitiateMultipartUploadRequest::new(&args.bucket, &args.key),
            args.key_args.key_params(),
        )
        .await
        .with_context(|| format!("Failed to start upload of s3://{}/{}", args.bucket, args.key))?;
    debug!("Upload id {}", upload.upload_id);

    let abort = AbortMultipartUploadRequest {
        bucket: args.bucket.clone(),
        key: args.key.clone(),
        upload_id: upload.upload_id.clone(),
    };

    let parts = match upload_parts(
        &client,
        &args,
        &upload.upload_id,
        &plan,
        usize::from(args.concurrency),
    )
    .await
    {
        Ok(parts) => parts,
        Err(e) => {
            abort_quietly(&client, abort).await;
            return Err(e);
        }
    };

    let complete = CompleteMultipartUploadRequest {
        bucket: args.bucket.clone(),
        key: args.key.clone(),
        upload_id: upload.upload_id.clone(),
        parts,
    };
    if let Err(e) = client.complete_multipart_upload(complete).await {
        abort_quietly(&client, abort).await;
        return Err(e).context("Failed to complete multipart upload");
    }

    output::success(&format!(
        "Uploaded {} to s3://{}/{} in {} parts",
        args.path.display(),
        args.bucket,
        args.key,
        plan.len()
    ));
    output::kv("Size", &format!("{} bytes", file_len));
    Ok(())
}

async fn upload_parts(
    client: &IonicS3EncryptionClient,
    args: &PutMultipartArgs,
    upload_id: &str,
    plan: &[PartRange],
    concurrency: usize,
) -> Result<Vec<CompletedPart>> {
    let progress = output::progress_bar(plan.len() as u64, "parts");
    let last_number = plan.last().map(|range| range.number);

    let mut uploads = stream::iter(plan.iter().copied())
        .map(|range| upload_one(client, args, upload_id, range, Some(range.number) == last_number))
        .buffer_unordered(concurrency);

    let mut parts = Vec::with_capacity(plan.len());
    while let Some(result) = uploads.next().await {
        match result {
            Ok(part) => {
                parts.push(part);
                progress.inc(1);
            }
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        }
    }
    progress.finish_and_clear();

    parts.sort_by_key(|p| p.part_number);
    Ok(parts)
}

async fn upload_one(
    client: &IonicS3EncryptionClient,
    args: &PutMultipartArgs,
    upload_id: &str,
    range: PartRange,
    last: bool,
) -> Result<CompletedPart> {
    let request = UploadPartRequest::new(
        &args.bucket,
        &args.key,
        upload_id,
        range.number,
        PartBody::File {
            path: args.path.clone(),
            offset: range.offset,
            size: range.size,
        },
    )
    .with_last_part(last);
    client
        .upload_part(request)
        .await
        .with_context(|| format!("Failed to upload part {}", range.number))
}

async fn abort_quietly(client: &IonicS3EncryptionClient, request: AbortMultipartUploadRequest) {
    let upload_id = request.upload_id.clone();
    match client.abort_multipart_upload(request).await {
        Ok(()) => output::info(&format!("Aborted upload {}", upload_id)),
        Err(e) => warn!("Failed to abort upload {}: {}", upload_id, e),
    }
}
