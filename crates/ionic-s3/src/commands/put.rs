//! Single-request upload commands

use crate::cli::{PutFileArgs, PutStringArgs};
use crate::output;
use anyhow::{Context, Result};
use camino::Utf8Path;

use super::load_client;

pub async fn put_string(args: PutStringArgs, config: Option<&Utf8Path>) -> Result<()> {
    let client = load_client(config).await?;

    let spinner = output::spinner("Encrypting and uploading...");
    let result = client
        .put_string(&args.bucket, &args.key, &args.content, args.key_args.key_params())
        .await;
    spinner.finish_and_clear();
    let result = result.with_context(|| format!("Failed to upload s3://{}/{}", args.bucket, args.key))?;

    output::success(&format!("Uploaded s3://{}/{}", args.bucket, args.key));
    if let Some(etag) = result.etag {
        output::kv("ETag", &etag);
    }
    Ok(())
}

pub async fn put_file(args: PutFileArgs, config: Option<&Utf8Path>) -> Result<()> {
    let size = tokio::fs::metadata(&args.path)
        .await
        .with_context(|| format!("Cannot read {}", args.path.display()))?
        .len();

    let client = load_client(config).await?;

    let spinner = output::spinner("Encrypting and uploading...");
    let result = client
        .put_file(&args.bucket, &args.key, &args.path, args.key_args.key_params())
        .await;
    spinner.finish_and_clear();
    let result = result.with_context(|| format!("Failed to upload s3://{}/{}", args.bucket, args.key))?;

    output::success(&format!(
        "Uploaded {} to s3://{}/{}",
        args.path.display(),
        args.bucket,
        args.key
    ));
    output::kv("Size", &format!("{} bytes", size));
    if let Some(etag) = result.etag {
        output::kv("ETag", &etag);
    }
    Ok(())
}
