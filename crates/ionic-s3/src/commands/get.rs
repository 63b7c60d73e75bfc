//! Download commands

use crate::cli::{GetFileArgs, GetStringArgs};
use crate::output;
use anyhow::{Context, Result};
use camino::Utf8Path;
use ionic_s3_encryption::GetObjectRequest;

use super::load_client;

pub async fn get_string(args: GetStringArgs, config: Option<&Utf8Path>) -> Result<()> {
    let client = load_client(config).await?;

    let pair = client
        .get_object_and_key(GetObjectRequest::new(&args.bucket, &args.key))
        .await
        .with_context(|| format!("Failed to download s3://{}/{}", args.bucket, args.key))?;

    println!("{}", String::from_utf8_lossy(&pair.object.body));
    if args.show_key {
        output::key_details(pair.key.as_ref());
    }
    Ok(())
}

pub async fn get_file(args: GetFileArgs, config: Option<&Utf8Path>) -> Result<()> {
    let client = load_client(config).await?;

    let spinner = output::spinner("Downloading and decrypting...");
    let result = client
        .get_object_to_file_and_key(GetObjectRequest::new(&args.bucket, &args.key), &args.destination)
        .await;
    spinner.finish_and_clear();
    let pair = result.with_context(|| format!("Failed to download s3://{}/{}", args.bucket, args.key))?;

    output::success(&format!(
        "Saved s3://{}/{} to {}",
        args.bucket,
        args.key,
        args.destination.display()
    ));
    if let Some(len) = pair.metadata.content_length {
        output::kv("Size", &format!("{} bytes", len));
    }
    if args.show_key {
        output::key_details(pair.key.as_ref());
    }
    Ok(())
}
