//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use ionic_s3_core::KeyAttributes;
use std::path::PathBuf;

/// ionic-s3 - S3 objects encrypted with keys from the key service
#[derive(Parser, Debug)]
#[command(name = "ionic-s3")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to config.yaml (defaults to ~/.ionic-s3/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version(VersionArgs),

    /// Encrypt and upload a string
    PutString(PutStringArgs),

    /// Encrypt and upload a file
    PutFile(PutFileArgs),

    /// Encrypt and upload a file in parts
    PutMultipart(PutMultipartArgs),

    /// Download, decrypt and print an object
    GetString(GetStringArgs),

    /// Download and decrypt an object to a file
    GetFile(GetFileArgs),
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Key attributes shared by every upload command
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Key attributes, e.g. `classification:restricted,region:us:eu`
    #[arg(short, long, value_parser = parse_attributes)]
    pub attributes: Option<KeyAttributes>,

    /// Mutable key attributes, same syntax as --attributes
    #[arg(long, value_parser = parse_attributes)]
    pub mutable_attributes: Option<KeyAttributes>,
}

#[derive(Args, Debug)]
pub struct PutStringArgs {
    /// Bucket name
    pub bucket: String,

    /// Object key
    pub key: String,

    /// Content to store
    pub content: String,

    #[command(flatten)]
    pub key_args: KeyArgs,
}

#[derive(Args, Debug)]
pub struct PutFileArgs {
    /// Bucket name
    pub bucket: String,

    /// Object key
    pub key: String,

    /// File to upload
    pub path: PathBuf,

    #[command(flatten)]
    pub key_args: KeyArgs,
}

#[derive(Args, Debug)]
pub struct PutMultipartArgs {
    /// Bucket name
    pub bucket: String,

    /// Object key
    pub key: String,

    /// File to upload
    pub path: PathBuf,

    /// Part size in MiB (at least 5)
    pub part_size_mb: u64,

    /// Parts uploaded at the same time
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: u16,

    #[command(flatten)]
    pub key_args: KeyArgs,
}

#[derive(Args, Debug)]
pub struct GetStringArgs {
    /// Bucket name
    pub bucket: String,

    /// Object key
    pub key: String,

    /// Also print the key id and attributes
    #[arg(long)]
    pub show_key: bool,
}

#[derive(Args, Debug)]
pub struct GetFileArgs {
    /// Bucket name
    pub bucket: String,

    /// Object key
    pub key: String,

    /// Destination file
    pub destination: PathBuf,

    /// Also print the key id and attributes
    #[arg(long)]
    pub show_key: bool,
}

fn parse_attributes(s: &str) -> Result<KeyAttributes, String> {
    KeyAttributes::parse(s).map_err(|e| e.to_string())
}
