//! Version command

use crate::cli::VersionArgs;
use anyhow::Result;
use ionic_s3_core::types::PROVIDER_VERSION;
use ionic_s3_encryption::crypto::{CEK_ALGORITHM, WRAP_ALGORITHM};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Build and envelope format details reported by `ionic-s3 version`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionReport {
    pub version: String,
    /// `version` entry written into every materials description
    pub provider_version: String,
    pub content_cipher: String,
    pub key_wrap: String,
    /// Short commit SHA, when the build recorded one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl VersionReport {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            provider_version: PROVIDER_VERSION.to_string(),
            content_cipher: CEK_ALGORITHM.to_string(),
            key_wrap: WRAP_ALGORITHM.to_string(),
            commit: option_env!("GIT_SHA").map(String::from),
            target: option_env!("TARGET").map(String::from),
        }
    }
}

impl fmt::Display for VersionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ionic-s3 {}", self.version)?;
        if let Some(commit) = &self.commit {
            write!(f, " ({})", commit)?;
        }
        if let Some(target) = &self.target {
            write!(f, " {}", target)?;
        }
        Ok(())
    }
}

pub fn run(args: VersionArgs) -> Result<()> {
    let report = VersionReport::current();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", report);
    println!("Provider:   {}", report.provider_version);
    println!("Content:    {}", report.content_cipher);
    println!("Key wrap:   {}", report.key_wrap);
    Ok(())
}
