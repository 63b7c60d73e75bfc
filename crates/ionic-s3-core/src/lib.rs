//! # ionic-s3-core
//!
//! Core library for ionic-s3 providing:
//! - Configuration file parsing (config.yaml) with environment overrides
//! - The error taxonomy shared by every ionic-s3 crate
//! - Key attribute, key parameter and materials description types
//! - Key service clients (HTTP and in-memory)

pub mod config;
pub mod error;
pub mod keyservice;
pub mod types;

pub use config::IonicS3Config;
pub use error::{Error, Result, POLICY_DENIED_STATUS};
pub use keyservice::{HttpKeyService, KeyService, MemoryKeyService};
pub use types::{KeyAttributes, KeyParams, MaterialsDescription, SecretBytes, ServiceKey};
