//! Configuration loading and management

mod loader;
mod types;

pub use loader::{IonicS3Config, DEFAULT_CONFIG_PATH};
pub use types::{CryptoConfig, KeyServiceConfig, ProviderConfig, S3Config};
