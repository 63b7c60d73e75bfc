//! Error types for ionic-s3

use thiserror::Error;

/// Result type alias using ionic-s3-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Key service status code reporting that a key fetch or creation was denied by policy.
///
/// The key service reuses its status field for this condition, so callers that
/// want HTTP-like semantics should treat it as a 403.
pub const POLICY_DENIED_STATUS: i32 = 40024;

/// Error taxonomy for key-service backed S3 encryption
#[derive(Error, Debug)]
pub enum Error {
    /// The key service rejected a create or get request
    #[error("{status} - {message}")]
    KeyService { status: i32, message: String },

    /// Key fetch or creation denied by key service policy (status 40024)
    #[error("40024 - Key fetch or creation was denied by the server: {message}")]
    PolicyDenied { message: String },

    /// Malformed request, materials description or correlator miss
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Object store failure, passed through without reinterpretation
    #[error("Object store error{}: {message}", .code.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    Store {
        code: Option<String>,
        message: String,
    },

    /// Content encryption, decryption or key wrapping failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Transport failure talking to the key service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a key service error, mapping the policy sentinel to `PolicyDenied`
    pub fn key_service(status: i32, message: impl Into<String>) -> Self {
        if status == POLICY_DENIED_STATUS {
            Self::PolicyDenied {
                message: message.into(),
            }
        } else {
            Self::KeyService {
                status,
                message: message.into(),
            }
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// A request token that has no pending key request behind it
    pub fn correlation_miss(token: &str) -> Self {
        Self::invalid_argument(format!("no pending key request for token {}", token))
    }

    /// Create an object store error
    pub fn store(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Store {
            code,
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the key service denied the request by policy
    pub fn is_policy_denied(&self) -> bool {
        matches!(self, Self::PolicyDenied { .. })
    }

    /// Key service status code, if this error came from the key service
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::KeyService { status, .. } => Some(*status),
            Self::PolicyDenied { .. } => Some(POLICY_DENIED_STATUS),
            _ => None,
        }
    }

    /// Object store error code (e.g. `NoSuchKey`), if any
    pub fn store_code(&self) -> Option<&str> {
        match self {
            Self::Store { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_status_maps_to_policy_denied() {
        let err = Error::key_service(40024, "denied");
        assert!(err.is_policy_denied());
        assert_eq!(err.status_code(), Some(POLICY_DENIED_STATUS));
        assert!(err
            .to_string()
            .starts_with("40024 - Key fetch or creation was denied by the server"));
    }

    #[test]
    fn test_other_status_stays_key_service() {
        let err = Error::key_service(40004, "key not found");
        assert!(!err.is_policy_denied());
        assert_eq!(err.status_code(), Some(40004));
        assert_eq!(err.to_string(), "40004 - key not found");
    }

    #[test]
    fn test_correlation_miss_is_invalid_argument() {
        let err = Error::correlation_miss("abc");
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(err.to_string().contains("abc"));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_store_error_display() {
        let err = Error::store(Some("NoSuchKey".to_string()), "missing");
        assert_eq!(err.store_code(), Some("NoSuchKey"));
        assert_eq!(err.to_string(), "Object store error (NoSuchKey): missing");

        let err = Error::store(None, "timeout");
        assert_eq!(err.store_code(), None);
        assert_eq!(err.to_string(), "Object store error: timeout");
    }
}
