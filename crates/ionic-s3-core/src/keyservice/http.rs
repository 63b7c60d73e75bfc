//! HTTP/JSON key service client
//!
//! Wire format:
//! - `POST {url}/v1/keys` with `{"attributes", "mutable_attributes", "ref"}`
//! - `GET {url}/v1/keys/{id}`, with `id` percent-encoded as one path segment
//!
//! Both answer `{"id", "key", "attributes", "mutable_attributes"}` where `key`
//! is base64. Failures answer a non-2xx status with `{"code", "message"}`.

use crate::config::KeyServiceConfig;
use crate::error::{Error, Result};
use crate::keyservice::KeyService;
use crate::types::{KeyAttributes, KeyParams, SecretBytes, ServiceKey};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Prefix of the headers carrying client metadata
const METADATA_HEADER_PREFIX: &str = "x-ionic-metadata-";

#[derive(Debug, Deserialize)]
struct KeyResponse {
    id: String,
    key: String,
    #[serde(default)]
    attributes: KeyAttributes,
    #[serde(default)]
    mutable_attributes: KeyAttributes,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: i32,
    #[serde(default)]
    message: String,
}

/// Key service reached over HTTP
pub struct HttpKeyService {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpKeyService {
    /// Create a client from the `key_service` config section
    pub fn new(config: &KeyServiceConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(Error::invalid_config("key_service.url is not set"));
        }
        let base_url = config.url.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::invalid_config(format!("invalid key_service.url '{}': {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::invalid_config(format!(
                "key_service.url '{}' cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(metadata_headers(&config.metadata)?)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of one key; the id never escapes its path segment
    fn key_url(&self, id: &str) -> Result<reqwest::Url> {
        if matches!(id, "" | "." | "..") {
            return Err(Error::invalid_argument(format!("invalid key id '{}'", id)));
        }

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::invalid_config(format!("invalid key_service.url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::invalid_config("key_service.url cannot carry a path"))?
            .pop_if_empty()
            .extend(["v1", "keys", id]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn parse_key(response: reqwest::Response) -> Result<ServiceKey> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => Error::key_service(err.code, err.message),
                Err(_) => Error::key_service(i32::from(status.as_u16()), body),
            });
        }

        let body: KeyResponse = response.json().await?;
        let secret = BASE64
            .decode(body.key.as_bytes())
            .map_err(|e| Error::invalid_argument(format!("key service returned malformed key material: {}", e)))?;

        Ok(ServiceKey {
            id: body.id,
            secret: SecretBytes::new(secret),
            attributes: body.attributes,
            mutable_attributes: body.mutable_attributes,
        })
    }
}

fn metadata_headers(metadata: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in metadata {
        let header_name = format!("{}{}", METADATA_HEADER_PREFIX, name.to_ascii_lowercase());
        let header_name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
            Error::invalid_config(format!("invalid metadata name '{}': {}", name, e))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            Error::invalid_config(format!("invalid metadata value for '{}': {}", name, e))
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

#[async_trait]
impl KeyService for HttpKeyService {
    async fn create_key(&self, request: &KeyParams) -> Result<ServiceKey> {
        let url = format!("{}/v1/keys", self.base_url);
        debug!(
            "Creating key at {} with {} attributes",
            url,
            request.attributes.len()
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;

        let key = Self::parse_key(response).await?;
        debug!("Key service created key {}", key.id);
        Ok(key)
    }

    async fn get_key(&self, id: &str) -> Result<ServiceKey> {
        let url = self.key_url(id)?;
        debug!("Fetching key {}", id);

        let response = self.authorize(self.client.get(url)).send().await?;
        Self::parse_key(response).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

impl std::fmt::Debug for HttpKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKeyService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
