//! Common test infrastructure for ionic-s3-core tests
//!
//! Wiremock helpers for standing up a fake key service.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ionic_s3_core::config::KeyServiceConfig;
use ionic_s3_core::HttpKeyService;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_ID: &str = "D7GH6HyqbTw";
pub const KEY_BYTES: [u8; 32] = [7u8; 32];

/// JSON body for a successful key response
pub fn key_body(id: &str, attributes: Value) -> Value {
    json!({
        "id": id,
        "key": BASE64.encode(KEY_BYTES),
        "attributes": attributes,
        "mutable_attributes": {}
    })
}

/// Client pointed at the mock server
pub fn client_for(server: &MockServer) -> HttpKeyService {
    let config = KeyServiceConfig {
        url: server.uri(),
        token: Some("test-token".to_string()),
        ..Default::default()
    };
    HttpKeyService::new(&config).expect("client should build")
}

/// Mount a `GET /v1/keys/{id}` endpoint answering with `status` and `body`
pub async fn mock_get_key(server: &MockServer, id: &str, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/keys/{}", id)))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
