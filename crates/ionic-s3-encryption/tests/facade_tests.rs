//! End-to-end tests for the encryption client facade

mod common;

use bytes::Bytes;
use common::{harness, harness_with, BUCKET};
use ionic_s3_core::types::{KEY_ID_KEY, REQUEST_TOKEN_KEY, VERSION_KEY};
use ionic_s3_core::MemoryKeyService;
use ionic_s3_encryption::crypto::{META_KEY, META_MATDESC};
use ionic_s3_encryption::{
    Error, GetObjectRequest, KeyAttributes, KeyParams, MaterialsDescription, ObjectMetadata,
    PutObjectRequest,
};
use std::io::Write;

#[tokio::test]
async fn test_put_string_get_and_key() {
    let h = harness();
    let params = KeyParams::new().with_attributes(KeyAttributes::new().with("env", ["prod"]));

    h.client
        .put_string(BUCKET, "hello.txt", "Hello, world", params)
        .await
        .unwrap();

    let pair = h
        .client
        .get_object_and_key(GetObjectRequest::new(BUCKET, "hello.txt"))
        .await
        .unwrap();

    assert_eq!(pair.object.body, Bytes::from_static(b"Hello, world"));
    assert_eq!(pair.object.metadata.content_type.as_deref(), Some("text/plain"));

    let key = pair.key.expect("key should be returned");
    assert_eq!(key.attributes, KeyAttributes::new().with("env", ["prod"]));
    assert_eq!(h.keys.create_count(), 1);
    assert_eq!(h.keys.get_count(), 1);
}

#[tokio::test]
async fn test_default_attributes_round_trip() {
    let h = harness();
    h.provider
        .set_default_attributes(KeyAttributes::new().with("env", ["prod"]));

    h.client
        .put_string(BUCKET, "defaults.txt", "classified", KeyParams::default())
        .await
        .unwrap();

    let pair = h
        .client
        .get_object_and_key(GetObjectRequest::new(BUCKET, "defaults.txt"))
        .await
        .unwrap();

    assert_eq!(pair.object.body, Bytes::from_static(b"classified"));
    let key = pair.key.expect("key should be returned");
    assert_eq!(key.attributes, KeyAttributes::new().with("env", ["prod"]));
    assert!(key.mutable_attributes.is_empty());
}

#[tokio::test]
async fn test_stored_description_has_key_id_and_version_only() {
    let h = harness();
    h.client
        .put_string(BUCKET, "a", "payload", KeyParams::new())
        .await
        .unwrap();

    let (raw, metadata) = h.store.raw_object(BUCKET, "a").unwrap();
    assert_ne!(raw, Bytes::from_static(b"payload"));

    let description = MaterialsDescription::from_json(metadata.user(META_MATDESC).unwrap()).unwrap();
    assert_eq!(description.len(), 2);
    assert!(description.get(KEY_ID_KEY).is_some());
    assert_eq!(description.get(VERSION_KEY), Some("1.0.0"));
    assert!(description.get(REQUEST_TOKEN_KEY).is_none());
    assert_eq!(h.provider.pending_requests(), 0);
}

#[tokio::test]
async fn test_second_take_returns_none() {
    let h = harness();
    h.client
        .put_string(BUCKET, "a", "payload", KeyParams::new())
        .await
        .unwrap();

    let first = h
        .client
        .get_object_and_key(GetObjectRequest::new(BUCKET, "a"))
        .await
        .unwrap();
    assert!(first.key.is_some());

    let key_id = first.key.unwrap().id;
    assert!(h.provider.take_response_key(&key_id).is_none());
}

#[tokio::test]
async fn test_get_object_discards_cached_key() {
    let h = harness();
    let put = h.client.put_string(BUCKET, "a", "payload", KeyParams::new()).await;
    assert!(put.is_ok());

    let object = h
        .client
        .get_object(GetObjectRequest::new(BUCKET, "a"))
        .await
        .unwrap();
    assert_eq!(object.body, Bytes::from_static(b"payload"));

    let (_, metadata) = h.store.raw_object(BUCKET, "a").unwrap();
    let description = MaterialsDescription::from_json(metadata.user(META_MATDESC).unwrap()).unwrap();
    assert!(h.provider.take_response_key(description.key_id().unwrap()).is_none());
}

#[tokio::test]
async fn test_request_without_body_is_stored_plain() {
    let h = harness();
    h.client
        .put_object(PutObjectRequest::new(BUCKET, "redirect"))
        .await
        .unwrap();

    let (_, metadata) = h.store.raw_object(BUCKET, "redirect").unwrap();
    assert!(metadata.user(META_KEY).is_none());
    assert_eq!(h.keys.create_count(), 0);
    assert_eq!(h.provider.pending_requests(), 0);

    let pair = h
        .client
        .get_object_and_key(GetObjectRequest::new(BUCKET, "redirect"))
        .await
        .unwrap();
    assert!(pair.key.is_none());
}

#[tokio::test]
async fn test_metadata_capture() {
    let h = harness();
    h.provider.set_metadata_capture(true);
    h.provider
        .set_default_attributes(KeyAttributes::new().with("department", ["eng"]).with("team", ["storage"]));

    let request = PutObjectRequest::new(BUCKET, "report.csv")
        .with_body(b"a,b,c".to_vec())
        .with_metadata(ObjectMetadata::new().with_user_metadata("department", "finance"));
    let params = KeyParams::new().with_attributes(KeyAttributes::new().with("team", ["audit"]));
    h.client.put_object_with_key(request, params).await.unwrap();

    let pair = h
        .client
        .get_object_and_key(GetObjectRequest::new(BUCKET, "report.csv"))
        .await
        .unwrap();
    let attributes = pair.key.unwrap().attributes;
    assert_eq!(attributes.primary("department"), Some("finance"));
    assert_eq!(attributes.primary("team"), Some("audit"));

    // user metadata is still stored as-is
    assert_eq!(pair.object.metadata.user("department"), Some("finance"));
}

#[tokio::test]
async fn test_metadata_ignored_when_capture_disabled() {
    let h = harness();
    let request = PutObjectRequest::new(BUCKET, "report.csv")
        .with_body(b"a,b,c".to_vec())
        .with_metadata(ObjectMetadata::new().with_user_metadata("department", "finance"));
    h.client.put_object(request).await.unwrap();

    let pair = h
        .client
        .get_object_and_key(GetObjectRequest::new(BUCKET, "report.csv"))
        .await
        .unwrap();
    assert!(pair.key.unwrap().attributes.is_empty());
}

#[tokio::test]
async fn test_reserved_metadata_not_captured() {
    let h = harness();
    h.provider.set_metadata_capture(true);

    let request = PutObjectRequest::new(BUCKET, "sneaky")
        .with_body(b"data".to_vec())
        .with_metadata(ObjectMetadata::new().with_user_metadata(KEY_ID_KEY, "someone-elses-key"));
    h.client.put_object(request).await.unwrap();

    assert_eq!(h.keys.create_count(), 1);
    let object = h
        .client
        .get_object(GetObjectRequest::new(BUCKET, "sneaky"))
        .await
        .unwrap();
    assert_eq!(object.body, Bytes::from_static(b"data"));
}

#[tokio::test]
async fn test_policy_denied_on_put() {
    let h = harness_with(MemoryKeyService::new().with_deny_policy(|attrs| attrs.contains("forbidden")));
    let params = KeyParams::new().with_attributes(KeyAttributes::new().with("forbidden", ["yes"]));

    let err = h
        .client
        .put_string(BUCKET, "nope", "data", params)
        .await
        .unwrap_err();
    assert!(err.is_policy_denied());
    assert_eq!(err.status_code(), Some(40024));
    assert!(h.store.is_empty());
    assert_eq!(h.provider.pending_requests(), 0);
}

#[tokio::test]
async fn test_missing_object_is_store_error() {
    let h = harness();
    let err = h
        .client
        .get_object(GetObjectRequest::new(BUCKET, "missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert_eq!(err.store_code(), Some("NoSuchKey"));
}

#[tokio::test]
async fn test_file_round_trip() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let destination = dir.path().join("destination.bin");

    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    std::fs::File::create(&source)
        .unwrap()
        .write_all(&content)
        .unwrap();

    h.client
        .put_file(BUCKET, "blob", &source, KeyParams::new())
        .await
        .unwrap();

    let pair = h
        .client
        .get_object_to_file_and_key(GetObjectRequest::new(BUCKET, "blob"), &destination)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&destination).unwrap(), content);
    assert_eq!(pair.metadata.content_length, Some(1000));
    assert!(pair.key.is_some());
}

#[tokio::test]
async fn test_concurrent_puts_get_distinct_keys() {
    let h = harness();
    let client = &h.client;

    let puts = (0..8).map(|i| async move {
        let params = KeyParams::new().with_attributes(KeyAttributes::new().with("n", [i.to_string()]));
        client
            .put_string(BUCKET, &format!("obj-{}", i), &format!("body {}", i), params)
            .await
    });
    for result in futures::future::join_all(puts).await {
        result.unwrap();
    }

    assert_eq!(h.keys.len(), 8);
    for i in 0..8 {
        let pair = h
            .client
            .get_object_and_key(GetObjectRequest::new(BUCKET, format!("obj-{}", i)))
            .await
            .unwrap();
        assert_eq!(pair.object.body, Bytes::from(format!("body {}", i)));
        assert_eq!(pair.key.unwrap().attributes.primary("n"), Some(i.to_string().as_str()));
    }
}
