//! Key attribute, key request and materials description types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Materials description entry holding the key service key id
pub const KEY_ID_KEY: &str = "key-id";

/// Materials description entry holding the provider protocol version
pub const VERSION_KEY: &str = "version";

/// Materials description entry holding the pending key request token (write path only)
pub const REQUEST_TOKEN_KEY: &str = "request-token";

/// Provider protocol version written alongside every generated key id
pub const PROVIDER_VERSION: &str = "1.0.0";

/// Attribute name to ordered values
///
/// Names are case-sensitive. Value order is preserved; the first value is
/// treated as the primary one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyAttributes(BTreeMap<String, Vec<String>>);

impl KeyAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, replacing any previous values for that name
    pub fn insert<I, V>(&mut self, name: impl Into<String>, values: I) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.0
            .insert(name.into(), values.into_iter().map(Into::into).collect())
    }

    /// Builder form of [`KeyAttributes::insert`]
    pub fn with<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(name, values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value of an attribute
    pub fn primary(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(name)
    }

    /// Overlay `other` on top of `self`; names present in `other` win
    pub fn merge(&mut self, other: &KeyAttributes) {
        for (name, values) in &other.0 {
            self.0.insert(name.clone(), values.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Parse the command-line attribute syntax `name:v1:v2,name2:v3`
    ///
    /// A name without values yields an empty value list.
    pub fn parse(input: &str) -> Result<Self> {
        let mut attributes = Self::new();
        for pair in input.split(',').filter(|p| !p.trim().is_empty()) {
            let mut parts = pair.split(':');
            let name = parts.next().unwrap_or_default().trim();
            if name.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "attribute entry '{}' has no name",
                    pair
                )));
            }
            attributes.insert(name, parts.map(str::to_string));
        }
        Ok(attributes)
    }
}

impl From<BTreeMap<String, Vec<String>>> for KeyAttributes {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Vec<V>)> for KeyAttributes {
    fn from_iter<T: IntoIterator<Item = (K, Vec<V>)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

/// Caller-supplied parameters for a key creation request
///
/// Carried from the public put/initiate call to the materials provider through
/// the pending request correlator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParams {
    /// Immutable attributes for the new key
    #[serde(default)]
    pub attributes: KeyAttributes,
    /// Mutable attributes for the new key
    #[serde(default)]
    pub mutable_attributes: KeyAttributes,
    /// Client-side reference (id hint) echoed back by the key service
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl KeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, attributes: KeyAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_mutable_attributes(mut self, mutable_attributes: KeyAttributes) -> Self {
        self.mutable_attributes = mutable_attributes;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Raw key material, zeroed on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED {} bytes])", self.0.len())
    }
}

/// A key as returned by the key service, from either create or get
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceKey {
    pub id: String,
    pub secret: SecretBytes,
    pub attributes: KeyAttributes,
    pub mutable_attributes: KeyAttributes,
}

/// String-keyed metadata round-tripped through the object store
///
/// Persisted as a JSON object in the `x-amz-matdesc` object metadata field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialsDescription(BTreeMap<String, String>);

impl MaterialsDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Key service key id; presence selects the retrieve path
    pub fn key_id(&self) -> Option<&str> {
        self.get(KEY_ID_KEY)
    }

    /// Pending key request token, present only on the write path
    pub fn request_token(&self) -> Option<&str> {
        self.get(REQUEST_TOKEN_KEY)
    }

    /// Whether the entry is one of the provider's reserved keys
    pub fn is_reserved(key: &str) -> bool {
        matches!(key, KEY_ID_KEY | VERSION_KEY | REQUEST_TOKEN_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Add every entry of a string map, overwriting existing keys
    pub fn extend<'a>(&mut self, entries: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (k, v) in entries {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MaterialsDescription {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
