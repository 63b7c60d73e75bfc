//! Content encryption for stored objects
//!
//! Each object gets a random 256-bit content key and a 96-bit base IV. The
//! body is stored as one or more segments (one for a single put, one per part
//! for multipart uploads):
//!
//! ```text
//! segment = header || chunk_0 || chunk_1 || ...
//! header  = part (u32 BE) || flags (u32 BE) || chunk_size (u32 BE)
//!           || plaintext_len (u64 BE) || salt (12 bytes)
//! chunk_i = AES-256-GCM(content_key, nonce(salt, part, i), aad = header, plaintext[i])
//! ```
//!
//! The chunk nonce is the base IV XORed with the segment's random salt, with
//! its last eight bytes then XORed with `part << 32 | i`. Sealing the same part
//! twice therefore never repeats a nonce. An empty segment still carries a
//! single empty chunk.
//!
//! Bit 0 of `flags` marks the last segment of an object. A body opens only
//! when its parts run 1, 2, 3 ... (or a lone part 0 for a single put) and the
//! final segment, and only that one, carries the flag.
//!
//! The content key is wrapped with AES-256-GCM under the key-encryption key
//! from the materials provider and stored as `base64(nonce || ciphertext)`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ionic_s3_core::{Error, Result};
use rand::RngCore;
use zeroize::Zeroizing;

/// Content key and key-encryption key size in bytes
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// AES-GCM tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Segment header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Header flag set on the final segment of an object
const FLAG_LAST: u32 = 1;

/// Wrapped content key
pub const META_KEY: &str = "x-amz-key-v2";
/// Base IV
pub const META_IV: &str = "x-amz-iv";
/// Materials description JSON
pub const META_MATDESC: &str = "x-amz-matdesc";
/// Content cipher name
pub const META_CEK_ALG: &str = "x-amz-cek-alg";
/// Key wrap algorithm name
pub const META_WRAP_ALG: &str = "x-amz-wrap-alg";
/// Tag length in bits
pub const META_TAG_LEN: &str = "x-amz-tag-len";
/// Plaintext length of a single-put object
pub const META_PLAINTEXT_LEN: &str = "x-amz-unencrypted-content-length";

pub const CEK_ALGORITHM: &str = "AES/GCM/NoPadding";
pub const WRAP_ALGORITHM: &str = "AES/GCM";
pub const TAG_LENGTH_BITS: &str = "128";

/// Decoded segment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentHeader {
    part: u32,
    last: bool,
    chunk_size: usize,
    plaintext_len: u64,
    salt: [u8; NONCE_SIZE],
}

/// Per-object content encryption key
pub struct ContentKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
    base_iv: [u8; NONCE_SIZE],
}

impl ContentKey {
    /// Generate a fresh random key and base IV
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rng().fill_bytes(key.as_mut());
        let mut base_iv = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut base_iv);
        Self { key, base_iv }
    }

    /// Base IV, base64 encoded for the `x-amz-iv` metadata field
    pub fn iv_base64(&self) -> String {
        BASE64.encode(self.base_iv)
    }

    /// Seal the content key under `kek`
    pub fn wrap(&self, kek: &[u8]) -> Result<String> {
        let cipher = kek_cipher(kek)?;
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), self.key.as_slice())
            .map_err(|e| Error::crypto(format!("content key wrap failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(BASE64.encode(out))
    }

    /// Recover a content key from its wrapped form and base IV
    pub fn unwrap(kek: &[u8], wrapped: &str, iv: &str) -> Result<Self> {
        let cipher = kek_cipher(kek)?;

        let wrapped = BASE64
            .decode(wrapped.trim())
            .map_err(|e| Error::crypto(format!("invalid wrapped key encoding: {}", e)))?;
        if wrapped.len() <= NONCE_SIZE {
            return Err(Error::crypto("wrapped key is too short"));
        }
        let (nonce, sealed) = wrapped.split_at(NONCE_SIZE);

        let raw = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| Error::crypto("content key unwrap failed: wrong key or corrupted metadata"))?,
        );
        let key: [u8; KEY_SIZE] = raw
            .as_slice()
            .try_into()
            .map_err(|_| Error::crypto(format!("unwrapped content key has {} bytes", raw.len())))?;

        let iv = BASE64
            .decode(iv.trim())
            .map_err(|e| Error::crypto(format!("invalid IV encoding: {}", e)))?;
        let base_iv: [u8; NONCE_SIZE] = iv
            .as_slice()
            .try_into()
            .map_err(|_| Error::crypto(format!("IV must be {} bytes, got {}", NONCE_SIZE, iv.len())))?;

        Ok(Self {
            key: Zeroizing::new(key),
            base_iv,
        })
    }

    /// Encrypt one segment of an object body
    ///
    /// `last` marks the final segment of the object; a single put is part 0
    /// and always last.
    pub fn seal_segment(
        &self,
        part: u32,
        last: bool,
        plaintext: &[u8],
        chunk_size: usize,
    ) -> Result<Vec<u8>> {
        if chunk_size == 0 || u32::try_from(chunk_size).is_err() {
            return Err(Error::crypto(format!("invalid chunk size {}", chunk_size)));
        }

        let mut salt = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut salt);
        let segment = SegmentHeader {
            part,
            last,
            chunk_size,
            plaintext_len: plaintext.len() as u64,
            salt,
        };
        let header = encode_header(&segment);
        let chunks = chunk_count(plaintext.len(), chunk_size);
        let mut out = Vec::with_capacity(HEADER_SIZE + plaintext.len() + chunks * TAG_SIZE);
        out.extend_from_slice(&header);

        let cipher = self.cipher()?;
        let pieces: Box<dyn Iterator<Item = &[u8]>> = if plaintext.is_empty() {
            Box::new(std::iter::once(plaintext))
        } else {
            Box::new(plaintext.chunks(chunk_size))
        };

        for (index, piece) in pieces.enumerate() {
            let nonce = self.chunk_nonce(&salt, part, index)?;
            let sealed = cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: piece,
                        aad: &header,
                    },
                )
                .map_err(|e| Error::crypto(format!("chunk encryption failed: {}", e)))?;
            out.extend_from_slice(&sealed);
        }

        Ok(out)
    }

    /// Decrypt a full object body made of one or more segments
    ///
    /// Parts must be contiguous starting at 1, or a single part 0, and the
    /// body must end with the segment flagged as last. When `expected_len`
    /// is given the total plaintext length must match it.
    pub fn open_body(&self, body: &[u8], expected_len: Option<u64>) -> Result<Vec<u8>> {
        if body.is_empty() {
            return Err(Error::crypto("encrypted body is empty"));
        }

        let cipher = self.cipher()?;
        let mut plaintext = Vec::with_capacity(body.len());
        let mut previous: Option<SegmentHeader> = None;
        let mut rest = body;

        while !rest.is_empty() {
            if rest.len() < HEADER_SIZE {
                return Err(Error::crypto("truncated segment header"));
            }
            let (header, tail) = rest.split_at(HEADER_SIZE);
            let segment = decode_header(header)?;
            let part = segment.part;

            match previous {
                None if part > 1 => {
                    return Err(Error::crypto(format!(
                        "object starts at part {}; earlier parts are missing",
                        part
                    )));
                }
                Some(prev) if prev.last => {
                    return Err(Error::crypto(format!(
                        "segment for part {} follows the last segment",
                        part
                    )));
                }
                Some(prev) if prev.part.checked_add(1) != Some(part) => {
                    return Err(Error::crypto(format!(
                        "segment for part {} follows part {}",
                        part, prev.part
                    )));
                }
                _ => {}
            }
            previous = Some(segment);

            let chunk_size = segment.chunk_size;
            let segment_len = usize::try_from(segment.plaintext_len)
                .map_err(|_| Error::crypto("segment length exceeds address space"))?;
            let chunks = chunk_count(segment_len, chunk_size);
            let sealed_len = chunks
                .checked_mul(TAG_SIZE)
                .and_then(|tags| tags.checked_add(segment_len))
                .ok_or_else(|| Error::crypto("segment length overflows"))?;
            if tail.len() < sealed_len {
                return Err(Error::crypto(format!("segment for part {} is truncated", part)));
            }
            let (sealed, next) = tail.split_at(sealed_len);

            for (index, chunk) in sealed.chunks(chunk_size + TAG_SIZE).enumerate() {
                let nonce = self.chunk_nonce(&segment.salt, part, index)?;
                let opened = cipher
                    .decrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: chunk,
                            aad: header,
                        },
                    )
                    .map_err(|_| {
                        Error::crypto(format!(
                            "authentication failed for part {} chunk {}",
                            part, index
                        ))
                    })?;
                plaintext.extend_from_slice(&opened);
            }

            rest = next;
        }

        if !previous.is_some_and(|segment| segment.last) {
            return Err(Error::crypto("object is missing its last segment"));
        }

        if let Some(expected) = expected_len {
            if plaintext.len() as u64 != expected {
                return Err(Error::crypto(format!(
                    "decrypted {} bytes but object metadata records {}",
                    plaintext.len(),
                    expected
                )));
            }
        }

        Ok(plaintext)
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|e| Error::crypto(format!("invalid content key: {}", e)))
    }

    fn chunk_nonce(&self, salt: &[u8; NONCE_SIZE], part: u32, index: usize) -> Result<[u8; NONCE_SIZE]> {
        let index = u32::try_from(index)
            .map_err(|_| Error::crypto("segment has too many chunks"))?;
        let counter = (u64::from(part) << 32) | u64::from(index);

        let mut nonce = self.base_iv;
        for (byte, s) in nonce.iter_mut().zip(salt) {
            *byte ^= s;
        }
        for (byte, c) in nonce[NONCE_SIZE - 8..].iter_mut().zip(counter.to_be_bytes()) {
            *byte ^= c;
        }
        Ok(nonce)
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey").finish_non_exhaustive()
    }
}

fn kek_cipher(kek: &[u8]) -> Result<Aes256Gcm> {
    if kek.len() != KEY_SIZE {
        return Err(Error::crypto(format!(
            "key-encryption key must be {} bytes, got {}",
            KEY_SIZE,
            kek.len()
        )));
    }
    Aes256Gcm::new_from_slice(kek).map_err(|e| Error::crypto(format!("invalid key-encryption key: {}", e)))
}

fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size).max(1)
}

// chunk_size is checked to fit in u32 by seal_segment
fn encode_header(segment: &SegmentHeader) -> [u8; HEADER_SIZE] {
    let flags = if segment.last { FLAG_LAST } else { 0 };
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&segment.part.to_be_bytes());
    header[4..8].copy_from_slice(&flags.to_be_bytes());
    header[8..12].copy_from_slice(&(segment.chunk_size as u32).to_be_bytes());
    header[12..20].copy_from_slice(&segment.plaintext_len.to_be_bytes());
    header[20..].copy_from_slice(&segment.salt);
    header
}

fn decode_header(header: &[u8]) -> Result<SegmentHeader> {
    if header.len() != HEADER_SIZE {
        return Err(Error::crypto("truncated segment header"));
    }
    let mut part = [0u8; 4];
    let mut flags = [0u8; 4];
    let mut chunk_size = [0u8; 4];
    let mut len = [0u8; 8];
    let mut salt = [0u8; NONCE_SIZE];
    part.copy_from_slice(&header[..4]);
    flags.copy_from_slice(&header[4..8]);
    chunk_size.copy_from_slice(&header[8..12]);
    len.copy_from_slice(&header[12..20]);
    salt.copy_from_slice(&header[20..]);

    let flags = u32::from_be_bytes(flags);
    if flags & !FLAG_LAST != 0 {
        return Err(Error::crypto(format!("unknown segment flags {:#x}", flags)));
    }
    let chunk_size = u32::from_be_bytes(chunk_size);
    if chunk_size == 0 {
        return Err(Error::crypto("segment header has a zero chunk size"));
    }
    Ok(SegmentHeader {
        part: u32::from_be_bytes(part),
        last: flags & FLAG_LAST != 0,
        chunk_size: chunk_size as usize,
        plaintext_len: u64::from_be_bytes(len),
        salt,
    })
}
