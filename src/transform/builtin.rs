//! Built-in transforms.
//!
//! Value stages: MessagePack serialization, LZ4 compression with an
//! integrity-checked frame, and an HMAC-SHA256 authenticating wrap. Key
//! stages: namespace prefixing, hex encoding, SHA-256 digesting, and length
//! truncation. All stage functions are pure; everything they need beyond
//! the input arrives through the options environment.

#[cfg(feature = "compression")]
use lz4_flex;
#[cfg(feature = "hmac")]
use ring::hmac;
use serde_json::Value;
use sha2::{Digest, Sha256};
#[cfg(feature = "compression")]
use xxhash_rust::xxh3::xxh3_64;

use crate::options::TransformOptions;
use crate::payload::Payload;
use crate::transform::{Applicability, Token, TransformError, TransformSpec};

// Safety limits for the compression frame - production-safe caps carried by
// every decode before any allocation happens.
#[cfg(feature = "compression")]
const MAX_UNCOMPRESSED_SIZE: usize = 512 * 1024 * 1024; // 512MB limit
#[cfg(feature = "compression")]
const MAX_COMPRESSED_SIZE: usize = 512 * 1024 * 1024; // 512MB limit
/// Maximum allowed expansion ratio (1000:1), enforced with integer-only
/// arithmetic to avoid floating-point precision bypasses.
#[cfg(feature = "compression")]
const MAX_COMPRESSION_RATIO: u64 = 1000;

/// Compression frame layout: `[original_len: u32 BE][xxh3-64: 8B][lz4 block]`
#[cfg(feature = "compression")]
const FRAME_HEADER_LEN: usize = 4 + 8;

/// HMAC-SHA256 tag length; the wrap layout is `[tag: 32B][payload]`.
#[cfg(feature = "hmac")]
const TAG_LEN: usize = 32;

pub(crate) fn builtin_specs() -> Vec<TransformSpec> {
    let mut specs = vec![
        serialize_spec(),
        hex_spec(),
        prefix_spec(),
        digest_spec(),
        truncate_spec(),
    ];
    #[cfg(feature = "compression")]
    specs.push(compress_spec());
    #[cfg(feature = "hmac")]
    specs.push(hmac_spec());
    specs
}

fn expect_bytes(payload: Payload, transform: &'static str) -> Result<Vec<u8>, TransformError> {
    match payload {
        Payload::Bytes(bytes) => Ok(bytes),
        Payload::Json(_) => Err(TransformError::PayloadTypeMismatch {
            transform,
            expected: "byte",
        }),
    }
}

// ============================================================================
// serialize - structured values to MessagePack bytes
// ============================================================================

fn serialize_encode(payload: Payload, _opts: &TransformOptions) -> Result<Payload, TransformError> {
    match payload {
        Payload::Json(value) => rmp_serde::to_vec(&value)
            .map(Payload::Bytes)
            .map_err(|e| TransformError::SerializationFailed(e.to_string())),
        Payload::Bytes(_) => Err(TransformError::PayloadTypeMismatch {
            transform: "serialize",
            expected: "structured",
        }),
    }
}

fn serialize_decode(payload: Payload, _opts: &TransformOptions) -> Result<Payload, TransformError> {
    let bytes = expect_bytes(payload, "serialize")?;
    rmp_serde::from_slice::<Value>(&bytes)
        .map(Payload::Json)
        .map_err(|e| TransformError::DeserializationFailed(e.to_string()))
}

fn serialize_spec() -> TransformSpec {
    TransformSpec {
        name: "serialize",
        applies_to: Applicability::ValueOnly,
        token: Token::Serial,
        requires: &[],
        key_encode: None,
        key_decode: None,
        value_encode: Some(serialize_encode),
        value_decode: Some(serialize_decode),
    }
}

// ============================================================================
// compress - LZ4 block inside an integrity-checked frame
// ============================================================================

#[cfg(feature = "compression")]
fn compress_encode(payload: Payload, _opts: &TransformOptions) -> Result<Payload, TransformError> {
    let bytes = expect_bytes(payload, "compress")?;
    if bytes.len() > MAX_UNCOMPRESSED_SIZE {
        return Err(TransformError::InputTooLarge);
    }

    // Checksum the original data; verification happens after decompression.
    let checksum = xxh3_64(&bytes).to_be_bytes();
    let compressed = lz4_flex::compress(&bytes);
    if compressed.len() > MAX_COMPRESSED_SIZE {
        return Err(TransformError::InputTooLarge);
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + compressed.len());
    frame.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&checksum);
    frame.extend_from_slice(&compressed);
    Ok(Payload::Bytes(frame))
}

#[cfg(feature = "compression")]
fn compress_decode(payload: Payload, _opts: &TransformOptions) -> Result<Payload, TransformError> {
    let frame = expect_bytes(payload, "compress")?;
    if frame.len() < FRAME_HEADER_LEN {
        return Err(TransformError::TruncatedFrame);
    }
    if frame.len() > FRAME_HEADER_LEN + MAX_COMPRESSED_SIZE {
        return Err(TransformError::InputTooLarge);
    }

    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&frame[0..4]);
    let original_len = u32::from_be_bytes(len_buf) as usize;

    let mut checksum = [0u8; 8];
    checksum.copy_from_slice(&frame[4..FRAME_HEADER_LEN]);

    let compressed = &frame[FRAME_HEADER_LEN..];

    if original_len > MAX_UNCOMPRESSED_SIZE {
        return Err(TransformError::InputTooLarge);
    }

    // Expansion-bomb checks, in order: an empty block claiming output is a
    // bomb; then the ratio cap with checked multiplication (overflow is
    // fail-safe rejected).
    let compressed_len = compressed.len() as u64;
    if compressed_len == 0 {
        return Err(TransformError::DecompressionBomb);
    }
    let max_allowed_original = MAX_COMPRESSION_RATIO
        .checked_mul(compressed_len)
        .ok_or(TransformError::DecompressionBomb)?;
    if original_len as u64 > max_allowed_original {
        return Err(TransformError::DecompressionBomb);
    }

    let decompressed = lz4_flex::decompress(compressed, original_len)
        .map_err(|_| TransformError::DecompressionFailed)?;

    // Checksum covers the original data, so it is verified after
    // decompression; tampering with the block or the header both land here.
    if xxh3_64(&decompressed).to_be_bytes() != checksum {
        return Err(TransformError::ChecksumMismatch);
    }

    Ok(Payload::Bytes(decompressed))
}

#[cfg(feature = "compression")]
fn compress_spec() -> TransformSpec {
    TransformSpec {
        name: "compress",
        applies_to: Applicability::ValueOnly,
        token: Token::Compress,
        requires: &[],
        key_encode: None,
        key_decode: None,
        value_encode: Some(compress_encode),
        value_decode: Some(compress_decode),
    }
}

// ============================================================================
// hmac - authenticating wrap, verifies on decode
// ============================================================================

#[cfg(feature = "hmac")]
fn mac_key(opts: &TransformOptions) -> Result<hmac::Key, TransformError> {
    let secret = opts
        .secret
        .as_ref()
        .ok_or(TransformError::OptionUnavailable("secret"))?;
    Ok(hmac::Key::new(hmac::HMAC_SHA256, secret.expose()))
}

#[cfg(feature = "hmac")]
fn hmac_encode(payload: Payload, opts: &TransformOptions) -> Result<Payload, TransformError> {
    let bytes = expect_bytes(payload, "hmac")?;
    let key = mac_key(opts)?;
    let tag = hmac::sign(&key, &bytes);

    let mut framed = Vec::with_capacity(TAG_LEN + bytes.len());
    framed.extend_from_slice(tag.as_ref());
    framed.extend_from_slice(&bytes);
    Ok(Payload::Bytes(framed))
}

#[cfg(feature = "hmac")]
fn hmac_decode(payload: Payload, opts: &TransformOptions) -> Result<Payload, TransformError> {
    let framed = expect_bytes(payload, "hmac")?;
    if framed.len() < TAG_LEN {
        return Err(TransformError::TruncatedFrame);
    }

    let (tag, body) = framed.split_at(TAG_LEN);
    let key = mac_key(opts)?;
    // Constant-time comparison inside ring; any mismatch is tampering.
    hmac::verify(&key, body, tag).map_err(|_| TransformError::MacMismatch)?;

    Ok(Payload::Bytes(body.to_vec()))
}

#[cfg(feature = "hmac")]
fn hmac_spec() -> TransformSpec {
    TransformSpec {
        name: "hmac",
        applies_to: Applicability::ValueOnly,
        token: Token::Mac,
        requires: &["secret"],
        key_encode: None,
        key_decode: None,
        value_encode: Some(hmac_encode),
        value_decode: Some(hmac_decode),
    }
}

// ============================================================================
// hex - order-preserving key encoding
// ============================================================================

fn hex_encode_key(key: &str, _opts: &TransformOptions) -> Result<String, TransformError> {
    Ok(hex::encode(key.as_bytes()))
}

fn hex_decode_key(key: &str, _opts: &TransformOptions) -> Result<String, TransformError> {
    let bytes = hex::decode(key).map_err(|_| TransformError::KeyEncodingInvalid("hex"))?;
    String::from_utf8(bytes).map_err(|_| TransformError::KeyEncodingInvalid("utf-8"))
}

fn hex_spec() -> TransformSpec {
    TransformSpec {
        name: "hex",
        applies_to: Applicability::KeyOnly,
        token: Token::Encoding,
        requires: &[],
        key_encode: Some(hex_encode_key),
        key_decode: Some(hex_decode_key),
        value_encode: None,
        value_decode: None,
    }
}

// ============================================================================
// prefix - namespace prefixing
// ============================================================================

fn prefix_encode_key(key: &str, opts: &TransformOptions) -> Result<String, TransformError> {
    let prefix = opts
        .prefix
        .as_ref()
        .ok_or(TransformError::OptionUnavailable("prefix"))?;
    Ok(format!("{prefix}{key}"))
}

fn prefix_decode_key(key: &str, opts: &TransformOptions) -> Result<String, TransformError> {
    let prefix = opts
        .prefix
        .as_ref()
        .ok_or(TransformError::OptionUnavailable("prefix"))?;
    key.strip_prefix(prefix.as_str())
        .map(str::to_owned)
        .ok_or_else(|| TransformError::PrefixMissing(prefix.clone()))
}

fn prefix_spec() -> TransformSpec {
    TransformSpec {
        name: "prefix",
        applies_to: Applicability::KeyOnly,
        token: Token::Prefix,
        requires: &["prefix"],
        key_encode: Some(prefix_encode_key),
        key_decode: Some(prefix_decode_key),
        value_encode: None,
        value_decode: None,
    }
}

// ============================================================================
// digest - one-way key hashing
// ============================================================================

fn digest_key(key: &str, _opts: &TransformOptions) -> Result<String, TransformError> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn digest_spec() -> TransformSpec {
    TransformSpec {
        name: "digest",
        applies_to: Applicability::KeyOnly,
        token: Token::Digest,
        requires: &[],
        // No decode: the original key is not recoverable from the digest.
        key_encode: Some(digest_key),
        key_decode: None,
        value_encode: None,
        value_decode: None,
    }
}

// ============================================================================
// truncate - key length capping
// ============================================================================

// Only sound when the pre-truncation key is otherwise guaranteed unique;
// that guarantee is the caller's responsibility.
fn truncate_key(key: &str, opts: &TransformOptions) -> Result<String, TransformError> {
    let max = opts
        .max_key_length
        .ok_or(TransformError::OptionUnavailable("max_key_length"))?;
    if key.len() <= max {
        return Ok(key.to_owned());
    }

    let mut cut = max;
    while cut > 0 && !key.is_char_boundary(cut) {
        cut -= 1;
    }
    Ok(key[..cut].to_owned())
}

fn truncate_spec() -> TransformSpec {
    TransformSpec {
        name: "truncate",
        applies_to: Applicability::KeyOnly,
        token: Token::Truncate,
        requires: &["max_key_length"],
        key_encode: Some(truncate_key),
        key_decode: None,
        value_encode: None,
        value_decode: None,
    }
}
