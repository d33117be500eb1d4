//! Payload codec: gzip, then standard base64.
//!
//! Every stored cell in both tiers goes through this pipeline.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_core::{DecodeError, TesseraResult};

/// Compress with gzip and encode as padded standard base64.
pub fn zip_and_encode(contents: &[u8]) -> TesseraResult<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(contents)
        .and_then(|_| encoder.finish())
        .map_err(|e| DecodeError::Payload {
            key: String::new(),
            reason: format!("gzip encode failed: {}", e),
        })?;
    Ok(STANDARD.encode(compressed))
}

/// Reverse of [`zip_and_encode`]. Surrounding whitespace is ignored.
pub fn unzip_and_decode(contents: &str) -> TesseraResult<Vec<u8>> {
    unzip_and_decode_keyed("", contents.as_bytes())
}

/// Same as [`unzip_and_decode`], reporting `key` on failure.
pub fn unzip_and_decode_keyed(key: &str, raw: &[u8]) -> TesseraResult<Vec<u8>> {
    let trimmed = trim_whitespace(raw);
    let compressed = STANDARD.decode(trimmed).map_err(|e| DecodeError::Payload {
        key: key.to_string(),
        reason: format!("base64: {}", e),
    })?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Payload {
            key: key.to_string(),
            reason: format!("gzip: {}", e),
        })?;
    Ok(out)
}

fn trim_whitespace(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

/// Unzip a raw cell and parse it as JSON.
pub fn decode_json<T: DeserializeOwned>(key: &str, raw: &[u8]) -> TesseraResult<T> {
    let json = unzip_and_decode_keyed(key, raw)?;
    serde_json::from_slice(&json).map_err(|e| {
        DecodeError::Record {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Serialize to JSON and encode.
pub fn encode_json<T: Serialize>(value: &T) -> TesseraResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| DecodeError::Record {
        key: String::new(),
        reason: e.to_string(),
    })?;
    zip_and_encode(&json)
}

/// Encoded form of `{}`.
pub fn empty_object_payload() -> TesseraResult<String> {
    zip_and_encode(b"{}")
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// decode(encode(payload)) == payload for arbitrary bytes.
        #[test]
        fn prop_round_trip(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
            let encoded = zip_and_encode(&payload).unwrap();
            prop_assert!(!encoded.contains(','));
            prop_assert!(!encoded.contains('\n'));
            prop_assert_eq!(unzip_and_decode(&encoded).unwrap(), payload);
        }
    }
}
