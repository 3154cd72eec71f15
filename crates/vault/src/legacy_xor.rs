//! Decoder for the retired `xor-v1` record scheme.
//!
//! Older installs XORed the JSON bytes with key bytes parsed out of the stored
//! master-key string and hex-encoded the result. When that failed they wrote
//! base64 instead. Both shapes are decoded here; nothing writes them anymore.

use base64::Engine;

use crate::error::VaultError;

/// Only the first 64 characters of the key string contribute key bytes.
const MAX_KEY_CHARS: usize = 64;
/// Key strings shorter than this produce no key bytes at all.
const MIN_KEY_CHARS: usize = 32;
/// Below this many parsed bytes, the fixed pattern is appended.
const MIN_KEY_BYTES: usize = 16;
const PATTERN_LEN: usize = 32;

/// Derive the XOR key stream from the stored master-key string.
pub fn key_bytes(key: &str) -> Vec<u8> {
    let raw = key.as_bytes();
    let mut bytes = Vec::with_capacity(PATTERN_LEN);

    if raw.len() >= MIN_KEY_CHARS {
        let limit = raw.len().min(MAX_KEY_CHARS);
        for start in (0..limit).step_by(2) {
            let end = (start + 2).min(raw.len());
            if let Some(byte) = parse_hex_prefix(&raw[start..end]) {
                bytes.push(byte);
            }
        }
    }

    if bytes.len() < MIN_KEY_BYTES {
        bytes.extend((0..PATTERN_LEN).map(|i| ((i * 13 + 7) % 256) as u8));
    }

    bytes
}

/// Decode an `xor-v1` payload back to its JSON text.
pub fn decrypt(payload: &str, key: &str) -> Result<String, VaultError> {
    if payload.is_empty() {
        return Err(VaultError::CipherError("empty xor-v1 payload".to_string()));
    }

    if !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
        // Written by the base64 fallback: latin-1 text, one byte per char.
        let decoded = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
        return Ok(decoded.into_iter().map(char::from).collect());
    }

    let key = key_bytes(key);
    let decrypted: Vec<u8> = payload
        .as_bytes()
        .chunks(2)
        .filter_map(parse_hex_prefix)
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect();

    String::from_utf8(decrypted).map_err(|e| VaultError::CipherError(e.to_string()))
}

/// Parse the leading hex digits of `chunk`, `None` when there are none.
fn parse_hex_prefix(chunk: &[u8]) -> Option<u8> {
    let digits: Vec<u8> = chunk
        .iter()
        .map_while(|b| char::from(*b).to_digit(16))
        .map(|d| d as u8)
        .collect();
    if digits.is_empty() {
        return None;
    }
    Some(digits.iter().fold(0u8, |acc, d| (acc << 4) | d))
}

#[cfg(test)]
pub(crate) fn encrypt_for_test(plaintext: &str, key: &str) -> String {
    let key = key_bytes(key);
    let bytes: Vec<u8> = plaintext
        .as_bytes()
        .iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    hex::encode(bytes)
}
