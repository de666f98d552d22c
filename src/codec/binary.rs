//! Binary cell parsing and formatting.
//!
//! Accepts an optional `0x`/`0X` prefix, falls back from hex to base64 when
//! the input cannot be a hex string, and refuses blobs over a hard cap.

use base64::Engine;

/// Decoded blobs larger than this are rejected outright.
pub const MAX_BLOB_SIZE: usize = 10 * 1024 * 1024;

/// True for an even-length string of hex nibbles.
pub fn is_hex_format(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a binary literal: `0x`-prefixed hex, bare hex when the shape fits,
/// otherwise base64. Returns `None` on any decode failure or when the result
/// exceeds [`MAX_BLOB_SIZE`].
pub fn parse_binary(input: &str) -> Option<Vec<u8>> {
    let value = input.trim();
    if value.is_empty() {
        return None;
    }

    let result = if let Some(stripped) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        hex::decode(stripped).ok()?
    } else if is_hex_format(value) {
        hex::decode(value).ok()?
    } else {
        base64::engine::general_purpose::STANDARD.decode(value).ok()?
    };

    if result.len() > MAX_BLOB_SIZE {
        return None;
    }
    Some(result)
}

/// Upper-case hex rendering used for raw and blob output.
pub fn to_upper_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}
