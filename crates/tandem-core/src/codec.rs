//! Byte codecs for JSON frames
//!
//! Binary fields travel as hex in backup frames and as base64 in the HTTP
//! recovery endpoints.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Lowercase hex encoding
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex, tolerating surrounding whitespace, a `0x` prefix and uppercase digits.
///
/// An empty string decodes to an empty vector.
pub fn from_hex(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    let normalized = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }
    Ok(hex::decode(normalized.to_ascii_lowercase())?)
}

/// Standard base64 encoding
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Standard base64 decoding
pub fn from_base64(value: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(value.trim())?)
}

/// Decode a field whose encoding is named alongside it.
///
/// Missing or `"hex"` encodings mean hex; anything else is treated as base64.
pub fn decode_by_encoding(value: &str, encoding: Option<&str>) -> Result<Vec<u8>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    match encoding {
        None | Some("hex") => from_hex(value),
        Some(_) => from_base64(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_accepts_prefix_and_case() {
        assert_eq!(from_hex(" 0xABcd ").unwrap(), vec![0xab, 0xcd]);
        assert!(from_hex("").unwrap().is_empty());
        assert!(from_hex("abc").is_err());
    }

    #[test]
    fn named_encodings() {
        assert_eq!(decode_by_encoding("0102", None).unwrap(), vec![1, 2]);
        assert_eq!(decode_by_encoding("0102", Some("hex")).unwrap(), vec![1, 2]);
        assert_eq!(
            decode_by_encoding(&to_base64(&[9, 8, 7]), Some("base64")).unwrap(),
            vec![9, 8, 7]
        );
        assert!(decode_by_encoding("", Some("base64")).unwrap().is_empty());
    }
}
