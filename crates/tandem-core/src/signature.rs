//! DER to compact signature conversion

use crate::error::{CoreError, Result};
use k256::ecdsa::Signature;

/// Length of a compact `r || s` secp256k1 signature
pub const COMPACT_SIGNATURE_LEN: usize = 64;

/// Convert a DER-encoded secp256k1 signature into 64-byte `r || s` with low S.
///
/// Signatures with `s > n/2` are rewritten to `n - s`.
pub fn der_to_compact(der: &[u8]) -> Result<Vec<u8>> {
    if der.len() < 8 || der[0] != 0x30 {
        return Err(CoreError::InvalidSignature(
            "not a DER sequence".to_string(),
        ));
    }
    let signature =
        Signature::from_der(der).map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
    let normalized = signature.normalize_s().unwrap_or(signature);
    Ok(normalized.to_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn der(r: &[u8], s: &[u8]) -> Vec<u8> {
        let mut out = vec![0x30, (r.len() + s.len() + 4) as u8, 0x02, r.len() as u8];
        out.extend_from_slice(r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(s);
        out
    }

    fn padded(value: u8) -> Vec<u8> {
        let mut out = vec![0u8; 32];
        out[31] = value;
        out
    }

    #[test]
    fn high_s_is_folded() {
        // n - 5
        let mut high_s = vec![0x00];
        high_s.extend(
            hex::decode("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd036413c")
                .unwrap(),
        );
        let compact = der_to_compact(&der(&[0x07], &high_s)).unwrap();
        assert_eq!(compact.len(), COMPACT_SIGNATURE_LEN);
        assert_eq!(&compact[..32], padded(7).as_slice());
        assert_eq!(&compact[32..], padded(5).as_slice());
    }

    #[test]
    fn low_s_is_kept() {
        let compact = der_to_compact(&der(&[0x07], &[0x05])).unwrap();
        assert_eq!(&compact[32..], padded(5).as_slice());
    }

    #[test]
    fn rejects_non_der() {
        assert!(der_to_compact(&[0x31, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(der_to_compact(&[0x30, 0x02]).is_err());
    }
}
