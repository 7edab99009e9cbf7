// flowgate-core/src/hashing.rs
// ============================================================================
// Module: Plan Hashing
// Description: RFC 8785 canonical JSON plus SHA-256 content hash.
// Purpose: Give a compiled plan template a stable planHash hosts can compare
//          against a cached copy to detect drift.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! A plan template's hash must be stable for a given blueprint regardless of
//! field order, so canonicalization goes through RFC 8785 (JCS) before
//! SHA-256 hashing. This crate hashes one thing — a compiled blueprint — so
//! there is no pluggable algorithm selection here, unlike a general-purpose
//! content-addressing utility.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// A plan template's content hash: lowercase hex-encoded SHA-256 of its
/// RFC 8785 canonical JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

/// Raised when a blueprint fails to canonicalize.
#[derive(Debug, Error)]
#[error("failed to canonicalize json: {0}")]
pub struct HashError(String);

/// Hashes `value`'s RFC 8785 canonical JSON encoding.
///
/// # Errors
///
/// Returns [`HashError`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<HashDigest, HashError> {
    let bytes = serde_jcs::to_vec(value).map_err(|error| HashError(error.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(HashDigest {
        value: hex_encode(&digest),
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_different_order_hash_equal() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        let digest_a = hash_canonical_json(&a).unwrap();
        let digest_b = hash_canonical_json(&b).unwrap();
        assert_eq!(digest_a, digest_b);
    }

    #[test]
    fn different_values_hash_differently() {
        let a = hash_canonical_json(&serde_json::json!({"a": 1})).unwrap();
        let b = hash_canonical_json(&serde_json::json!({"a": 2})).unwrap();
        assert_ne!(a, b);
    }
}
