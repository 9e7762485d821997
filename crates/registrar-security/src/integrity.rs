// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Integrity hashing — SHA-256 over raw bytes and over canonical JSON.
//
// Canonical JSON here means: serialise through `serde_json::Value`, whose
// object map is ordered by key, then emit compact JSON. Two structurally
// equal values always hash to the same digest regardless of field order in
// the source type.

use registrar_core::error::{RegistrarError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(digest(data))
}

/// Hash the UTF-8 bytes of `text`.
pub fn hash_str(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Raw 32-byte SHA-256 digest.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Whether `data` hashes to `expected_hex` (case-insensitive).
pub fn verify_hash(data: &[u8], expected_hex: &str) -> bool {
    hash_bytes(data).eq_ignore_ascii_case(expected_hex)
}

/// Like [`verify_hash`] but reports both digests on mismatch.
pub fn ensure_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(RegistrarError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

/// Deterministic compact JSON with object keys in sorted order.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value =
        serde_json::to_value(value).map_err(|e| RegistrarError::Encoding(e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| RegistrarError::Encoding(e.to_string()))
}

/// SHA-256 of [`canonical_json`].
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(hash_str(&canonical_json(value)?))
}
