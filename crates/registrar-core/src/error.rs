// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Registrar.

use thiserror::Error;

use crate::types::{PrincipalId, ResultId, ResultStatus};

/// Top-level error type for all Registrar operations.
#[derive(Debug, Error)]
pub enum RegistrarError {
    // -- Hashing --
    #[error("payload could not be encoded for hashing: {0}")]
    Encoding(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Keys and certificates --
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("certificate {serial} expired at {valid_until}")]
    CertificateExpired { serial: String, valid_until: String },

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("key access secret must be at least {min} characters")]
    KeyAccessSecretTooShort { min: usize },

    #[error("key access secret already established for principal {0}")]
    KeyAccessSecretAlreadySet(PrincipalId),

    #[error("no key access secret established for principal {0}")]
    KeyAccessSecretNotSet(PrincipalId),

    #[error("key access denied for principal {0}")]
    KeyAccessDenied(PrincipalId),

    // -- Secure containers --
    #[error("not a secure container: {0}")]
    InvalidFormat(String),

    #[error("decrypted payload is not valid JSON: {0}")]
    MalformedPayload(String),

    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    // -- Signatures and workflow --
    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("signature does not verify: {0}")]
    SignatureInvalid(String),

    #[error("result {record} cannot {action} from status {from}")]
    InvalidTransition {
        record: ResultId,
        from: ResultStatus,
        action: String,
    },

    #[error("principal {actor} is not allowed to {action}")]
    Unauthorized { actor: PrincipalId, action: String },

    #[error("a reason is required to deny a result")]
    DenialReasonRequired,

    #[error("invalid scores: {0}")]
    InvalidScores(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    // -- Storage / persistence --
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistrarError {
    /// Shorthand for a missing record of the given kind.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RegistrarError>;
