// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Action signatures — RSA PKCS#1 v1.5 / SHA-256 over a canonical tuple.
//
// The signed message is the JSON serialisation of
//
//   {"resultId":…, "userId":…, "action":…, "timestamp":…, "dataHash":…, "version":"1.0"}
//
// with fields in exactly that order. Verifiers rebuild the same bytes from
// the stored signature record, so field order and spelling are part of the
// format.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use registrar_core::error::{RegistrarError, Result};
use registrar_core::types::{Certificate, PrincipalId, ResultId};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::certificates::check_certificate;
use crate::keys::parse_public_key;

/// Version tag inside every signed tuple.
pub const SIGNATURE_TUPLE_VERSION: &str = "1.0";

/// The tuple that is serialised and signed. Field order is significant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedTuple<'a> {
    result_id: ResultId,
    user_id: PrincipalId,
    action: &'a str,
    timestamp: &'a str,
    data_hash: &'a str,
    version: &'static str,
}

impl<'a> SignedTuple<'a> {
    fn message(
        result_id: ResultId,
        user_id: PrincipalId,
        action: &'a str,
        timestamp: &'a str,
        data_hash: &'a str,
    ) -> Result<Vec<u8>> {
        let tuple = Self {
            result_id,
            user_id,
            action,
            timestamp,
            data_hash,
            version: SIGNATURE_TUPLE_VERSION,
        };
        serde_json::to_vec(&tuple)
            .map_err(|e| RegistrarError::Encoding(format!("signature tuple: {e}")))
    }
}

/// A fresh signature and the timestamp it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutput {
    /// Base64 PKCS#1 v1.5 signature.
    pub signature: String,
    /// RFC 3339 UTC with milliseconds, e.g. `2024-05-01T09:30:00.123Z`.
    pub timestamp: String,
}

/// Current time in the signature timestamp format.
pub fn signature_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sign `action` by `user_id` on `result_id` over `data_hash`, stamped now.
#[instrument(skip(data_hash, private_key))]
pub fn sign(
    result_id: ResultId,
    user_id: PrincipalId,
    action: &str,
    data_hash: &str,
    private_key: &RsaPrivateKey,
) -> Result<SignatureOutput> {
    sign_at(result_id, user_id, action, data_hash, private_key, Utc::now())
}

/// As [`sign`] with an explicit signing instant.
pub fn sign_at(
    result_id: ResultId,
    user_id: PrincipalId,
    action: &str,
    data_hash: &str,
    private_key: &RsaPrivateKey,
    at: DateTime<Utc>,
) -> Result<SignatureOutput> {
    let timestamp = signature_timestamp(at);
    let message = SignedTuple::message(result_id, user_id, action, &timestamp, data_hash)?;

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature: Signature = signing_key
        .try_sign(&message)
        .map_err(|e| RegistrarError::SigningFailure(e.to_string()))?;

    debug!(%timestamp, "action signed");
    Ok(SignatureOutput {
        signature: STANDARD.encode(signature.to_bytes()),
        timestamp,
    })
}

/// Check a signature against the reconstructed tuple. Never errors: any
/// malformed input verifies as `false`.
pub fn verify(
    result_id: ResultId,
    user_id: PrincipalId,
    action: &str,
    timestamp: &str,
    data_hash: &str,
    signature_b64: &str,
    public_key: &RsaPublicKey,
) -> bool {
    match try_verify(result_id, user_id, action, timestamp, data_hash, signature_b64, public_key) {
        Ok(()) => true,
        Err(e) => {
            debug!(result_id, user_id, %action, error = %e, "signature did not verify");
            false
        }
    }
}

fn try_verify(
    result_id: ResultId,
    user_id: PrincipalId,
    action: &str,
    timestamp: &str,
    data_hash: &str,
    signature_b64: &str,
    public_key: &RsaPublicKey,
) -> Result<()> {
    let raw = STANDARD
        .decode(signature_b64)
        .map_err(|e| RegistrarError::SignatureInvalid(format!("not base64: {e}")))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|e| RegistrarError::SignatureInvalid(format!("signature bytes: {e}")))?;
    let message = SignedTuple::message(result_id, user_id, action, timestamp, data_hash)?;

    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(&message, &signature)
        .map_err(|e| RegistrarError::SignatureInvalid(e.to_string()))
}

/// Verify a signature with the public key inside `certificate`, additionally
/// requiring the certificate to have been valid when the signature was made.
pub fn verify_against_certificate(
    result_id: ResultId,
    user_id: PrincipalId,
    action: &str,
    timestamp: &str,
    data_hash: &str,
    signature_b64: &str,
    certificate: &Certificate,
) -> Result<()> {
    if certificate.subject.id != user_id {
        return Err(RegistrarError::InvalidCertificate(format!(
            "certificate {} belongs to principal {}, not {user_id}",
            certificate.serial_number, certificate.subject.id
        )));
    }

    let signed_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| RegistrarError::SignatureInvalid(format!("timestamp: {e}")))?
        .with_timezone(&Utc);
    check_certificate(certificate, signed_at)?;

    let public_key = parse_public_key(&certificate.public_key)?;
    if verify(result_id, user_id, action, timestamp, data_hash, signature_b64, &public_key) {
        Ok(())
    } else {
        warn!(result_id, user_id, %action, "signature rejected");
        Err(RegistrarError::SignatureInvalid(format!(
            "{action} signature by principal {user_id} on result {result_id} does not verify"
        )))
    }
}
