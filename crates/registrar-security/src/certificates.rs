// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Self-issued certificates — bind an RSA public key to a principal.
//
// # Design note
//
// There is no certificate authority. A certificate's `signature` is the
// SHA-256 of the canonical JSON of every other field, which proves the
// record has not been edited since issue but says nothing about who issued
// it. That is weaker than an X.509 trust chain. The `trust_anchor` tag marks
// which scheme a certificate uses so that CA-signed certificates can be added
// without changing the shape; until a CA trust store exists they fail closed.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use registrar_core::error::{RegistrarError, Result};
use registrar_core::types::{Certificate, CertificateSubject, Principal, TrustAnchor};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::integrity::hash_canonical;

/// Every certificate field except `signature`, in the form that is hashed.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateBody<'a> {
    serial_number: &'a str,
    issuer: &'a str,
    subject: &'a CertificateSubject,
    public_key: &'a str,
    valid_from: &'a DateTime<Utc>,
    valid_until: &'a DateTime<Utc>,
    trust_anchor: &'a TrustAnchor,
}

impl<'a> From<&'a Certificate> for CertificateBody<'a> {
    fn from(cert: &'a Certificate) -> Self {
        Self {
            serial_number: &cert.serial_number,
            issuer: &cert.issuer,
            subject: &cert.subject,
            public_key: &cert.public_key,
            valid_from: &cert.valid_from,
            valid_until: &cert.valid_until,
            trust_anchor: &cert.trust_anchor,
        }
    }
}

/// Recompute the self-consistency hash of `cert`.
pub fn self_hash(cert: &Certificate) -> Result<String> {
    hash_canonical(&CertificateBody::from(cert))
}

/// Issue a self-hashed certificate valid from `issued_at` for `valid_days`.
///
/// `issued_at` is truncated to milliseconds, the precision of signature
/// timestamps, so a signature made at the issue instant lies in the window.
pub fn issue(
    public_key_pem: &str,
    principal: &Principal,
    issuer: &str,
    issued_at: DateTime<Utc>,
    valid_days: i64,
) -> Result<Certificate> {
    if valid_days <= 0 {
        return Err(RegistrarError::InvalidCertificate(format!(
            "validity must be positive, got {valid_days} days"
        )));
    }
    let issued_at = issued_at.trunc_subsecs(3);
    let valid_until = TimeDelta::try_days(valid_days)
        .and_then(|d| issued_at.checked_add_signed(d))
        .ok_or_else(|| {
            RegistrarError::InvalidCertificate(format!("validity of {valid_days} days overflows"))
        })?;

    let mut cert = Certificate {
        serial_number: Uuid::new_v4().simple().to_string().to_uppercase(),
        issuer: issuer.to_owned(),
        subject: CertificateSubject {
            id: principal.id,
            name: principal.name.clone(),
            email: principal.email.clone(),
            role: principal.role,
        },
        public_key: public_key_pem.to_owned(),
        valid_from: issued_at,
        valid_until,
        trust_anchor: TrustAnchor::SelfHashed,
        signature: String::new(),
    };
    cert.signature = self_hash(&cert)?;

    debug!(
        serial = %cert.serial_number,
        subject = cert.subject.id,
        %valid_until,
        "certificate issued"
    );
    Ok(cert)
}

/// Whether `at` lies inside the certificate's validity window.
pub fn valid_at(cert: &Certificate, at: DateTime<Utc>) -> bool {
    cert.valid_from <= at && at <= cert.valid_until
}

/// Typed check of `cert` at instant `at`: expiry first, then the anchor.
pub fn check_certificate(cert: &Certificate, at: DateTime<Utc>) -> Result<()> {
    if at > cert.valid_until {
        return Err(RegistrarError::CertificateExpired {
            serial: cert.serial_number.clone(),
            valid_until: cert.valid_until.to_rfc3339(),
        });
    }
    if at < cert.valid_from {
        return Err(RegistrarError::InvalidCertificate(format!(
            "certificate {} is not valid before {}",
            cert.serial_number, cert.valid_from
        )));
    }

    match &cert.trust_anchor {
        TrustAnchor::SelfHashed => {
            if self_hash(cert)? == cert.signature {
                Ok(())
            } else {
                Err(RegistrarError::InvalidCertificate(format!(
                    "self-hash mismatch on certificate {}",
                    cert.serial_number
                )))
            }
        }
        TrustAnchor::CaSigned { authority } => Err(RegistrarError::InvalidCertificate(format!(
            "no trust store configured for authority {authority}"
        ))),
    }
}

/// Whether `cert` is trustworthy right now. Fails closed.
pub fn verify_certificate(cert: &Certificate) -> bool {
    match check_certificate(cert, Utc::now()) {
        Ok(()) => true,
        Err(e) => {
            warn!(serial = %cert.serial_number, error = %e, "certificate rejected");
            false
        }
    }
}
