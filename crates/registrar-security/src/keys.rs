// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key management — RSA key pairs, certificates, and gated disclosure per
// principal.
//
// Lifecycle for one principal:
//
//   set_key_access_secret ──► provision ──► unlock / reveal_private_key
//                                 │
//                                 └── provision again: new pair, new
//                                     certificate, previous certificate
//                                     archived in `superseded_certificates`
//
// Key material is persisted through the injected `RecordStore`. The private
// key is sealed under the key access secret before it reaches the store.

use chrono::Utc;
use rand::rngs::OsRng;
use registrar_core::config::ProvenanceConfig;
use registrar_core::error::{RegistrarError, Result};
use registrar_core::store::RecordStore;
use registrar_core::types::{Certificate, KeyAccessGate, Principal, PrincipalId, StoredKeyMaterial};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::audit::{AuditSink, emit};
use crate::certificates;
use crate::custody::{SecretHasher, UnlockedKey};
use crate::integrity::hash_str;
use crate::sealing::KeySeal;

// ---------------------------------------------------------------------------
// Key pairs and PEM handling
// ---------------------------------------------------------------------------

/// A freshly generated RSA key pair with its PEM encodings.
pub struct GeneratedKeyPair {
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
    /// PKCS#8 PEM.
    pub private_pem: Zeroizing<String>,
    /// SPKI PEM.
    pub public_pem: String,
}

/// Generate an RSA key pair of `bits` bits from the OS CSPRNG.
#[instrument]
pub fn generate_key_pair(bits: usize) -> Result<GeneratedKeyPair> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| RegistrarError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| RegistrarError::KeyGeneration(format!("PKCS#8 encoding: {e}")))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| RegistrarError::KeyGeneration(format!("SPKI encoding: {e}")))?;

    debug!(bits, "RSA key pair generated");
    Ok(GeneratedKeyPair {
        private_key,
        public_key,
        private_pem,
        public_pem,
    })
}

/// Parse an SPKI PEM public key.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| RegistrarError::InvalidKey(format!("public key: {e}")))
}

/// Parse a PKCS#8 PEM private key.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| RegistrarError::InvalidKey(format!("private key: {e}")))
}

/// SHA-256 fingerprint of a public key's PEM, used as an audit subject.
pub fn fingerprint(public_pem: &str) -> String {
    hash_str(public_pem)
}

// ---------------------------------------------------------------------------
// KeyManager
// ---------------------------------------------------------------------------

/// Per-principal key custody over an injected record store.
pub struct KeyManager<'a> {
    store: &'a dyn RecordStore,
    config: &'a ProvenanceConfig,
    audit: Option<&'a dyn AuditSink>,
    hasher: SecretHasher,
}

impl<'a> KeyManager<'a> {
    pub fn new(store: &'a dyn RecordStore, config: &'a ProvenanceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            audit: None,
            hasher: SecretHasher::new(&config.secret_hashing)?,
        })
    }

    /// Emit provision/unlock events to `audit`.
    pub fn with_audit(mut self, audit: &'a dyn AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    fn audit(&self, action: &str, subject: &str, success: bool, details: Option<&str>) {
        if self.config.audit_enabled
            && let Some(sink) = self.audit
        {
            emit(sink, action, subject, success, details);
        }
    }

    // -- Certificates ---------------------------------------------------------

    /// Issue a self-hashed certificate for `public_pem`, valid from now.
    pub fn issue_certificate(
        &self,
        public_pem: &str,
        principal: &Principal,
        valid_days: i64,
    ) -> Result<Certificate> {
        certificates::issue(
            public_pem,
            principal,
            &self.config.certificate_issuer,
            Utc::now(),
            valid_days,
        )
    }

    /// Whether `cert` is trustworthy right now.
    pub fn verify_certificate(&self, cert: &Certificate) -> bool {
        certificates::verify_certificate(cert)
    }

    // -- Key access secret ----------------------------------------------------

    /// Establish the principal's key access secret. Only the first call
    /// succeeds; later calls fail with `KeyAccessSecretAlreadySet`.
    #[instrument(skip(self, secret))]
    pub fn set_key_access_secret(&self, principal: PrincipalId, secret: &str) -> Result<()> {
        let min = self.config.min_secret_length;
        if secret.chars().count() < min {
            return Err(RegistrarError::KeyAccessSecretTooShort { min });
        }
        // Existence check first so a repeat call does not pay for a hash.
        if self.store.key_access_gate(principal)?.is_some() {
            return Err(RegistrarError::KeyAccessSecretAlreadySet(principal));
        }

        let gate = KeyAccessGate {
            principal_id: principal,
            secret_hash: self.hasher.hash(secret)?,
            established_at: Utc::now(),
        };
        if !self.store.insert_key_access_gate(&gate)? {
            return Err(RegistrarError::KeyAccessSecretAlreadySet(principal));
        }

        info!("key access secret established");
        Ok(())
    }

    /// Check `candidate` against the stored key access secret.
    #[instrument(skip(self, candidate))]
    pub fn verify_key_access_secret(&self, principal: PrincipalId, candidate: &str) -> Result<bool> {
        let gate = self
            .store
            .key_access_gate(principal)?
            .ok_or(RegistrarError::KeyAccessSecretNotSet(principal))?;
        self.hasher.verify(candidate, &gate.secret_hash)
    }

    fn require_secret(&self, principal: PrincipalId, secret: &str) -> Result<()> {
        if self.verify_key_access_secret(principal, secret)? {
            Ok(())
        } else {
            warn!(principal, "key access secret rejected");
            Err(RegistrarError::KeyAccessDenied(principal))
        }
    }

    // -- Provisioning ---------------------------------------------------------

    /// Generate (or regenerate) the principal's key pair and certificate.
    ///
    /// The key access secret must already be established and `secret` must
    /// match it. A previous certificate is archived, not discarded, so
    /// signatures made under it remain verifiable.
    #[instrument(skip(self, secret))]
    pub fn provision(&self, principal_id: PrincipalId, secret: &str) -> Result<Certificate> {
        match self.try_provision(principal_id, secret) {
            Ok((certificate, public_pem)) => {
                self.audit(
                    "provision",
                    &fingerprint(&public_pem),
                    true,
                    Some(&format!(
                        "principal {principal_id} certificate {}",
                        certificate.serial_number
                    )),
                );
                Ok(certificate)
            }
            Err(e) => {
                let subject = hash_str(&format!("principal:{principal_id}"));
                self.audit("provision", &subject, false, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    fn try_provision(
        &self,
        principal_id: PrincipalId,
        secret: &str,
    ) -> Result<(Certificate, String)> {
        let principal = self.store.principal(principal_id)?;
        self.require_secret(principal_id, secret)?;

        let pair = generate_key_pair(self.config.rsa_key_bits)?;
        let certificate = self.issue_certificate(
            &pair.public_pem,
            &principal,
            self.config.certificate_validity_days,
        )?;
        let sealed_private_key = KeySeal::new(secret).seal_pem(&pair.private_pem)?;

        let superseded_certificates = match self.store.key_material(principal_id)? {
            Some(previous) => {
                let mut archive = previous.superseded_certificates;
                archive.push(previous.certificate);
                archive
            }
            None => Vec::new(),
        };

        let material = StoredKeyMaterial {
            principal_id,
            public_key: pair.public_pem.clone(),
            sealed_private_key,
            certificate: certificate.clone(),
            superseded_certificates,
            generated_at: Utc::now(),
        };
        self.store.put_key_material(&material)?;

        info!(
            serial = %certificate.serial_number,
            archived = material.superseded_certificates.len(),
            "key pair provisioned"
        );
        Ok((certificate, pair.public_pem))
    }

    // -- Disclosure -----------------------------------------------------------

    /// Open the principal's sealed private key for signing.
    #[instrument(skip(self, secret))]
    pub fn unlock(&self, principal_id: PrincipalId, secret: &str) -> Result<UnlockedKey> {
        let outcome = self.open_private_key(principal_id, secret);
        let subject = hash_str(&format!("principal:{principal_id}"));
        match outcome {
            Ok((private_key, material)) => {
                self.audit("unlock", &subject, true, None);
                debug!(serial = %material.certificate.serial_number, "signing key unlocked");
                Ok(UnlockedKey::new(principal_id, private_key, material.certificate))
            }
            Err(e) => {
                self.audit("unlock", &subject, false, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    /// Reveal the principal's PKCS#8 PEM private key (for display or export).
    #[instrument(skip(self, secret))]
    pub fn reveal_private_key(
        &self,
        principal_id: PrincipalId,
        secret: &str,
    ) -> Result<Zeroizing<String>> {
        self.require_secret(principal_id, secret)?;
        let material = self.key_material(principal_id)?;
        KeySeal::new(secret).open_pem(&material.sealed_private_key)
    }

    fn open_private_key(
        &self,
        principal_id: PrincipalId,
        secret: &str,
    ) -> Result<(RsaPrivateKey, StoredKeyMaterial)> {
        self.require_secret(principal_id, secret)?;
        let material = self.key_material(principal_id)?;

        let pem = KeySeal::new(secret)
            .open_pem(&material.sealed_private_key)
            .map_err(|e| RegistrarError::InvalidKey(format!("sealed private key: {e}")))?;
        let private_key = parse_private_key(&pem)?;

        if RsaPublicKey::from(&private_key) != parse_public_key(&material.public_key)? {
            return Err(RegistrarError::InvalidKey(
                "sealed private key does not match the stored public key".into(),
            ));
        }
        Ok((private_key, material))
    }

    // -- Lookups --------------------------------------------------------------

    pub fn key_material(&self, principal_id: PrincipalId) -> Result<StoredKeyMaterial> {
        self.store
            .key_material(principal_id)?
            .ok_or_else(|| RegistrarError::not_found("key material", principal_id))
    }

    /// The principal's current public key, e.g. as an export recipient.
    pub fn public_key(&self, principal_id: PrincipalId) -> Result<RsaPublicKey> {
        parse_public_key(&self.key_material(principal_id)?.public_key)
    }

    pub fn certificate(&self, principal_id: PrincipalId) -> Result<Certificate> {
        Ok(self.key_material(principal_id)?.certificate)
    }

    /// The current or an archived certificate of `principal_id` by serial.
    pub fn certificate_by_serial(&self, principal_id: PrincipalId, serial: &str) -> Result<Certificate> {
        self.key_material(principal_id)?
            .certificate_by_serial(serial)
            .cloned()
            .ok_or_else(|| RegistrarError::not_found("certificate", serial))
    }
}
