// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key custody — the key access secret gate and per-caller signing sessions.
//
// A principal's key access secret is separate from their login credential.
// It is stored only as an Argon2id PHC string and is required both to reveal
// the private key and to unlock it for signing.

use std::collections::HashMap;
use std::fmt;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use registrar_core::config::SecretHashing;
use registrar_core::error::{RegistrarError, Result};
use registrar_core::types::{Certificate, PrincipalId};
use rsa::RsaPrivateKey;
use tracing::debug;

// ---------------------------------------------------------------------------
// Secret hashing
// ---------------------------------------------------------------------------

/// Argon2id hasher for key access secrets.
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl SecretHasher {
    pub fn new(cost: &SecretHashing) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| RegistrarError::Config(format!("invalid Argon2 parameters: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `secret` with a fresh random salt. Returns a PHC string.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| RegistrarError::Encoding(format!("secret hashing failed: {e}")))
    }

    /// Check `candidate` against a stored PHC string. The parameters recorded
    /// in the PHC string are used, not the hasher's own.
    pub fn verify(&self, candidate: &str, phc: &str) -> Result<bool> {
        let parsed = PasswordHash::new(phc)
            .map_err(|e| RegistrarError::Database(format!("stored secret hash unreadable: {e}")))?;
        Ok(self
            .argon2
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok())
    }
}

// ---------------------------------------------------------------------------
// Unlocked keys and sessions
// ---------------------------------------------------------------------------

/// A private key that has been opened with its owner's key access secret.
pub struct UnlockedKey {
    principal_id: PrincipalId,
    private_key: RsaPrivateKey,
    certificate: Certificate,
}

impl UnlockedKey {
    pub fn new(principal_id: PrincipalId, private_key: RsaPrivateKey, certificate: Certificate) -> Self {
        Self {
            principal_id,
            private_key,
            certificate,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The certificate that was current when the key was unlocked.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("principal_id", &self.principal_id)
            .field("certificate", &self.certificate.serial_number)
            .finish_non_exhaustive()
    }
}

/// The keys a caller has unlocked during its session.
///
/// Workflow transitions draw the actor's key from here; an actor who has not
/// unlocked their key in this session cannot sign.
#[derive(Debug, Default)]
pub struct SigningSession {
    keys: HashMap<PrincipalId, UnlockedKey>,
}

impl SigningSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an unlocked key.
    pub fn insert(&mut self, key: UnlockedKey) {
        debug!(principal = key.principal_id, "key added to signing session");
        self.keys.insert(key.principal_id, key);
    }

    /// Drop a principal's key from the session.
    pub fn lock(&mut self, principal: PrincipalId) -> bool {
        self.keys.remove(&principal).is_some()
    }

    pub fn is_unlocked(&self, principal: PrincipalId) -> bool {
        self.keys.contains_key(&principal)
    }

    /// The unlocked key for `principal`, or `SigningFailure`.
    pub fn key_for(&self, principal: PrincipalId) -> Result<&UnlockedKey> {
        self.keys.get(&principal).ok_or_else(|| {
            RegistrarError::SigningFailure(format!(
                "principal {principal} has not unlocked a signing key in this session"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> SecretHashing {
        SecretHashing {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn hash_and_verify() {
        let hasher = SecretHasher::new(&cheap()).unwrap();
        let phc = hasher.hash("open-sesame").unwrap();

        assert!(phc.starts_with("$argon2id$"));
        assert!(!phc.contains("open-sesame"));
        assert!(hasher.verify("open-sesame", &phc).unwrap());
        assert!(!hasher.verify("open-sesame!", &phc).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = SecretHasher::new(&cheap()).unwrap();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn corrupt_phc_is_an_error() {
        let hasher = SecretHasher::new(&cheap()).unwrap();
        assert!(hasher.verify("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn invalid_params_rejected() {
        let bad = SecretHashing {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            SecretHasher::new(&bad),
            Err(RegistrarError::Config(_))
        ));
    }

    #[test]
    fn empty_session_cannot_sign() {
        let session = SigningSession::new();
        assert!(!session.is_unlocked(3));
        assert!(matches!(
            session.key_for(3),
            Err(RegistrarError::SigningFailure(_))
        ));
    }
}
