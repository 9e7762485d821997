// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Private-key sealing — age (scrypt recipient) encryption of key material
// under the principal's key access secret.
//
// scrypt is memory-hard, so the sealed key at rest is only as weak as the
// secret itself. The raw PKCS#8 PEM is never written to the store.

use std::io::{Read, Write};

use age::secrecy::SecretString;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use registrar_core::error::{RegistrarError, Result};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// Passphrase-based sealing backed by the `age` crate.
///
/// The secret is held only for the lifetime of the `KeySeal` value so that
/// callers can drop it promptly after use.
pub struct KeySeal {
    secret: SecretString,
}

impl KeySeal {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: SecretString::from(secret.to_owned()),
        }
    }

    /// Encrypt `plaintext` into a complete age file.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let encryptor = age::Encryptor::with_user_passphrase(self.secret.clone());
        let mut ciphertext = Vec::new();

        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| RegistrarError::Encryption(e.to_string()))?;
        writer
            .write_all(plaintext)
            .map_err(|e| RegistrarError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| RegistrarError::Encryption(e.to_string()))?;

        debug!(ciphertext_len = ciphertext.len(), "key material sealed");
        Ok(ciphertext)
    }

    /// Decrypt a complete age file produced by [`KeySeal::seal`].
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn open(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let decryptor = age::Decryptor::new(ciphertext)
            .map_err(|e| RegistrarError::DecryptionFailure(e.to_string()))?;

        let identity = age::scrypt::Identity::new(self.secret.clone());

        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|e| RegistrarError::DecryptionFailure(e.to_string()))?;

        let mut plaintext = Zeroizing::new(Vec::new());
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| RegistrarError::DecryptionFailure(e.to_string()))?;

        debug!("key material opened");
        Ok(plaintext)
    }

    /// Seal a PEM private key and return the age file as base64 for storage.
    pub fn seal_pem(&self, pem: &str) -> Result<String> {
        Ok(STANDARD.encode(self.seal(pem.as_bytes())?))
    }

    /// Reverse of [`KeySeal::seal_pem`].
    pub fn open_pem(&self, sealed_b64: &str) -> Result<Zeroizing<String>> {
        let sealed = STANDARD
            .decode(sealed_b64)
            .map_err(|e| RegistrarError::DecryptionFailure(format!("sealed key base64: {e}")))?;
        let plaintext = self.open(&sealed)?;
        let pem = std::str::from_utf8(&plaintext)
            .map_err(|e| RegistrarError::InvalidKey(format!("sealed key is not UTF-8: {e}")))?;
        Ok(Zeroizing::new(pem.to_owned()))
    }
}
