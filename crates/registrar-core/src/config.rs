// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provenance configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RegistrarError, Result};

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE: &str = "registrar.json";

/// What happens to an earlier signature when the same action is signed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerPolicy {
    /// The current signature is replaced and every signature is also kept in
    /// the record's append-only history.
    AppendOnly,
    /// The current signature is replaced and no history is kept.
    Overwrite,
}

/// Argon2id cost parameters for hashing key access secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretHashing {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for SecretHashing {
    fn default() -> Self {
        // OWASP minimum for Argon2id.
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Persistent provenance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvenanceConfig {
    /// RSA modulus size for new key pairs.
    pub rsa_key_bits: usize,
    /// Validity window of newly issued certificates.
    pub certificate_validity_days: i64,
    /// Issuer label written into self-issued certificates.
    pub certificate_issuer: String,
    /// Minimum length of a key access secret.
    pub min_secret_length: usize,
    pub secret_hashing: SecretHashing,
    pub ledger_policy: LedgerPolicy,
    /// When true, approval leads to `Approved` and a separate signed publish step
    /// makes the result visible.
    pub separate_publication: bool,
    /// Emit provenance events to the audit sink.
    pub audit_enabled: bool,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            rsa_key_bits: 2048,
            certificate_validity_days: 365,
            certificate_issuer: "Registrar Records Authority".to_owned(),
            min_secret_length: 6,
            secret_hashing: SecretHashing::default(),
            ledger_policy: LedgerPolicy::AppendOnly,
            separate_publication: false,
            audit_enabled: true,
        }
    }
}

impl ProvenanceConfig {
    /// Reject settings that would weaken the scheme below what it promises.
    pub fn validate(&self) -> Result<()> {
        if self.rsa_key_bits < 2048 {
            return Err(RegistrarError::Config(format!(
                "rsa_key_bits must be at least 2048, got {}",
                self.rsa_key_bits
            )));
        }
        if self.certificate_validity_days <= 0 {
            return Err(RegistrarError::Config(
                "certificate_validity_days must be positive".into(),
            ));
        }
        if self.min_secret_length == 0 {
            return Err(RegistrarError::Config(
                "min_secret_length must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Load `registrar.json` from `data_dir`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        let Ok(data) = std::fs::read_to_string(&path) else {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        };
        match serde_json::from_str::<Self>(&data) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                Self::default()
            }
        }
    }

    /// Write the configuration to `registrar.json` in `data_dir`.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        let path = data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }
}
