// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// registrar-security — Cryptographic provenance for academic records.
//
// Integrity hashing, per-principal RSA key custody with self-hashed
// certificates, hybrid-encrypted export containers, detached action
// signatures, and the audit trail they report to.

pub mod audit;
pub mod certificates;
pub mod container;
pub mod custody;
pub mod integrity;
pub mod keys;
pub mod sealing;
pub mod signature;

pub use audit::{AuditLog, AuditSink};
pub use container::{ContainerVariant, SecureContainerCodec};
pub use custody::{SigningSession, UnlockedKey};
pub use integrity::{hash_bytes, hash_canonical, hash_str, verify_hash};
pub use keys::{KeyManager, parse_private_key, parse_public_key};
