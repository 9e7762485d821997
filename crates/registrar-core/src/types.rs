// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for academic-record provenance.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistrarError;

/// Stable numeric identifier of a principal (student, lecturer, faculty officer, admin).
pub type PrincipalId = u64;

/// Stable numeric identifier of a result record.
pub type ResultId = u64;

/// Role tag carried by every principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Lecturer,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Lecturer => "lecturer",
            Self::Faculty => "faculty",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "lecturer" => Ok(Self::Lecturer),
            "faculty" => Ok(Self::Faculty),
            "admin" => Ok(Self::Admin),
            other => Err(RegistrarError::Config(format!("unknown role: {other}"))),
        }
    }
}

/// An actor in the records system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Faculty the principal belongs to (drives approval scope).
    pub faculty: Option<String>,
    /// Department the principal belongs to (drives submission scope).
    pub department: Option<String>,
}

// ---------------------------------------------------------------------------
// Certificates and key material
// ---------------------------------------------------------------------------

/// How a certificate's binding is vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TrustAnchor {
    /// The `signature` field is a SHA-256 self-consistency hash. No external CA.
    SelfHashed,
    /// Reserved for certificates countersigned by an external authority.
    CaSigned { authority: String },
}

/// Subject block of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSubject {
    pub id: PrincipalId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Self-issued binding of an RSA public key to a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub serial_number: String,
    pub issuer: String,
    pub subject: CertificateSubject,
    /// SPKI PEM of the bound public key.
    pub public_key: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub trust_anchor: TrustAnchor,
    /// Hex SHA-256 over the canonical JSON of every other field.
    pub signature: String,
}

/// Persisted key material for one principal.
///
/// The private key is only ever stored sealed under the principal's key access
/// secret; see `registrar_security::sealing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyMaterial {
    pub principal_id: PrincipalId,
    /// SPKI PEM.
    pub public_key: String,
    /// Base64 of an age file containing the PKCS#8 PEM private key.
    pub sealed_private_key: String,
    pub certificate: Certificate,
    /// Earlier certificates, oldest first, kept so old signatures stay verifiable.
    #[serde(default)]
    pub superseded_certificates: Vec<Certificate>,
    pub generated_at: DateTime<Utc>,
}

impl StoredKeyMaterial {
    /// Find the current or a superseded certificate by serial number.
    pub fn certificate_by_serial(&self, serial: &str) -> Option<&Certificate> {
        if self.certificate.serial_number == serial {
            return Some(&self.certificate);
        }
        self.superseded_certificates
            .iter()
            .find(|c| c.serial_number == serial)
    }
}

/// Salted hash of the secret that gates private-key disclosure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAccessGate {
    pub principal_id: PrincipalId,
    /// Argon2id PHC string (includes salt and parameters).
    pub secret_hash: String,
    pub established_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Lifecycle states of a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Being prepared by its author; not yet attested.
    Draft,
    /// Submitted and signed, awaiting a faculty decision.
    Pending,
    /// Approved but not yet visible to the student (only when publication is separate).
    Approved,
    /// Visible to the student. Terminal for the cycle.
    Published,
    /// Rejected with a reason. Terminal for the cycle; may be revised.
    Denied,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of actions that can be signed on a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedAction {
    Submit,
    Approve,
    Deny,
    Publish,
}

impl SignedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for SignedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignedAction {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(Self::Submit),
            "approve" => Ok(Self::Approve),
            "deny" => Ok(Self::Deny),
            "publish" => Ok(Self::Publish),
            other => Err(RegistrarError::UnknownAction(other.to_owned())),
        }
    }
}

/// Letter grade derived from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    /// Grade point on a five-point scale.
    pub fn points(&self) -> u8 {
        match self {
            Self::A => 5,
            Self::B => 4,
            Self::C => 3,
            Self::D => 2,
            Self::E => 1,
            Self::F => 0,
        }
    }
}

/// One signature in a result record's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub actor_id: PrincipalId,
    pub actor_name: String,
    pub actor_email: String,
    /// Base64 RSASSA-PKCS1-v1_5 / SHA-256 signature.
    pub signature: String,
    /// The exact timestamp that was signed (RFC 3339, milliseconds, `Z`).
    pub timestamp: String,
    pub action: SignedAction,
    /// The content hash inside the signed tuple.
    pub content_hash: String,
    /// Serial of the certificate whose key produced the signature.
    pub certificate_serial: String,
    /// Submission cycle the signature belongs to.
    pub cycle: u32,
}

/// Identity of whoever submitted a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitterInfo {
    pub id: PrincipalId,
    pub email: String,
    pub name: String,
}

/// Request metadata captured at submission time by the calling layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Continuous-assessment and examination scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub ca: f64,
    pub exam: f64,
}

/// Input for creating a new result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResult {
    pub student_id: PrincipalId,
    pub course_code: String,
    pub semester: String,
    pub session: String,
    pub faculty: String,
    pub department: String,
    pub scores: Scores,
}

/// The business entity governed by the approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: ResultId,
    pub student_id: PrincipalId,
    pub course_code: String,
    pub semester: String,
    pub session: String,
    pub faculty: String,
    pub department: String,
    pub ca_score: f64,
    pub exam_score: f64,
    pub total: f64,
    pub grade: Grade,
    pub status: ResultStatus,
    pub author_id: PrincipalId,
    /// Submission cycle, starting at 1. Incremented when a denied result is revised.
    pub cycle: u32,

    pub approved_by: Option<PrincipalId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,

    /// SHA-256 of the canonical submission payload, set on submit.
    pub hash: Option<String>,
    pub submitted_by: Option<SubmitterInfo>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,

    /// Current signature per action for this cycle.
    #[serde(default)]
    pub signatures: BTreeMap<SignedAction, SignatureRecord>,
    /// Every signature ever placed on this record, oldest first.
    #[serde(default)]
    pub signature_history: Vec<SignatureRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
