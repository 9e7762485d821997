// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for staff and students using the dashboard.
//
// Every provenance failure is a deterministic function of its inputs (wrong
// key, wrong state, tampered bytes), so nothing here is ever marked retriable.
// Decode and verify failures are reported as failures, never as "maybe".

use crate::error::RegistrarError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The user must do something (enter the right secret, pick the right key).
    ActionRequired,
    /// An administrator must step in (expired certificate, missing records).
    AdminRequired,
    /// Cannot be fixed by the user at all (tampered file, forged signature).
    Permanent,
}

/// A human-readable error with plain message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

fn human(message: &str, suggestion: impl Into<String>, severity: Severity) -> HumanError {
    HumanError {
        message: message.into(),
        suggestion: suggestion.into(),
        retriable: false,
        severity,
    }
}

/// Convert a `RegistrarError` into a `HumanError`.
pub fn humanize_error(err: &RegistrarError) -> HumanError {
    use Severity::*;

    match err {
        // -- Containers --
        RegistrarError::InvalidFormat(_) => human(
            "This file is not a secure academic export.",
            "Choose a .secure or .pdf file that was exported by the records system.",
            ActionRequired,
        ),
        RegistrarError::DecryptionFailure(_) | RegistrarError::MalformedPayload(_) => human(
            "This file could not be opened: wrong key or corrupted file.",
            "Make sure you are opening a file that was exported for you, and that it has not been edited.",
            ActionRequired,
        ),
        RegistrarError::Encryption(detail) | RegistrarError::Pdf(detail) => human(
            "The export could not be encrypted.",
            format!("Ask an administrator to check the recipient's keys. ({detail})"),
            AdminRequired,
        ),

        // -- Keys and secrets --
        RegistrarError::KeyAccessSecretTooShort { min } => human(
            "That key access password is too short.",
            format!("Choose a password with at least {min} characters."),
            ActionRequired,
        ),
        RegistrarError::KeyAccessSecretAlreadySet(_) => human(
            "You already have a key access password.",
            "Use your existing key access password.",
            ActionRequired,
        ),
        RegistrarError::KeyAccessSecretNotSet(_) => human(
            "You have not chosen a key access password yet.",
            "Set a key access password before generating or viewing your keys.",
            ActionRequired,
        ),
        RegistrarError::KeyAccessDenied(_) => human(
            "That key access password is not correct.",
            "Enter the key access password you chose, not your login password.",
            ActionRequired,
        ),
        RegistrarError::KeyGeneration(_) | RegistrarError::InvalidKey(_) => human(
            "Your signing keys could not be used.",
            "Ask an administrator to regenerate your keys.",
            AdminRequired,
        ),
        RegistrarError::CertificateExpired { valid_until, .. } => human(
            "Your signing certificate has expired.",
            format!("It was valid until {valid_until}. Generate new keys to keep signing."),
            AdminRequired,
        ),
        RegistrarError::InvalidCertificate(_) => human(
            "A signing certificate failed its integrity check.",
            "Do not trust signatures made under it. Ask an administrator to investigate.",
            Permanent,
        ),

        // -- Workflow --
        RegistrarError::SigningFailure(_) => human(
            "The result could not be signed.",
            "Unlock your signing key with your key access password, then try again.",
            ActionRequired,
        ),
        RegistrarError::SignatureInvalid(_) => human(
            "A signature on this result does not match the record.",
            "The result may have been changed after it was signed. Ask an administrator to investigate.",
            Permanent,
        ),
        RegistrarError::InvalidTransition { from, action, .. } => human(
            "That action is not possible right now.",
            format!("A {from} result cannot be asked to {action}. Refresh to see its current state."),
            ActionRequired,
        ),
        RegistrarError::Unauthorized { action, .. } => human(
            "You are not allowed to do that.",
            format!("Only staff responsible for this course can {action} it."),
            ActionRequired,
        ),
        RegistrarError::DenialReasonRequired => human(
            "Please give a reason.",
            "Denied results must say why, so the lecturer can correct them.",
            ActionRequired,
        ),
        RegistrarError::InvalidScores(detail) => human(
            "Those scores are not valid.",
            format!("Check the continuous assessment and exam scores. ({detail})"),
            ActionRequired,
        ),
        RegistrarError::UnknownAction(action) => human(
            "Unknown action.",
            format!("'{action}' is not something a result can be signed for."),
            Permanent,
        ),
        RegistrarError::Encoding(_) | RegistrarError::IntegrityMismatch { .. } => human(
            "This record's contents do not match what was signed.",
            "Do not trust this record. Ask an administrator to investigate.",
            Permanent,
        ),

        // -- Storage --
        RegistrarError::NotFound { kind, .. } => human(
            "Something we needed is missing.",
            format!("The {kind} could not be found. It may have been removed."),
            AdminRequired,
        ),
        RegistrarError::Database(_)
        | RegistrarError::Io(_)
        | RegistrarError::Serialization(_)
        | RegistrarError::Config(_) => human(
            "The records system had an internal problem.",
            "Ask an administrator to check the server logs.",
            AdminRequired,
        ),
    }
}
