// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secure containers — hybrid RSA-OAEP + AES-256-CBC encryption of exported
// documents into a self-describing artifact.
//
// Per export a fresh AES key and IV are drawn from the system CSPRNG. The
// payload is encrypted with AES-256-CBC (PKCS#7), and only the AES key is
// encrypted with the recipient's RSA public key (OAEP, SHA-256). This keeps
// the payload size unbounded while only the recipient's private key can
// unwrap the AES key.
//
// Version 2.0 containers prefix the plaintext with the SHA-256 of the payload
// JSON before encryption:
//
//   plaintext = SHA-256(json) || json
//
// CBC alone is malleable, so the digest is what turns a flipped IV or
// ciphertext byte into a decode failure. Version 1.0 containers (unframed
// JSON) are still accepted on decode.
//
// Two artifact shapes carry the same container:
//
//   generic  {"magic":"SECURE_ACADEMIC_FILE","version":"2.0",...}
//   pdf      %PDF-1.4 ... %%EOF
//            %ENCRYPTED_DATA:{"magic":"SECURE_ACADEMIC_FILE",...}

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use rand::rngs::OsRng;
use registrar_core::error::{RegistrarError, Result};
use registrar_document::CoverPage;
use ring::rand::{SecureRandom, SystemRandom};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::integrity::digest;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Top-level magic tag of every container.
pub const CONTAINER_MAGIC: &str = "SECURE_ACADEMIC_FILE";
/// Version written by this codec (digest-framed plaintext).
pub const CONTAINER_VERSION: &str = "2.0";
/// Older, unframed plaintext.
pub const LEGACY_CONTAINER_VERSION: &str = "1.0";
/// Prefix of the comment line that carries the container inside a PDF.
pub const PDF_MARKER: &str = "%ENCRYPTED_DATA:";

const AES_KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

const INSTRUCTIONS: &str = "This file is encrypted for a single recipient. Open it in the \
academic records dashboard and provide your private key to decrypt it.";

/// The `{encryptedData, encryptedKey, iv}` triple, all base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub encrypted_data: String,
    pub encrypted_key: String,
    pub iv: String,
}

/// The self-describing container document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureContainer {
    pub magic: String,
    pub version: String,
    pub timestamp: String,
    pub encrypted_content: Envelope,
    pub file_type: String,
    pub instructions: String,
}

/// Physical shape of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerVariant {
    /// Pure JSON container (`.secure`).
    Generic,
    /// Container embedded as a trailing comment in a PDF (`.pdf`).
    Pdf,
}

impl ContainerVariant {
    /// Value of the container's `fileType` field, which is also the file
    /// extension of the artifact.
    pub fn file_type(&self) -> &'static str {
        match self {
            Self::Generic => "secure",
            Self::Pdf => "pdf",
        }
    }
}

// ---------------------------------------------------------------------------
// Hybrid cipher
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` for `recipient`.
#[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
pub fn seal_envelope(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<Envelope> {
    let rng = SystemRandom::new();
    let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
    let mut iv = [0u8; IV_LEN];
    rng.fill(&mut key[..])
        .map_err(|_| RegistrarError::Encryption("system RNG unavailable".into()))?;
    rng.fill(&mut iv)
        .map_err(|_| RegistrarError::Encryption("system RNG unavailable".into()))?;

    let ciphertext = Aes256CbcEnc::new_from_slices(&key[..], &iv)
        .map_err(|e| RegistrarError::Encryption(format!("AES init: {e}")))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let wrapped_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key[..])
        .map_err(|e| RegistrarError::Encryption(format!("RSA-OAEP key wrap: {e}")))?;

    debug!(ciphertext_len = ciphertext.len(), "envelope sealed");
    Ok(Envelope {
        encrypted_data: STANDARD.encode(ciphertext),
        encrypted_key: STANDARD.encode(wrapped_key),
        iv: STANDARD.encode(iv),
    })
}

/// Decrypt an envelope with the recipient's private key.
#[instrument(skip_all)]
pub fn open_envelope(envelope: &Envelope, private_key: &RsaPrivateKey) -> Result<Zeroizing<Vec<u8>>> {
    let wrapped_key = decode_field("encryptedKey", &envelope.encrypted_key)?;
    let iv = decode_field("iv", &envelope.iv)?;
    let ciphertext = decode_field("encryptedData", &envelope.encrypted_data)?;

    let key = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), &wrapped_key)
            .map_err(|e| RegistrarError::DecryptionFailure(format!("RSA-OAEP key unwrap: {e}")))?,
    );
    if key.len() != AES_KEY_LEN {
        return Err(RegistrarError::DecryptionFailure(format!(
            "unwrapped key is {} bytes, expected {AES_KEY_LEN}",
            key.len()
        )));
    }

    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| RegistrarError::DecryptionFailure(format!("AES init: {e}")))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|e| RegistrarError::DecryptionFailure(format!("AES-CBC: {e}")))?;

    debug!(plaintext_len = plaintext.len(), "envelope opened");
    Ok(Zeroizing::new(plaintext))
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| RegistrarError::DecryptionFailure(format!("{name} is not valid base64: {e}")))
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// A container pulled out of an artifact, before decryption.
#[derive(Debug, Clone)]
struct Extracted {
    variant: ContainerVariant,
    version: String,
    envelope: Envelope,
}

/// Encodes payloads into secure containers and back.
#[derive(Debug, Clone)]
pub struct SecureContainerCodec {
    cover: CoverPage,
}

impl Default for SecureContainerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureContainerCodec {
    pub fn new() -> Self {
        Self {
            cover: CoverPage::encrypted_export(),
        }
    }

    /// Use a custom cover page for the PDF variant.
    pub fn with_cover(cover: CoverPage) -> Self {
        Self { cover }
    }

    /// Serialise `payload` as JSON and encrypt it for `recipient`.
    #[instrument(skip(self, payload, recipient))]
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        recipient: &RsaPublicKey,
        variant: ContainerVariant,
    ) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| RegistrarError::Encryption(format!("payload not serialisable: {e}")))?;

        let mut framed = Zeroizing::new(Vec::with_capacity(DIGEST_LEN + json.len()));
        framed.extend_from_slice(&digest(&json));
        framed.extend_from_slice(&json);

        let container = SecureContainer {
            magic: CONTAINER_MAGIC.to_owned(),
            version: CONTAINER_VERSION.to_owned(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            encrypted_content: seal_envelope(&framed, recipient)?,
            file_type: variant.file_type().to_owned(),
            instructions: INSTRUCTIONS.to_owned(),
        };

        let artifact = match variant {
            ContainerVariant::Generic => serde_json::to_vec_pretty(&container)?,
            ContainerVariant::Pdf => {
                let mut pdf = self.cover.render()?;
                if pdf.last() != Some(&b'\n') {
                    pdf.push(b'\n');
                }
                pdf.extend_from_slice(PDF_MARKER.as_bytes());
                // Compact JSON never contains a raw newline.
                pdf.extend_from_slice(&serde_json::to_vec(&container)?);
                pdf.push(b'\n');
                pdf
            }
        };

        debug!(artifact_len = artifact.len(), "container encoded");
        Ok(artifact)
    }

    /// Decrypt an artifact into a typed payload.
    pub fn decode<T: DeserializeOwned>(
        &self,
        artifact: &[u8],
        private_key: &RsaPrivateKey,
    ) -> Result<T> {
        let plaintext = self.decrypt_payload(artifact, private_key)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| RegistrarError::MalformedPayload(e.to_string()))
    }

    /// Decrypt an artifact into untyped JSON.
    pub fn decode_value(
        &self,
        artifact: &[u8],
        private_key: &RsaPrivateKey,
    ) -> Result<serde_json::Value> {
        self.decode(artifact, private_key)
    }

    /// Which shape `content` has, if it is a container at all.
    pub fn detect_variant(&self, content: &[u8]) -> Option<ContainerVariant> {
        extract(content).ok().map(|e| e.variant)
    }

    /// Structural pre-check: a recognised shape with all three envelope fields
    /// present and base64-decodable. No decryption is attempted.
    pub fn is_valid_container(&self, content: &[u8]) -> bool {
        let Ok(extracted) = extract(content) else {
            return false;
        };
        let envelope = &extracted.envelope;
        [
            &envelope.encrypted_data,
            &envelope.encrypted_key,
            &envelope.iv,
        ]
        .iter()
        .all(|field| !field.is_empty() && STANDARD.decode(field.as_str()).is_ok())
    }

    #[instrument(skip_all, fields(artifact_len = artifact.len()))]
    fn decrypt_payload(
        &self,
        artifact: &[u8],
        private_key: &RsaPrivateKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let extracted = extract(artifact)?;
        debug!(variant = ?extracted.variant, version = %extracted.version, "container detected");

        let plaintext = open_envelope(&extracted.envelope, private_key)?;

        match extracted.version.as_str() {
            CONTAINER_VERSION => {
                if plaintext.len() < DIGEST_LEN {
                    return Err(RegistrarError::DecryptionFailure(
                        "plaintext shorter than its integrity digest".into(),
                    ));
                }
                let (expected, json) = plaintext.split_at(DIGEST_LEN);
                if digest(json)[..] != *expected {
                    warn!("container digest mismatch after decryption");
                    return Err(RegistrarError::DecryptionFailure(
                        "integrity digest mismatch: container was modified".into(),
                    ));
                }
                Ok(Zeroizing::new(json.to_vec()))
            }
            LEGACY_CONTAINER_VERSION => Ok(plaintext),
            other => Err(RegistrarError::InvalidFormat(format!(
                "unsupported container version {other}"
            ))),
        }
    }
}

/// Find and parse the container inside `content`.
fn extract(content: &[u8]) -> Result<Extracted> {
    if content.starts_with(b"%PDF-") {
        let line = pdf_marker_line(content).ok_or_else(|| {
            RegistrarError::InvalidFormat("PDF carries no encrypted data line".into())
        })?;
        return parse_embedded(line);
    }

    let value: serde_json::Value = serde_json::from_slice(content)
        .map_err(|e| RegistrarError::InvalidFormat(format!("neither PDF nor JSON: {e}")))?;
    let container = parse_container(value)?;
    Ok(Extracted {
        variant: ContainerVariant::Generic,
        version: container.version,
        envelope: container.encrypted_content,
    })
}

/// The payload of the last `%ENCRYPTED_DATA:` line in a PDF.
fn pdf_marker_line(content: &[u8]) -> Option<&[u8]> {
    content
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter_map(|line| line.strip_prefix(PDF_MARKER.as_bytes()))
        .filter(|rest| !rest.is_empty())
        .last()
}

/// The marker line holds either a full container or a bare envelope.
fn parse_embedded(line: &[u8]) -> Result<Extracted> {
    let value: serde_json::Value = serde_json::from_slice(line)
        .map_err(|e| RegistrarError::InvalidFormat(format!("embedded data is not JSON: {e}")))?;

    if value.get("magic").is_some() {
        let container = parse_container(value)?;
        return Ok(Extracted {
            variant: ContainerVariant::Pdf,
            version: container.version,
            envelope: container.encrypted_content,
        });
    }

    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| RegistrarError::InvalidFormat(format!("embedded envelope: {e}")))?;
    Ok(Extracted {
        variant: ContainerVariant::Pdf,
        version: LEGACY_CONTAINER_VERSION.to_owned(),
        envelope,
    })
}

fn parse_container(value: serde_json::Value) -> Result<SecureContainer> {
    match value.get("magic").and_then(|m| m.as_str()) {
        Some(CONTAINER_MAGIC) => {}
        Some(other) => {
            return Err(RegistrarError::InvalidFormat(format!(
                "unexpected magic tag {other}"
            )));
        }
        None => return Err(RegistrarError::InvalidFormat("missing magic tag".into())),
    }
    serde_json::from_value(value)
        .map_err(|e| RegistrarError::InvalidFormat(format!("incomplete container: {e}")))
}

#[cfg(test)]
mod tests {
    use registrar_document::PdfInspector;
    use serde_json::json;

    use super::*;
    use crate::fixtures;

    fn codec() -> SecureContainerCodec {
        SecureContainerCodec::new()
    }

    fn flip_base64_byte(field: &str, index: usize) -> String {
        let mut bytes = STANDARD.decode(field).unwrap();
        let i = index % bytes.len();
        bytes[i] ^= 0x01;
        STANDARD.encode(bytes)
    }

    fn reencode(container: &SecureContainer) -> Vec<u8> {
        serde_json::to_vec(container).unwrap()
    }

    #[test]
    fn generic_round_trip() {
        let alice = fixtures::alice();
        let payload = json!({
            "student": "Ada",
            "results": [{"course": "CSC301", "grade": "A"}],
        });

        let artifact = codec()
            .encode(&payload, &alice.public_key, ContainerVariant::Generic)
            .unwrap();
        let container: SecureContainer = serde_json::from_slice(&artifact).unwrap();
        assert_eq!(container.magic, CONTAINER_MAGIC);
        assert_eq!(container.version, CONTAINER_VERSION);
        assert_eq!(container.file_type, "secure");

        let decoded = codec().decode_value(&artifact, &alice.private_key).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn container_json_has_interop_field_names() {
        let alice = fixtures::alice();
        let artifact = codec()
            .encode(&json!({"x": 1}), &alice.public_key, ContainerVariant::Generic)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&artifact).unwrap();

        for field in ["magic", "version", "timestamp", "encryptedContent", "fileType", "instructions"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        for field in ["encryptedData", "encryptedKey", "iv"] {
            assert!(value["encryptedContent"].get(field).is_some(), "missing {field}");
        }
        assert_eq!(STANDARD.decode(value["encryptedContent"]["iv"].as_str().unwrap()).unwrap().len(), 16);
    }

    #[test]
    fn pdf_variant_round_trip() {
        let student = fixtures::alice();
        let payload = json!({"gpa": 3.5});

        let artifact = codec()
            .encode(&payload, &student.public_key, ContainerVariant::Pdf)
            .unwrap();
        assert!(artifact.starts_with(b"%PDF-1.4"));
        assert!(pdf_marker_line(&artifact).is_some());

        let decoded = codec().decode_value(&artifact, &student.private_key).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(codec().detect_variant(&artifact), Some(ContainerVariant::Pdf));
    }

    #[test]
    fn pdf_body_is_still_a_pdf() {
        let alice = fixtures::alice();
        let artifact = codec()
            .encode(&json!({"gpa": 4.0}), &alice.public_key, ContainerVariant::Pdf)
            .unwrap();

        let text = String::from_utf8_lossy(&artifact);
        let marker_at = text.find(PDF_MARKER).unwrap();
        let body = &artifact[..marker_at];
        let inspector = PdfInspector::from_bytes(body).unwrap();
        assert_eq!(inspector.page_count(), 1);
    }

    #[test]
    fn wrong_key_is_decryption_failure() {
        let (alice, bob) = (fixtures::alice(), fixtures::bob());
        for variant in [ContainerVariant::Generic, ContainerVariant::Pdf] {
            let artifact = codec()
                .encode(&json!({"secret": true}), &alice.public_key, variant)
                .unwrap();
            let result = codec().decode_value(&artifact, &bob.private_key);
            assert!(
                matches!(result, Err(RegistrarError::DecryptionFailure(_))),
                "{variant:?}: {result:?}"
            );
        }
    }

    #[test]
    fn tampering_any_envelope_field_fails() {
        let alice = fixtures::alice();
        let payload = json!({"gpa": 3.5, "name": "Ada Lovelace", "courses": ["CSC301", "MTH201"]});
        let artifact = codec()
            .encode(&payload, &alice.public_key, ContainerVariant::Generic)
            .unwrap();
        let original: SecureContainer = serde_json::from_slice(&artifact).unwrap();

        let data_len = STANDARD
            .decode(&original.encrypted_content.encrypted_data)
            .unwrap()
            .len();
        let key_len = STANDARD
            .decode(&original.encrypted_content.encrypted_key)
            .unwrap()
            .len();

        let mut tampered = Vec::new();
        for i in 0..IV_LEN {
            let mut c = original.clone();
            c.encrypted_content.iv = flip_base64_byte(&c.encrypted_content.iv, i);
            tampered.push(c);
        }
        for i in (0..data_len).step_by(5) {
            let mut c = original.clone();
            c.encrypted_content.encrypted_data =
                flip_base64_byte(&c.encrypted_content.encrypted_data, i);
            tampered.push(c);
        }
        for i in (0..key_len).step_by(37) {
            let mut c = original.clone();
            c.encrypted_content.encrypted_key =
                flip_base64_byte(&c.encrypted_content.encrypted_key, i);
            tampered.push(c);
        }

        for c in &tampered {
            let result = codec().decode_value(&reencode(c), &alice.private_key);
            assert!(result.is_err(), "tampered container decoded to {result:?}");
        }
    }

    #[test]
    fn missing_magic_is_invalid_format() {
        let alice = fixtures::alice();
        let result = codec().decode_value(br#"{"version":"2.0"}"#, &alice.private_key);
        assert!(matches!(result, Err(RegistrarError::InvalidFormat(_))));

        let result = codec().decode_value(b"%PDF-1.4\n%%EOF\n", &alice.private_key);
        assert!(matches!(result, Err(RegistrarError::InvalidFormat(_))));

        let result = codec().decode_value(b"plain text", &alice.private_key);
        assert!(matches!(result, Err(RegistrarError::InvalidFormat(_))));
    }

    #[test]
    fn legacy_container_with_non_json_is_malformed_payload() {
        let alice = fixtures::alice();
        let container = SecureContainer {
            magic: CONTAINER_MAGIC.into(),
            version: LEGACY_CONTAINER_VERSION.into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            encrypted_content: seal_envelope(b"not json at all", &alice.public_key).unwrap(),
            file_type: "secure".into(),
            instructions: String::new(),
        };

        let result = codec().decode_value(&reencode(&container), &alice.private_key);
        assert!(matches!(result, Err(RegistrarError::MalformedPayload(_))));
    }

    #[test]
    fn legacy_bare_envelope_in_pdf_decodes() {
        let alice = fixtures::alice();
        let envelope = seal_envelope(br#"{"gpa":2.9}"#, &alice.public_key).unwrap();
        let mut artifact = CoverPage::encrypted_export().render().unwrap();
        artifact.extend_from_slice(b"\n%ENCRYPTED_DATA:");
        artifact.extend_from_slice(&serde_json::to_vec(&envelope).unwrap());
        artifact.extend_from_slice(b"\r\n");

        let decoded = codec().decode_value(&artifact, &alice.private_key).unwrap();
        assert_eq!(decoded, json!({"gpa": 2.9}));
    }

    #[test]
    fn unknown_version_is_invalid_format() {
        let alice = fixtures::alice();
        let artifact = codec()
            .encode(&json!({}), &alice.public_key, ContainerVariant::Generic)
            .unwrap();
        let mut container: SecureContainer = serde_json::from_slice(&artifact).unwrap();
        container.version = "9.9".into();

        let result = codec().decode_value(&reencode(&container), &alice.private_key);
        assert!(matches!(result, Err(RegistrarError::InvalidFormat(_))));
    }

    #[test]
    fn structural_check_needs_no_key() {
        let alice = fixtures::alice();
        let artifact = codec()
            .encode(&json!({"a": 1}), &alice.public_key, ContainerVariant::Pdf)
            .unwrap();
        assert!(codec().is_valid_container(&artifact));

        assert!(!codec().is_valid_container(b"{}"));
        assert!(!codec().is_valid_container(
            br#"{"magic":"SECURE_ACADEMIC_FILE","version":"2.0","timestamp":"t",
                "encryptedContent":{"encryptedData":"","encryptedKey":"AA==","iv":"AA=="},
                "fileType":"secure","instructions":""}"#
        ));
        assert!(!codec().is_valid_container(b"%PDF-1.4\n%ENCRYPTED_DATA:\n"));
    }

    #[test]
    fn typed_decode() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Transcript {
            gpa: f64,
            courses: Vec<String>,
        }

        let alice = fixtures::alice();
        let transcript = Transcript {
            gpa: 3.5,
            courses: vec!["CSC301".into()],
        };
        let artifact = codec()
            .encode(&transcript, &alice.public_key, ContainerVariant::Generic)
            .unwrap();
        let decoded: Transcript = codec().decode(&artifact, &alice.private_key).unwrap();
        assert_eq!(decoded, transcript);
    }
}
