//! Ed25519 signing and verification over canonical JSON
//!
//! Payloads are signed over their RFC 8785 (JCS) encoding, so any verifier
//! that canonicalizes the same JSON value recomputes the same bytes
//! regardless of key order or whitespace in the transported form.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors from signing/verification operations
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("canonical JSON encoding failed: {0}")]
    Canonical(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

/// RFC 8785 canonical encoding of a serializable value
pub fn canonical_bytes<T: Serialize>(value: &T) -> SigningResult<Vec<u8>> {
    serde_json_canonicalizer::to_vec(value).map_err(|e| SigningError::Canonical(e.to_string()))
}

/// SHA-256 hex digest of the canonical encoding
pub fn payload_digest<T: Serialize>(value: &T) -> SigningResult<String> {
    let bytes = canonical_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Sign the canonical encoding of `value`, returning a base64 signature
pub fn sign_canonical<T: Serialize>(value: &T, key: &SigningKey) -> SigningResult<String> {
    let bytes = canonical_bytes(value)?;
    let signature = key.sign(&bytes);
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        signature.to_bytes(),
    ))
}

/// Verify a base64 signature over the canonical encoding of `value`
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and
/// an error for one that cannot be decoded at all.
pub fn verify_canonical<T: Serialize>(
    value: &T,
    signature_b64: &str,
    key: &VerifyingKey,
) -> SigningResult<bool> {
    let sig_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, signature_b64)?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;

    let bytes = canonical_bytes(value)?;
    Ok(key.verify_strict(&bytes, &signature).is_ok())
}

/// Compute SHA-256 fingerprint of an Ed25519 public key
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// Encode a signing key to base64 for storage
pub fn encode_signing_key(key: &SigningKey) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key.to_bytes())
}

/// Decode a signing key from base64
pub fn decode_signing_key(encoded: &str) -> SigningResult<SigningKey> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim())?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes_array))
}

/// Encode a verifying key to base64 for storage
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key.as_bytes())
}

/// Decode a verifying key from base64
pub fn decode_verifying_key(encoded: &str) -> SigningResult<VerifyingKey> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim())?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes_array).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// An issuer's private key as supplied by the calling context.
///
/// Signing through one handle is serialized: the key is held under a mutex
/// for exactly one signing call.
#[derive(Debug)]
pub struct IssuerSigner {
    issuer_id: String,
    key_id: String,
    key: Mutex<SigningKey>,
    verifying_key: VerifyingKey,
}

impl IssuerSigner {
    pub fn new(issuer_id: impl Into<String>, key_id: impl Into<String>, key: SigningKey) -> Self {
        let verifying_key = key.verifying_key();
        Self {
            issuer_id: issuer_id.into(),
            key_id: key_id.into(),
            key: Mutex::new(key),
            verifying_key,
        }
    }

    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Base64 public key, as registered and as carried in the QR envelope
    pub fn public_key(&self) -> String {
        encode_verifying_key(&self.verifying_key)
    }

    pub fn fingerprint(&self) -> String {
        compute_key_fingerprint(&self.verifying_key)
    }

    /// Sign the canonical encoding of `value`
    pub fn sign<T: Serialize>(&self, value: &T) -> SigningResult<String> {
        let key = self.key.lock().unwrap_or_else(PoisonError::into_inner);
        sign_canonical(value, &key)
    }
}
