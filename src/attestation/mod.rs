//! Signed credential attestations
//!
//! An attestation is a versioned [`AttestationPayload`] signed by the
//! issuing institution's Ed25519 key over its RFC 8785 canonical encoding.
//! It is rendered into a compact JSON string for a QR code and verified
//! later against the key registry, the revocation list and the replay
//! registry.

mod error;
mod service;
mod store;

pub use error::{AttestationError, IssuanceError};
pub use service::{AttestationConfig, AttestationService};
pub use store::{
    AttestationStore, MemoryAttestationStore, MemoryReplayRegistry, MemoryRevocationList,
    ReplayRegistry, RevocationList,
};

use credfuse_protocol::{AttestationPayload, QrEnvelope};
use serde::{Deserialize, Serialize};

use crate::signing::{compute_key_fingerprint, decode_verifying_key, payload_digest, SigningResult};

/// Attestation payload with its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    /// The signed payload
    pub payload: AttestationPayload,

    /// Base64-encoded Ed25519 signature over the canonical payload
    pub signature: String,

    /// Base64-encoded public key of the signer
    pub public_key: String,

    /// SHA-256 fingerprint of the signing public key (hex-encoded)
    pub public_key_fingerprint: String,
}

impl SignedAttestation {
    /// Attestation id (the payload nonce)
    pub fn id(&self) -> &str {
        &self.payload.nonce
    }

    /// SHA-256 of the canonical payload encoding
    pub fn digest(&self) -> SigningResult<String> {
        payload_digest(&self.payload)
    }

    /// QR wire form
    pub fn to_envelope(&self) -> QrEnvelope {
        QrEnvelope {
            payload: self.payload.clone(),
            signature: self.signature.clone(),
            public_key: self.public_key.clone(),
        }
    }

    /// Rebuild from a QR envelope
    pub fn from_envelope(envelope: QrEnvelope) -> SigningResult<Self> {
        let key = decode_verifying_key(&envelope.public_key)?;
        Ok(Self {
            payload: envelope.payload,
            signature: envelope.signature,
            public_key: envelope.public_key,
            public_key_fingerprint: compute_key_fingerprint(&key),
        })
    }

    /// Compact string to encode into a QR code
    pub fn to_qr_string(&self) -> Result<String, serde_json::Error> {
        self.to_envelope().to_qr_string()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
