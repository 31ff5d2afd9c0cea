//! QR wire envelope.
//!
//! The envelope is the exact JSON object rendered into a QR code:
//! `{"payload": {...}, "signature": "<base64>", "public_key": "<base64>"}`.
//! All content arriving through here is untrusted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::AttestationPayload;
use crate::MAX_QR_CONTENT_BYTES;

/// Errors from parsing raw QR content.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("QR content exceeds size limit: {size} bytes > {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("QR content is not a valid attestation envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("attestation payload rejected: {0}")]
    InvalidShape(String),
}

/// Signed attestation as carried in a QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QrEnvelope {
    /// The signed payload.
    pub payload: AttestationPayload,

    /// Base64-encoded signature over the canonical payload encoding.
    pub signature: String,

    /// Base64-encoded public key of the signer.
    pub public_key: String,
}

impl QrEnvelope {
    /// Parse raw QR content, enforcing the size limit first.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        if raw.len() > MAX_QR_CONTENT_BYTES {
            return Err(EnvelopeError::TooLarge {
                size: raw.len(),
                limit: MAX_QR_CONTENT_BYTES,
            });
        }

        let envelope: QrEnvelope = serde_json::from_str(raw.trim())?;
        envelope
            .payload
            .validate_shape()
            .map_err(EnvelopeError::InvalidShape)?;

        Ok(envelope)
    }

    /// Render the compact JSON string to encode into a QR code.
    pub fn to_qr_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
