//! Attestation errors

use chrono::{DateTime, Utc};
use credfuse_protocol::ErrorCode;
use thiserror::Error;

use crate::decision::VerificationStatus;
use crate::keys::KeyRegistryError;
use crate::signing::SigningError;

/// Why a presented attestation failed verification.
///
/// Messages are single-line and safe to show to the public.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    #[error("malformed attestation: {0}")]
    Malformed(String),

    #[error("unknown issuer key {issuer_id}/{key_id}")]
    IssuerUnknown { issuer_id: String, key_id: String },

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("attestation expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("signing key {issuer_id}/{key_id} has been revoked")]
    KeyRevoked { issuer_id: String, key_id: String },

    #[error("attestation has been revoked: {reason}")]
    Revoked { reason: String },

    #[error("nonce {nonce} was already used for a different payload")]
    Replay { nonce: String },

    #[error("attestation {0} not found")]
    NotFound(String),
}

impl AttestationError {
    /// Stable wire code
    pub fn code(&self) -> ErrorCode {
        match self {
            AttestationError::Malformed(_) => ErrorCode::MalformedPayload,
            AttestationError::IssuerUnknown { .. } => ErrorCode::IssuerUnknown,
            AttestationError::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            AttestationError::Expired { .. } => ErrorCode::PayloadExpired,
            AttestationError::KeyRevoked { .. } | AttestationError::Revoked { .. } => {
                ErrorCode::AttestationRevoked
            }
            AttestationError::Replay { .. } => ErrorCode::ReplayDetected,
            AttestationError::NotFound(_) => ErrorCode::AttestationNotFound,
        }
    }
}

/// Why an attestation could not be issued.
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("verification {id} is {status}; only verified records can be attested")]
    NotAttestable { id: String, status: VerificationStatus },

    #[error("signing key is not registered: {0}")]
    UnknownKey(#[source] KeyRegistryError),

    #[error("signing key {issuer_id}/{key_id} is revoked")]
    KeyRevoked { issuer_id: String, key_id: String },

    #[error("signing key {issuer_id}/{key_id} has been superseded by rotation")]
    KeySuperseded { issuer_id: String, key_id: String },

    #[error("signer public key does not match registered key {issuer_id}/{key_id}")]
    KeyMismatch { issuer_id: String, key_id: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("QR payload is {size} bytes; QR binary capacity is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("nonce collision for {0}")]
    NonceCollision(String),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AttestationError::Malformed("x".into()).code(),
            ErrorCode::MalformedPayload
        );
        assert_eq!(
            AttestationError::KeyRevoked {
                issuer_id: "i".into(),
                key_id: "k".into()
            }
            .code(),
            ErrorCode::AttestationRevoked
        );
        assert_eq!(
            AttestationError::Revoked { reason: "r".into() }.code(),
            ErrorCode::AttestationRevoked
        );
        assert_eq!(
            AttestationError::Replay { nonce: "ab".into() }.code(),
            ErrorCode::ReplayDetected
        );
    }

    #[test]
    fn test_messages_are_single_line() {
        let err = AttestationError::IssuerUnknown {
            issuer_id: "inst-01".into(),
            key_id: "k1".into(),
        };
        assert_eq!(err.to_string(), "unknown issuer key inst-01/k1");
        assert!(!err.to_string().contains('\n'));
    }
}
