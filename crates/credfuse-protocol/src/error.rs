//! Error codes for attestation verification responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned by the public verification endpoint.
///
/// These codes are stable and used for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No key is registered for the attestation's issuer/key pair.
    IssuerUnknown,
    /// The signature does not verify against the registered key.
    SignatureInvalid,
    /// The attestation is past its expiry time.
    PayloadExpired,
    /// The signing key or the attestation itself has been revoked.
    AttestationRevoked,
    /// The nonce is already bound to a different payload.
    ReplayDetected,
    /// The presented content is not a well-formed attestation.
    MalformedPayload,
    /// No attestation is stored under the requested identifier.
    AttestationNotFound,
}

impl ErrorCode {
    /// Returns the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssuerUnknown => "ISSUER_UNKNOWN",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::PayloadExpired => "PAYLOAD_EXPIRED",
            Self::AttestationRevoked => "ATTESTATION_REVOKED",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::AttestationNotFound => "ATTESTATION_NOT_FOUND",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
