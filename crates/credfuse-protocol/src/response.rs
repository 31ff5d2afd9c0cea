//! Public verification response.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::fields::CertificateFields;

/// Response of the public verification endpoint.
///
/// `certificate_details` is present only when `valid` is true; `error` and
/// `error_code` only when it is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicVerificationResponse {
    /// Whether the attestation verified.
    pub valid: bool,

    /// Attested certificate fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_details: Option<CertificateFields>,

    /// Issuing institution (present when valid).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<String>,

    /// Human-readable, single-line error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Stable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl PublicVerificationResponse {
    /// Create a success response.
    pub fn valid(issuer_id: String, certificate_details: CertificateFields) -> Self {
        Self {
            valid: true,
            certificate_details: Some(certificate_details),
            issuer_id: Some(issuer_id),
            error: None,
            error_code: None,
        }
    }

    /// Create a failure response.
    pub fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            certificate_details: None,
            issuer_id: None,
            error: Some(message.into()),
            error_code: Some(code),
        }
    }
}
