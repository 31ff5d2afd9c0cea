//! credfuse Protocol Types
//!
//! Defines the attestation payload, the QR wire envelope and the public
//! verification response shared by issuers and verifiers.

pub mod envelope;
pub mod error;
pub mod fields;
pub mod payload;
pub mod response;

pub use envelope::{EnvelopeError, QrEnvelope};
pub use error::ErrorCode;
pub use fields::{CertificateFields, FieldName};
pub use payload::AttestationPayload;
pub use response::PublicVerificationResponse;

/// Attestation payload version emitted by this implementation.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Attestation payload type discriminator.
pub const PAYLOAD_TYPE: &str = "certificate_verification";

/// Signature algorithm identifier.
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

/// Largest raw QR content accepted for parsing, in bytes.
pub const MAX_QR_CONTENT_BYTES: usize = 4096;

/// Byte-mode capacity of a version 40 QR symbol at error correction level L.
pub const QR_BINARY_CAPACITY: usize = 2953;
