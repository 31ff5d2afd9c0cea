//! Institution key registry
//!
//! Issuers sign attestations with their own keys; the registry holds the
//! public half. Keys are addressed by `(issuer_id, key_id)` so that an
//! attestation always resolves the exact key it was signed with, including
//! after rotation.

mod registry;

pub use registry::{KeyRegistry, KeyRegistryFile};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::signing::SigningError;

/// Schema version for the registry file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier for the registry file
pub const SCHEMA_ID: &str = "credfuse/key_registry@1";

/// Errors from key registry operations
#[derive(Debug, Error)]
pub enum KeyRegistryError {
    #[error("key not found: {issuer_id}/{key_id}")]
    NotFound { issuer_id: String, key_id: String },

    #[error("issuer {0} has no current key")]
    NoCurrentKey(String),

    #[error("issuer {issuer_id} already has a current key {key_id}; rotate instead")]
    AlreadyRegistered { issuer_id: String, key_id: String },

    #[error("key {issuer_id}/{key_id} is already revoked")]
    AlreadyRevoked { issuer_id: String, key_id: String },

    #[error("public key is already registered as {issuer_id}/{key_id}")]
    DuplicateKey { issuer_id: String, key_id: String },

    #[error("invalid issuer id: {0}")]
    InvalidIssuerId(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(#[from] SigningError),

    #[error("unsupported registry schema: {0}")]
    UnsupportedSchema(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One issuer public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionKey {
    /// Issuing institution
    pub issuer_id: String,

    /// Key identifier, unique per issuer
    pub key_id: String,

    /// Base64-encoded Ed25519 public key
    pub public_key: String,

    /// SHA-256 fingerprint of the public key (hex)
    pub fingerprint: String,

    /// When the key became valid
    pub valid_from: DateTime<Utc>,

    /// When the key was superseded by a rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    #[serde(default)]
    pub revoked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
}

impl InstitutionKey {
    /// A key is current until it is superseded or revoked.
    pub fn is_current(&self) -> bool {
        self.valid_until.is_none() && !self.revoked
    }

    /// Whether the key was superseded by a rotation
    pub fn is_superseded(&self) -> bool {
        self.valid_until.is_some()
    }
}

/// Validate an issuer identifier
///
/// Rules: 1-128 characters, ASCII alphanumeric plus `-`, `_` and `.`.
pub fn validate_issuer_id(issuer_id: &str) -> Result<(), KeyRegistryError> {
    let valid_chars = issuer_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if issuer_id.is_empty() || issuer_id.len() > 128 || !valid_chars {
        return Err(KeyRegistryError::InvalidIssuerId(issuer_id.to_string()));
    }
    Ok(())
}
