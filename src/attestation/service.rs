//! Attestation issuance and verification

use chrono::{DateTime, Duration, SubsecRound, Utc};
use credfuse_protocol::{
    AttestationPayload, CertificateFields, PublicVerificationResponse, QrEnvelope, QR_BINARY_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    AttestationError, AttestationStore, IssuanceError, MemoryAttestationStore, MemoryReplayRegistry,
    MemoryRevocationList, ReplayRegistry, RevocationList, SignedAttestation,
};
use crate::keys::KeyRegistry;
use crate::record::VerificationRecord;
use crate::signing::{compute_key_fingerprint, decode_verifying_key, verify_canonical, IssuerSigner};

/// Bytes of randomness in an attestation nonce
const NONCE_BYTES: usize = 16;

/// Longest accepted validity window
const MAX_VALIDITY_DAYS: i64 = 36_500;

/// Attestation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    /// Days from issuance until an attestation expires
    pub validity_days: i64,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self { validity_days: 3650 }
    }
}

impl AttestationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.validity_days < 1 || self.validity_days > MAX_VALIDITY_DAYS {
            return Err(format!(
                "attestation.validity_days must be within [1, {}], got {}",
                MAX_VALIDITY_DAYS, self.validity_days
            ));
        }
        Ok(())
    }
}

/// Issues and verifies attestations.
///
/// Verification only reads: it never records nonces or changes any store.
pub struct AttestationService {
    registry: Arc<KeyRegistry>,
    replay: Arc<dyn ReplayRegistry>,
    revocations: Arc<dyn RevocationList>,
    store: Arc<dyn AttestationStore>,
    config: AttestationConfig,
}

impl AttestationService {
    /// Service backed by in-memory stores
    pub fn new(registry: Arc<KeyRegistry>, config: AttestationConfig) -> Self {
        Self::with_stores(
            registry,
            Arc::new(MemoryReplayRegistry::new()),
            Arc::new(MemoryRevocationList::new()),
            Arc::new(MemoryAttestationStore::new()),
            config,
        )
    }

    pub fn with_stores(
        registry: Arc<KeyRegistry>,
        replay: Arc<dyn ReplayRegistry>,
        revocations: Arc<dyn RevocationList>,
        store: Arc<dyn AttestationStore>,
        config: AttestationConfig,
    ) -> Self {
        Self {
            registry,
            replay,
            revocations,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AttestationConfig {
        &self.config
    }

    /// Issue an attestation for a verified record
    ///
    /// Reviewer corrections on the record are signed; the record itself is
    /// left untouched.
    pub fn issue_for_record(
        &self,
        signer: &IssuerSigner,
        record: &VerificationRecord,
    ) -> Result<SignedAttestation, IssuanceError> {
        if !record.is_attestable() {
            return Err(IssuanceError::NotAttestable {
                id: record.id.clone(),
                status: record.status,
            });
        }
        self.issue(signer, record.issuance_fields())
    }

    /// Issue an attestation directly for certificate fields
    pub fn issue(
        &self,
        signer: &IssuerSigner,
        fields: CertificateFields,
    ) -> Result<SignedAttestation, IssuanceError> {
        self.issue_at(signer, fields, Utc::now())
    }

    pub fn issue_at(
        &self,
        signer: &IssuerSigner,
        fields: CertificateFields,
        now: DateTime<Utc>,
    ) -> Result<SignedAttestation, IssuanceError> {
        self.config.validate().map_err(IssuanceError::InvalidPayload)?;
        if fields.is_empty() {
            return Err(IssuanceError::InvalidPayload(
                "certificate fields are empty".to_string(),
            ));
        }
        self.check_signing_key(signer)?;

        let issued_at = now.trunc_subsecs(0);
        let expires_at = issued_at + Duration::days(self.config.validity_days);
        let payload = AttestationPayload::new(
            signer.issuer_id(),
            signer.key_id(),
            fields,
            generate_nonce(),
            issued_at,
            expires_at,
        );
        payload
            .validate_shape()
            .map_err(IssuanceError::InvalidPayload)?;

        let signature = signer.sign(&payload)?;
        let signed = SignedAttestation {
            payload,
            signature,
            public_key: signer.public_key(),
            public_key_fingerprint: signer.fingerprint(),
        };

        let qr = signed.to_qr_string()?;
        if qr.len() > QR_BINARY_CAPACITY {
            return Err(IssuanceError::TooLarge {
                size: qr.len(),
                limit: QR_BINARY_CAPACITY,
            });
        }

        let digest = signed.digest()?;
        if !self.replay.record(signed.id(), &digest) {
            return Err(IssuanceError::NonceCollision(signed.id().to_string()));
        }
        self.store.put(signed.clone());

        info!(
            attestation_id = %signed.id(),
            issuer_id = %signer.issuer_id(),
            key_id = %signer.key_id(),
            expires_at = %signed.payload.expires_at,
            "issued attestation"
        );
        Ok(signed)
    }

    fn check_signing_key(&self, signer: &IssuerSigner) -> Result<(), IssuanceError> {
        let key = self
            .registry
            .resolve(signer.issuer_id(), signer.key_id())
            .map_err(IssuanceError::UnknownKey)?;

        let ids = || (key.issuer_id.clone(), key.key_id.clone());
        if key.revoked {
            let (issuer_id, key_id) = ids();
            return Err(IssuanceError::KeyRevoked { issuer_id, key_id });
        }
        if key.is_superseded() {
            let (issuer_id, key_id) = ids();
            return Err(IssuanceError::KeySuperseded { issuer_id, key_id });
        }
        if key.fingerprint != signer.fingerprint() {
            let (issuer_id, key_id) = ids();
            return Err(IssuanceError::KeyMismatch { issuer_id, key_id });
        }
        Ok(())
    }

    /// Verify an attestation now
    pub fn verify(&self, attestation: &SignedAttestation) -> Result<(), AttestationError> {
        self.verify_at(attestation, Utc::now())
    }

    /// Verify an attestation as of `now`
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// shape, issuer key, signature, expiry, revocation, replay.
    pub fn verify_at(
        &self,
        attestation: &SignedAttestation,
        now: DateTime<Utc>,
    ) -> Result<(), AttestationError> {
        let payload = &attestation.payload;
        payload.validate_shape().map_err(AttestationError::Malformed)?;

        let key = self
            .registry
            .resolve(&payload.issuer_id, &payload.key_id)
            .map_err(|_| AttestationError::IssuerUnknown {
                issuer_id: payload.issuer_id.clone(),
                key_id: payload.key_id.clone(),
            })?;

        let presented = decode_verifying_key(&attestation.public_key)
            .map_err(|e| AttestationError::SignatureInvalid(format!("public key: {}", e)))?;
        if compute_key_fingerprint(&presented) != key.fingerprint {
            return Err(AttestationError::SignatureInvalid(
                "public key does not match the registered issuer key".to_string(),
            ));
        }
        match verify_canonical(payload, &attestation.signature, &presented) {
            Ok(true) => {}
            Ok(false) => {
                return Err(AttestationError::SignatureInvalid(
                    "signature does not match payload".to_string(),
                ))
            }
            Err(e) => return Err(AttestationError::SignatureInvalid(e.to_string())),
        }

        if now > payload.expires_at {
            return Err(AttestationError::Expired {
                expires_at: payload.expires_at,
            });
        }

        if key.revoked {
            return Err(AttestationError::KeyRevoked {
                issuer_id: key.issuer_id,
                key_id: key.key_id,
            });
        }
        if let Some(reason) = self.revocations.reason(&payload.nonce) {
            return Err(AttestationError::Revoked { reason });
        }

        if let Some(recorded) = self.replay.lookup(&payload.nonce) {
            let digest = attestation
                .digest()
                .map_err(|e| AttestationError::Malformed(e.to_string()))?;
            if recorded != digest {
                return Err(AttestationError::Replay {
                    nonce: payload.nonce.clone(),
                });
            }
        }

        Ok(())
    }

    /// Public verification of raw QR content
    pub fn verify_qr(&self, raw: &str) -> PublicVerificationResponse {
        self.verify_qr_at(raw, Utc::now())
    }

    pub fn verify_qr_at(&self, raw: &str, now: DateTime<Utc>) -> PublicVerificationResponse {
        let result = QrEnvelope::parse(raw)
            .map_err(|e| AttestationError::Malformed(e.to_string()))
            .and_then(|envelope| {
                let attestation = from_untrusted_envelope(envelope);
                self.verify_at(&attestation, now).map(|()| attestation)
            });
        respond(result)
    }

    /// Public verification by attestation id
    pub fn verify_by_id(&self, id: &str) -> PublicVerificationResponse {
        self.verify_by_id_at(id, Utc::now())
    }

    pub fn verify_by_id_at(&self, id: &str, now: DateTime<Utc>) -> PublicVerificationResponse {
        let result = self
            .store
            .get(id)
            .ok_or_else(|| AttestationError::NotFound(id.to_string()))
            .and_then(|attestation| self.verify_at(&attestation, now).map(|()| attestation));
        respond(result)
    }

    /// Look up an issued attestation
    pub fn get(&self, id: &str) -> Option<SignedAttestation> {
        self.store.get(id)
    }

    /// Revoke an issued attestation
    pub fn revoke_attestation(&self, id: &str, reason: &str) -> Result<(), AttestationError> {
        if self.store.get(id).is_none() {
            return Err(AttestationError::NotFound(id.to_string()));
        }
        if self.revocations.revoke(id, reason) {
            info!(attestation_id = %id, reason, "revoked attestation");
        }
        Ok(())
    }
}

fn respond(result: Result<SignedAttestation, AttestationError>) -> PublicVerificationResponse {
    match result {
        Ok(attestation) => {
            PublicVerificationResponse::valid(attestation.payload.issuer_id, attestation.payload.data)
        }
        Err(e) => {
            warn!(code = %e.code(), error = %e, "attestation verification failed");
            PublicVerificationResponse::invalid(e.code(), e.to_string())
        }
    }
}

/// Envelope to attestation without judging the key yet; a bad key is a
/// signature failure, reported after issuer resolution.
fn from_untrusted_envelope(envelope: QrEnvelope) -> SignedAttestation {
    let public_key_fingerprint = decode_verifying_key(&envelope.public_key)
        .map(|key| compute_key_fingerprint(&key))
        .unwrap_or_default();
    SignedAttestation {
        payload: envelope.payload,
        signature: envelope.signature,
        public_key: envelope.public_key,
        public_key_fingerprint,
    }
}

fn generate_nonce() -> String {
    hex::encode(rand::random::<[u8; NONCE_BYTES]>())
}
