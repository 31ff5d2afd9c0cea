//! Replay registry, revocation list and attestation store
//!
//! Persistence technology is the caller's choice; these traits are the
//! contract and the in-memory implementations back tests and the CLI.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::SignedAttestation;

/// Nonces seen at issuance, with the digest of the payload they signed.
pub trait ReplayRegistry: Send + Sync {
    /// Record a nonce. Returns false if the nonce was already present.
    fn record(&self, nonce: &str, payload_digest: &str) -> bool;

    /// Digest recorded for a nonce
    fn lookup(&self, nonce: &str) -> Option<String>;
}

/// Attestations revoked out-of-band, keyed by nonce.
pub trait RevocationList: Send + Sync {
    /// Revoke. Returns false if already revoked.
    fn revoke(&self, nonce: &str, reason: &str) -> bool;

    /// Revocation reason, if revoked
    fn reason(&self, nonce: &str) -> Option<String>;
}

/// Issued attestations keyed by nonce (the attestation id).
pub trait AttestationStore: Send + Sync {
    fn put(&self, attestation: SignedAttestation);

    fn get(&self, id: &str) -> Option<SignedAttestation>;
}

#[derive(Debug, Default)]
pub struct MemoryReplayRegistry {
    digests: RwLock<HashMap<String, String>>,
}

impl MemoryReplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayRegistry for MemoryReplayRegistry {
    fn record(&self, nonce: &str, payload_digest: &str) -> bool {
        let mut digests = self.digests.write().unwrap_or_else(PoisonError::into_inner);
        if digests.contains_key(nonce) {
            return false;
        }
        digests.insert(nonce.to_string(), payload_digest.to_string());
        true
    }

    fn lookup(&self, nonce: &str) -> Option<String> {
        self.digests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nonce)
            .cloned()
    }
}

#[derive(Debug, Default)]
pub struct MemoryRevocationList {
    revoked: RwLock<HashMap<String, String>>,
}

impl MemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevocationList for MemoryRevocationList {
    fn revoke(&self, nonce: &str, reason: &str) -> bool {
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        if revoked.contains_key(nonce) {
            return false;
        }
        revoked.insert(nonce.to_string(), reason.to_string());
        true
    }

    fn reason(&self, nonce: &str) -> Option<String> {
        self.revoked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nonce)
            .cloned()
    }
}

#[derive(Debug, Default)]
pub struct MemoryAttestationStore {
    attestations: RwLock<HashMap<String, SignedAttestation>>,
}

impl MemoryAttestationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttestationStore for MemoryAttestationStore {
    fn put(&self, attestation: SignedAttestation) {
        self.attestations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(attestation.id().to_string(), attestation);
    }

    fn get(&self, id: &str) -> Option<SignedAttestation> {
        self.attestations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_registry_first_write_wins() {
        let registry = MemoryReplayRegistry::new();
        assert!(registry.record("ab12", "digest-1"));
        assert!(!registry.record("ab12", "digest-2"));
        assert_eq!(registry.lookup("ab12").as_deref(), Some("digest-1"));
        assert_eq!(registry.lookup("cd34"), None);
    }

    #[test]
    fn test_revocation_list() {
        let list = MemoryRevocationList::new();
        assert!(list.revoke("ab12", "issued in error"));
        assert!(!list.revoke("ab12", "again"));
        assert_eq!(list.reason("ab12").as_deref(), Some("issued in error"));
        assert_eq!(list.reason("cd34"), None);
    }
}
