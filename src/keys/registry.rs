//! Append-only key registry
//!
//! Every change appends a full [`InstitutionKey`] snapshot; the latest
//! snapshot for a `(issuer_id, key_id)` pair is its current state. Nothing
//! is ever removed, so every key that ever signed an attestation stays
//! resolvable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use super::{validate_issuer_id, InstitutionKey, KeyRegistryError, SCHEMA_ID, SCHEMA_VERSION};
use crate::signing::{compute_key_fingerprint, decode_verifying_key, encode_verifying_key};

/// Hex characters of the fingerprint used as key id
const KEY_ID_LEN: usize = 16;

/// On-disk form of the registry log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRegistryFile {
    pub schema_version: u32,
    pub schema_id: String,
    pub entries: Vec<InstitutionKey>,
}

/// Registry of issuer public keys
#[derive(Debug, Default)]
pub struct KeyRegistry {
    entries: RwLock<Vec<InstitutionKey>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<InstitutionKey>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<InstitutionKey>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the first key of an issuer, returning its key id
    pub fn register(&self, issuer_id: &str, public_key: &str) -> Result<String, KeyRegistryError> {
        self.register_at(issuer_id, public_key, Utc::now())
    }

    pub fn register_at(
        &self,
        issuer_id: &str,
        public_key: &str,
        now: DateTime<Utc>,
    ) -> Result<String, KeyRegistryError> {
        validate_issuer_id(issuer_id)?;
        let mut entries = self.write();

        if let Some(current) = current_in(&entries, issuer_id) {
            return Err(KeyRegistryError::AlreadyRegistered {
                issuer_id: issuer_id.to_string(),
                key_id: current.key_id,
            });
        }
        let key = new_key(&entries, issuer_id, public_key, now)?;
        let key_id = key.key_id.clone();
        entries.push(key);

        info!(issuer_id, key_id = %key_id, "registered issuer key");
        Ok(key_id)
    }

    /// Resolve an exact key
    pub fn resolve(&self, issuer_id: &str, key_id: &str) -> Result<InstitutionKey, KeyRegistryError> {
        latest_in(&self.read(), issuer_id, key_id).ok_or_else(|| KeyRegistryError::NotFound {
            issuer_id: issuer_id.to_string(),
            key_id: key_id.to_string(),
        })
    }

    /// The issuer's current (neither superseded nor revoked) key
    pub fn current(&self, issuer_id: &str) -> Result<InstitutionKey, KeyRegistryError> {
        current_in(&self.read(), issuer_id)
            .ok_or_else(|| KeyRegistryError::NoCurrentKey(issuer_id.to_string()))
    }

    /// Latest state of every key of an issuer, in registration order
    pub fn history(&self, issuer_id: &str) -> Vec<InstitutionKey> {
        states(&self.read())
            .into_iter()
            .filter(|k| k.issuer_id == issuer_id)
            .collect()
    }

    /// Latest state of every key, in registration order
    pub fn keys(&self) -> Vec<InstitutionKey> {
        states(&self.read())
    }

    /// Raw append-only log
    pub fn log(&self) -> Vec<InstitutionKey> {
        self.read().clone()
    }

    /// Replace the issuer's current key, returning the new key id
    ///
    /// The previous key is marked superseded; it stays resolvable and is
    /// not revoked, so attestations it signed keep verifying.
    pub fn rotate(&self, issuer_id: &str, new_public_key: &str) -> Result<String, KeyRegistryError> {
        self.rotate_at(issuer_id, new_public_key, Utc::now())
    }

    pub fn rotate_at(
        &self,
        issuer_id: &str,
        new_public_key: &str,
        now: DateTime<Utc>,
    ) -> Result<String, KeyRegistryError> {
        let mut entries = self.write();

        let mut previous = current_in(&entries, issuer_id)
            .ok_or_else(|| KeyRegistryError::NoCurrentKey(issuer_id.to_string()))?;
        let key = new_key(&entries, issuer_id, new_public_key, now)?;
        let key_id = key.key_id.clone();

        previous.valid_until = Some(now);
        info!(
            issuer_id,
            previous_key_id = %previous.key_id,
            key_id = %key_id,
            "rotated issuer key"
        );
        entries.push(previous);
        entries.push(key);
        Ok(key_id)
    }

    /// Revoke a key. Attestations signed with it stop verifying.
    pub fn revoke(&self, issuer_id: &str, key_id: &str, reason: &str) -> Result<(), KeyRegistryError> {
        let mut entries = self.write();

        let mut key = latest_in(&entries, issuer_id, key_id).ok_or_else(|| KeyRegistryError::NotFound {
            issuer_id: issuer_id.to_string(),
            key_id: key_id.to_string(),
        })?;
        if key.revoked {
            return Err(KeyRegistryError::AlreadyRevoked {
                issuer_id: issuer_id.to_string(),
                key_id: key_id.to_string(),
            });
        }

        key.revoked = true;
        key.revocation_reason = Some(reason.to_string());
        info!(issuer_id, key_id, reason, "revoked issuer key");
        entries.push(key);
        Ok(())
    }

    /// Write atomically to file (write-then-rename)
    pub fn save_to_file(&self, path: &Path) -> Result<(), KeyRegistryError> {
        let file = KeyRegistryFile {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            entries: self.log(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Load from file
    pub fn load_from_file(path: &Path) -> Result<Self, KeyRegistryError> {
        let json = fs::read_to_string(path)?;
        let file: KeyRegistryFile = serde_json::from_str(&json)?;
        if file.schema_version != SCHEMA_VERSION || file.schema_id != SCHEMA_ID {
            return Err(KeyRegistryError::UnsupportedSchema(format!(
                "{} v{}",
                file.schema_id, file.schema_version
            )));
        }
        Ok(Self {
            entries: RwLock::new(file.entries),
        })
    }

    /// Load from file, or start empty if it does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self, KeyRegistryError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }
}

fn new_key(
    entries: &[InstitutionKey],
    issuer_id: &str,
    public_key: &str,
    now: DateTime<Utc>,
) -> Result<InstitutionKey, KeyRegistryError> {
    let verifying_key = decode_verifying_key(public_key)?;
    let fingerprint = compute_key_fingerprint(&verifying_key);

    if let Some(existing) = entries.iter().find(|k| k.fingerprint == fingerprint) {
        return Err(KeyRegistryError::DuplicateKey {
            issuer_id: existing.issuer_id.clone(),
            key_id: existing.key_id.clone(),
        });
    }

    Ok(InstitutionKey {
        issuer_id: issuer_id.to_string(),
        key_id: fingerprint[..KEY_ID_LEN].to_string(),
        public_key: encode_verifying_key(&verifying_key),
        fingerprint,
        valid_from: now,
        valid_until: None,
        revoked: false,
        revocation_reason: None,
    })
}

fn latest_in(entries: &[InstitutionKey], issuer_id: &str, key_id: &str) -> Option<InstitutionKey> {
    entries
        .iter()
        .rev()
        .find(|k| k.issuer_id == issuer_id && k.key_id == key_id)
        .cloned()
}

fn states(entries: &[InstitutionKey]) -> Vec<InstitutionKey> {
    let mut seen: Vec<(&str, &str)> = Vec::new();
    let mut out = Vec::new();
    for entry in entries {
        let id = (entry.issuer_id.as_str(), entry.key_id.as_str());
        if !seen.contains(&id) {
            seen.push(id);
            if let Some(latest) = latest_in(entries, id.0, id.1) {
                out.push(latest);
            }
        }
    }
    out
}

fn current_in(entries: &[InstitutionKey], issuer_id: &str) -> Option<InstitutionKey> {
    states(entries)
        .into_iter()
        .rev()
        .find(|k| k.issuer_id == issuer_id && k.is_current())
}
