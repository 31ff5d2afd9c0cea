//! Per-layer evidence timeouts
//!
//! Every evidence layer gets its own deadline, measured from the moment the
//! collector fans out. Forensics and seal detection legitimately take
//! seconds longer than a QR decode, so the defaults differ per layer.
//!
//! `grace_ms` bounds how long the collector keeps waiting for outstanding
//! layers after the caller cancels the request.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::evidence::LayerKind;

/// Upper bound for any single timeout value (5 minutes).
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerTimeouts {
    /// Field extraction (default: 10000)
    pub extraction_ms: u64,

    /// Issuer database lookup (default: 5000)
    pub database_match_ms: u64,

    /// Image forensics (default: 20000)
    pub forensics_ms: u64,

    /// Seal and signature detection (default: 20000)
    pub signature_seal_ms: u64,

    /// QR decode and integrity check (default: 3000)
    pub qr_integrity_ms: u64,

    /// Wait after cancellation before giving up on outstanding layers (default: 2000)
    pub grace_ms: u64,
}

impl Default for LayerTimeouts {
    fn default() -> Self {
        Self {
            extraction_ms: 10_000,
            database_match_ms: 5_000,
            forensics_ms: 20_000,
            signature_seal_ms: 20_000,
            qr_integrity_ms: 3_000,
            grace_ms: 2_000,
        }
    }
}

impl LayerTimeouts {
    /// Same timeout for every layer; handy for tests and batch tooling.
    pub fn uniform(layer_ms: u64, grace_ms: u64) -> Self {
        Self {
            extraction_ms: layer_ms,
            database_match_ms: layer_ms,
            forensics_ms: layer_ms,
            signature_seal_ms: layer_ms,
            qr_integrity_ms: layer_ms,
            grace_ms,
        }
    }

    /// Timeout in milliseconds for a layer
    pub fn millis_for(&self, layer: LayerKind) -> u64 {
        match layer {
            LayerKind::Extraction => self.extraction_ms,
            LayerKind::DatabaseMatch => self.database_match_ms,
            LayerKind::Forensics => self.forensics_ms,
            LayerKind::SignatureSeal => self.signature_seal_ms,
            LayerKind::QrIntegrity => self.qr_integrity_ms,
        }
    }

    /// Timeout for a layer
    pub fn for_layer(&self, layer: LayerKind) -> Duration {
        Duration::from_millis(self.millis_for(layer))
    }

    /// Grace period after cancellation
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Validate timeout bounds
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        // each layer timeout must be in (0, MAX_TIMEOUT_MS]
        for layer in LayerKind::ALL {
            let value = self.millis_for(layer);
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(TimeoutValidationError::LayerOutOfBounds { layer, value });
            }
        }

        // grace may be zero (give up immediately) but not unbounded
        if self.grace_ms > MAX_TIMEOUT_MS {
            return Err(TimeoutValidationError::GraceOutOfBounds {
                value: self.grace_ms,
            });
        }

        Ok(())
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("{layer} timeout must be in (0, 300000] ms, got {value}")]
    LayerOutOfBounds { layer: LayerKind, value: u64 },

    #[error("grace_ms must be in [0, 300000], got {value}")]
    GraceOutOfBounds { value: u64 },
}
