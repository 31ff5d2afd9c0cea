//! Per-layer evidence
//!
//! Each evidence layer is produced by an external collaborator (extraction
//! models, forensics, seal detection, QR decode, issuer database lookup) and
//! arrives here as a [`LayerResult`]. A layer that could not be produced is
//! an explicit [`LayerResult::Unavailable`], never a default score.

mod collector;

pub use collector::{
    evidence_fn, Collection, EvidenceError, EvidenceSource, LayerCollector, LayerOutcome,
    LayerTiming,
};
pub(crate) use collector::millis;

use credfuse_protocol::CertificateFields;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Evidence layer identity.
///
/// The declaration order is the slot order used by the collector and the
/// order in which layers appear in a verification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Extraction,
    DatabaseMatch,
    Forensics,
    SignatureSeal,
    QrIntegrity,
}

impl LayerKind {
    /// All layers in slot order.
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Extraction,
        LayerKind::DatabaseMatch,
        LayerKind::Forensics,
        LayerKind::SignatureSeal,
        LayerKind::QrIntegrity,
    ];

    /// Slot index of this layer.
    pub fn position(&self) -> usize {
        match self {
            LayerKind::Extraction => 0,
            LayerKind::DatabaseMatch => 1,
            LayerKind::Forensics => 2,
            LayerKind::SignatureSeal => 3,
            LayerKind::QrIntegrity => 4,
        }
    }

    /// Returns the snake_case name of the layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Extraction => "extraction",
            LayerKind::DatabaseMatch => "database_match",
            LayerKind::Forensics => "forensics",
            LayerKind::SignatureSeal => "signature_seal",
            LayerKind::QrIntegrity => "qr_integrity",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field extraction evidence (document model / OCR ensemble / VLM fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEvidence {
    /// Aggregate extraction confidence in [0, 1].
    pub score: f64,

    /// Extracted certificate fields.
    #[serde(default)]
    pub fields: CertificateFields,

    /// Per-field confidence reported by the extractor.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_confidences: BTreeMap<String, f64>,

    /// Extraction method that produced the fields (e.g. "primary", "ocr_fallback").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Additional producer-specific measurements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

/// Issuer database lookup evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMatchEvidence {
    /// Match confidence in [0, 1] (0 when no record matched).
    pub score: f64,

    /// Whether a matching issuer record was found.
    pub match_found: bool,

    /// The matched record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<CertificateFields>,

    /// Additional producer-specific measurements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

/// Image forensics evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicsEvidence {
    /// Authenticity score in [0, 1] (higher is less likely tampered).
    pub score: f64,

    /// Probability in [0, 1] that the image was tampered with.
    pub tamper_probability: f64,

    /// Copy-move detector output, if run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_move_score: Option<f64>,

    /// Named tampering indicators that fired.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tamper_types: Vec<String>,

    /// Comparison against a reference image hash, when one was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_match: Option<bool>,

    /// Additional producer-specific measurements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

/// Seal and signature detection evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSealEvidence {
    /// Authenticity score in [0, 1].
    pub score: f64,

    /// Number of institutional seals detected.
    #[serde(default)]
    pub seals_detected: u32,

    /// Number of handwritten/digital signatures detected.
    #[serde(default)]
    pub signatures_detected: u32,

    /// Outcome of cryptographic signature validation, when one was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,

    /// Additional producer-specific measurements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

/// QR code integrity evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrIntegrityEvidence {
    /// Integrity score in [0, 1].
    pub score: f64,

    /// Whether a QR code was found on the document.
    #[serde(default)]
    pub qr_detected: bool,

    /// Whether the QR code decoded to an attestation envelope.
    #[serde(default)]
    pub qr_decoded: bool,

    /// Outcome of the embedded signature check, when one was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,

    /// Whether the embedded issuer is known.
    #[serde(default)]
    pub issuer_verified: bool,

    /// Fields embedded in the QR payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<CertificateFields>,

    /// Additional producer-specific measurements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

/// Result of one evidence layer for one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerResult {
    Extraction(ExtractionEvidence),
    DatabaseMatch(DatabaseMatchEvidence),
    Forensics(ForensicsEvidence),
    SignatureSeal(SignatureSealEvidence),
    QrIntegrity(QrIntegrityEvidence),
    Unavailable { layer: LayerKind, reason: String },
}

impl LayerResult {
    /// Create an unavailable marker for a layer.
    pub fn unavailable(layer: LayerKind, reason: impl Into<String>) -> Self {
        LayerResult::Unavailable {
            layer,
            reason: reason.into(),
        }
    }

    /// The layer this result belongs to.
    pub fn layer(&self) -> LayerKind {
        match self {
            LayerResult::Extraction(_) => LayerKind::Extraction,
            LayerResult::DatabaseMatch(_) => LayerKind::DatabaseMatch,
            LayerResult::Forensics(_) => LayerKind::Forensics,
            LayerResult::SignatureSeal(_) => LayerKind::SignatureSeal,
            LayerResult::QrIntegrity(_) => LayerKind::QrIntegrity,
            LayerResult::Unavailable { layer, .. } => *layer,
        }
    }

    /// Normalized score, or None for an unavailable layer.
    pub fn score(&self) -> Option<f64> {
        match self {
            LayerResult::Extraction(e) => Some(e.score),
            LayerResult::DatabaseMatch(e) => Some(e.score),
            LayerResult::Forensics(e) => Some(e.score),
            LayerResult::SignatureSeal(e) => Some(e.score),
            LayerResult::QrIntegrity(e) => Some(e.score),
            LayerResult::Unavailable { .. } => None,
        }
    }

    /// Returns true unless this is an unavailable marker.
    pub fn is_available(&self) -> bool {
        !matches!(self, LayerResult::Unavailable { .. })
    }

    /// Reason the layer is unavailable, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            LayerResult::Unavailable { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Check that every probability-like value is finite and within [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        let mut checks: Vec<(&str, f64)> = Vec::new();
        if let Some(score) = self.score() {
            checks.push(("score", score));
        }
        if let LayerResult::Forensics(f) = self {
            checks.push(("tamper_probability", f.tamper_probability));
            if let Some(copy_move) = f.copy_move_score {
                checks.push(("copy_move_score", copy_move));
            }
        }

        for (name, value) in checks {
            if !is_unit_interval(value) {
                return Err(format!(
                    "{} layer reported {} = {} outside [0, 1]",
                    self.layer(),
                    name,
                    value
                ));
            }
        }
        Ok(())
    }
}

/// Returns true if `value` is finite and within [0, 1].
pub fn is_unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Find the first available result for a layer.
pub fn find_layer(layers: &[LayerResult], kind: LayerKind) -> Option<&LayerResult> {
    layers
        .iter()
        .find(|result| result.layer() == kind && result.is_available())
}

/// Find forensics evidence, if available.
pub fn forensics(layers: &[LayerResult]) -> Option<&ForensicsEvidence> {
    layers.iter().find_map(|result| match result {
        LayerResult::Forensics(f) => Some(f),
        _ => None,
    })
}

/// Find extraction evidence, if available.
pub fn extraction(layers: &[LayerResult]) -> Option<&ExtractionEvidence> {
    layers.iter().find_map(|result| match result {
        LayerResult::Extraction(e) => Some(e),
        _ => None,
    })
}

/// Find database match evidence, if available.
pub fn database_match(layers: &[LayerResult]) -> Option<&DatabaseMatchEvidence> {
    layers.iter().find_map(|result| match result {
        LayerResult::DatabaseMatch(d) => Some(d),
        _ => None,
    })
}

/// Find signature/seal evidence, if available.
pub fn signature_seal(layers: &[LayerResult]) -> Option<&SignatureSealEvidence> {
    layers.iter().find_map(|result| match result {
        LayerResult::SignatureSeal(s) => Some(s),
        _ => None,
    })
}

/// Find QR integrity evidence, if available.
pub fn qr_integrity(layers: &[LayerResult]) -> Option<&QrIntegrityEvidence> {
    layers.iter().find_map(|result| match result {
        LayerResult::QrIntegrity(q) => Some(q),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forensics_result(score: f64, tamper: f64) -> LayerResult {
        LayerResult::Forensics(ForensicsEvidence {
            score,
            tamper_probability: tamper,
            copy_move_score: None,
            tamper_types: Vec::new(),
            hash_match: None,
            details: BTreeMap::new(),
        })
    }

    #[test]
    fn test_layer_positions_match_all_order() {
        for (index, kind) in LayerKind::ALL.iter().enumerate() {
            assert_eq!(kind.position(), index);
        }
    }

    #[test]
    fn test_unavailable_has_no_score() {
        let result = LayerResult::unavailable(LayerKind::Forensics, "timed out");
        assert_eq!(result.layer(), LayerKind::Forensics);
        assert_eq!(result.score(), None);
        assert_eq!(result.unavailable_reason(), Some("timed out"));
        assert!(!result.is_available());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(forensics_result(0.9, 0.1).validate().is_ok());
        assert!(forensics_result(1.2, 0.1).validate().is_err());
        assert!(forensics_result(0.9, f64::NAN).validate().is_err());
        assert!(forensics_result(-0.1, 0.1).validate().is_err());
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(LayerResult::unavailable(
            LayerKind::QrIntegrity,
            "no QR code found",
        ))
        .unwrap();
        assert_eq!(json["kind"], "unavailable");
        assert_eq!(json["layer"], "qr_integrity");

        let parsed: LayerResult = serde_json::from_str(
            r#"{"kind":"forensics","score":0.8,"tamper_probability":0.2}"#,
        )
        .unwrap();
        assert_eq!(parsed, forensics_result(0.8, 0.2));
    }

    #[test]
    fn test_find_layer_skips_unavailable() {
        let layers = vec![
            LayerResult::unavailable(LayerKind::Forensics, "error"),
            forensics_result(0.7, 0.3),
        ];
        assert_eq!(find_layer(&layers, LayerKind::Forensics).and_then(LayerResult::score), Some(0.7));
        assert!(find_layer(&layers, LayerKind::Extraction).is_none());
    }
}
