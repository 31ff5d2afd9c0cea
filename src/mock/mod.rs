//! Mock evidence for tests and demos
//!
//! Builds clean, internally consistent layer results (the same certificate
//! fields in every source, no tamper indicators, valid signatures) and
//! evidence sources with configurable delay or failure. Tests then perturb
//! the one signal they care about.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use credfuse_protocol::CertificateFields;

use crate::evidence::{
    evidence_fn, DatabaseMatchEvidence, EvidenceError, EvidenceSource, ExtractionEvidence,
    ForensicsEvidence, LayerKind, LayerResult, QrIntegrityEvidence, SignatureSealEvidence,
};

/// Tamper probability reported by clean forensics evidence.
pub const CLEAN_TAMPER_PROBABILITY: f64 = 0.05;

/// Per-layer scores; `None` makes the layer unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreSet {
    pub extraction: Option<f64>,
    pub database_match: Option<f64>,
    pub forensics: Option<f64>,
    pub signature_seal: Option<f64>,
    pub qr_integrity: Option<f64>,
}

impl ScoreSet {
    /// Every layer present with the same score.
    pub fn uniform(score: f64) -> Self {
        Self {
            extraction: Some(score),
            database_match: Some(score),
            forensics: Some(score),
            signature_seal: Some(score),
            qr_integrity: Some(score),
        }
    }

    /// Score for a layer.
    pub fn get(&self, layer: LayerKind) -> Option<f64> {
        match layer {
            LayerKind::Extraction => self.extraction,
            LayerKind::DatabaseMatch => self.database_match,
            LayerKind::Forensics => self.forensics,
            LayerKind::SignatureSeal => self.signature_seal,
            LayerKind::QrIntegrity => self.qr_integrity,
        }
    }
}

/// The certificate every clean source agrees on.
pub fn sample_fields() -> CertificateFields {
    CertificateFields {
        name: Some("Ada Lovelace".to_string()),
        certificate_id: Some("CERT-2026-0042".to_string()),
        course: Some("Analytical Engines".to_string()),
        institution: Some("Royal Institution of Computing".to_string()),
        issue_date: Some("2026-06-30".to_string()),
        grade: Some("First".to_string()),
        additional: BTreeMap::new(),
    }
}

/// Clean evidence for one layer.
pub fn clean_layer(layer: LayerKind, score: f64) -> LayerResult {
    match layer {
        LayerKind::Extraction => LayerResult::Extraction(ExtractionEvidence {
            score,
            fields: sample_fields(),
            field_confidences: BTreeMap::new(),
            method: Some("primary".to_string()),
            details: BTreeMap::new(),
        }),
        LayerKind::DatabaseMatch => LayerResult::DatabaseMatch(DatabaseMatchEvidence {
            score,
            match_found: true,
            record: Some(sample_fields()),
            details: BTreeMap::new(),
        }),
        LayerKind::Forensics => LayerResult::Forensics(ForensicsEvidence {
            score,
            tamper_probability: CLEAN_TAMPER_PROBABILITY,
            copy_move_score: Some(0.02),
            tamper_types: Vec::new(),
            hash_match: None,
            details: BTreeMap::new(),
        }),
        LayerKind::SignatureSeal => LayerResult::SignatureSeal(SignatureSealEvidence {
            score,
            seals_detected: 1,
            signatures_detected: 1,
            signature_valid: Some(true),
            details: BTreeMap::new(),
        }),
        LayerKind::QrIntegrity => LayerResult::QrIntegrity(QrIntegrityEvidence {
            score,
            qr_detected: true,
            qr_decoded: true,
            signature_valid: Some(true),
            issuer_verified: true,
            fields: Some(sample_fields()),
            details: BTreeMap::new(),
        }),
    }
}

/// Clean layer results for a score set, in slot order.
pub fn layers_with_scores(scores: ScoreSet) -> Vec<LayerResult> {
    LayerKind::ALL
        .iter()
        .map(|layer| match scores.get(*layer) {
            Some(score) => clean_layer(*layer, score),
            None => LayerResult::unavailable(*layer, "not produced"),
        })
        .collect()
}

/// Replace the forensics layer's tamper probability.
pub fn with_tamper_probability(mut layers: Vec<LayerResult>, tamper_probability: f64) -> Vec<LayerResult> {
    for layer in layers.iter_mut() {
        if let LayerResult::Forensics(f) = layer {
            f.tamper_probability = tamper_probability;
        }
    }
    layers
}

/// Source that returns `result` immediately.
pub fn static_source(result: LayerResult) -> Box<dyn EvidenceSource> {
    let layer = result.layer();
    evidence_fn(layer, move |_| Ok(result))
}

/// Source that returns `result` after `delay`, giving up early if cancelled.
pub fn delayed_source(result: LayerResult, delay: Duration) -> Box<dyn EvidenceSource> {
    let layer = result.layer();
    evidence_fn(layer, move |cancel| {
        let step = Duration::from_millis(5);
        let mut waited = Duration::ZERO;
        while waited < delay {
            if cancel.is_cancelled() {
                return Err(EvidenceError::Cancelled);
            }
            thread::sleep(step);
            waited += step;
        }
        Ok(result)
    })
}

/// Source that always fails.
pub fn failing_source(layer: LayerKind, message: &str) -> Box<dyn EvidenceSource> {
    let message = message.to_string();
    evidence_fn(layer, move |_| Err(EvidenceError::Failed(message)))
}

/// Clean sources for a score set; unavailable layers get no source at all.
pub fn sources_with_scores(scores: ScoreSet) -> Vec<Box<dyn EvidenceSource>> {
    LayerKind::ALL
        .iter()
        .filter_map(|layer| scores.get(*layer).map(|score| static_source(clean_layer(*layer, score))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_with_scores_slot_order() {
        let layers = layers_with_scores(ScoreSet {
            forensics: None,
            ..ScoreSet::uniform(0.9)
        });
        assert_eq!(layers.len(), 5);
        for (layer, kind) in layers.iter().zip(LayerKind::ALL) {
            assert_eq!(layer.layer(), kind);
        }
        assert!(!layers[LayerKind::Forensics.position()].is_available());
    }

    #[test]
    fn test_clean_layers_validate() {
        for layer in LayerKind::ALL {
            assert!(clean_layer(layer, 0.7).validate().is_ok());
        }
    }

    #[test]
    fn test_with_tamper_probability() {
        let layers = with_tamper_probability(layers_with_scores(ScoreSet::uniform(1.0)), 0.92);
        let forensics = crate::evidence::forensics(&layers).unwrap();
        assert_eq!(forensics.tamper_probability, 0.92);
    }
}
