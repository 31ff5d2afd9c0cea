//! Risk factors and authenticity indicators
//!
//! Human-readable signals pulled from layer detail. They explain a score;
//! they never change it. Evidence-backed risk factors do block automatic
//! approval in the decision engine.

use crate::evidence::{
    database_match, extraction, forensics, qr_integrity, signature_seal, LayerResult,
};

/// Extraction score below which extraction counts as a risk factor.
const LOW_EXTRACTION_CONFIDENCE: f64 = 0.7;

/// Tamper probability above which forensics counts as a risk factor.
const ELEVATED_TAMPER_PROBABILITY: f64 = 0.5;

/// Tamper probability below which forensics counts as an indicator.
const LOW_TAMPER_PROBABILITY: f64 = 0.3;

/// Database match score above which the match counts as high confidence.
const HIGH_DATABASE_CONFIDENCE: f64 = 0.8;

/// Collect negative signals, in layer order: unavailable layers first,
/// then [`evidence_risk_factors`].
pub fn risk_factors(layers: &[LayerResult]) -> Vec<String> {
    let mut factors: Vec<String> = layers
        .iter()
        .filter_map(|layer| {
            layer
                .unavailable_reason()
                .map(|reason| format!("{} layer unavailable: {}", layer.layer(), reason))
        })
        .collect();
    factors.extend(evidence_risk_factors(layers));
    factors
}

/// Negative signals reported by layers that did produce evidence.
///
/// Missing layers are left out; they already lower fusion confidence.
pub fn evidence_risk_factors(layers: &[LayerResult]) -> Vec<String> {
    let mut factors = Vec::new();

    if let Some(e) = extraction(layers) {
        if e.method.as_deref().is_some_and(|m| m != "primary") {
            factors.push("Primary extraction method failed".to_string());
        }
        if e.score < LOW_EXTRACTION_CONFIDENCE {
            factors.push("Low field extraction confidence".to_string());
        }
    }

    if let Some(d) = database_match(layers) {
        if !d.match_found {
            factors.push("No database match found".to_string());
        }
    }

    if let Some(f) = forensics(layers) {
        if f.tamper_probability > ELEVATED_TAMPER_PROBABILITY {
            factors.push("High tampering probability detected".to_string());
        }
        if !f.tamper_types.is_empty() {
            factors.push(format!("Tampering indicators: {}", f.tamper_types.join(", ")));
        }
        if f.hash_match == Some(false) {
            factors.push("Image hash mismatch".to_string());
        }
    }

    if let Some(s) = signature_seal(layers) {
        if s.seals_detected == 0 {
            factors.push("No institutional seals detected".to_string());
        }
        if s.signatures_detected == 0 {
            factors.push("No signatures detected".to_string());
        }
        if s.signature_valid == Some(false) {
            factors.push("Document signature invalid".to_string());
        }
    }

    if let Some(q) = qr_integrity(layers) {
        if q.qr_detected && !q.qr_decoded {
            factors.push("QR code present but undecodable".to_string());
        }
        if q.signature_valid == Some(false) {
            factors.push("QR signature invalid".to_string());
        }
    }

    factors
}

/// Collect positive signals, in layer order.
pub fn authenticity_indicators(layers: &[LayerResult]) -> Vec<String> {
    let mut indicators = Vec::new();

    if let Some(e) = extraction(layers) {
        if e.method.as_deref() == Some("primary") {
            indicators.push("Primary extraction successful".to_string());
        }
    }

    if let Some(d) = database_match(layers) {
        if d.match_found {
            indicators.push("Database record match found".to_string());
            if d.score > HIGH_DATABASE_CONFIDENCE {
                indicators.push("High confidence database match".to_string());
            }
        }
    }

    if let Some(f) = forensics(layers) {
        if f.tamper_probability < LOW_TAMPER_PROBABILITY {
            indicators.push("Low tampering probability".to_string());
        }
        if f.hash_match == Some(true) {
            indicators.push("Image hash verification passed".to_string());
        }
    }

    if let Some(s) = signature_seal(layers) {
        if s.seals_detected > 0 {
            indicators.push(format!("{} institutional seal(s) detected", s.seals_detected));
        }
        if s.signatures_detected > 0 {
            indicators.push(format!("{} signature(s) detected", s.signatures_detected));
        }
    }

    if let Some(q) = qr_integrity(layers) {
        if q.qr_decoded {
            indicators.push("QR code detected and decoded".to_string());
        }
        if q.signature_valid == Some(true) {
            indicators.push("QR digital signature verified".to_string());
        }
    }

    indicators
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::LayerKind;
    use crate::mock::{layers_with_scores, with_tamper_probability, ScoreSet};

    #[test]
    fn test_clean_layers_have_no_risk_factors() {
        let layers = layers_with_scores(ScoreSet::uniform(0.95));
        assert!(risk_factors(&layers).is_empty());
        assert!(authenticity_indicators(&layers).contains(&"Database record match found".to_string()));
    }

    #[test]
    fn test_unavailable_layer_is_a_risk_factor() {
        let layers = layers_with_scores(ScoreSet {
            database_match: None,
            ..ScoreSet::uniform(0.9)
        });
        let factors = risk_factors(&layers);
        assert_eq!(factors.len(), 1);
        assert!(factors[0].starts_with("database_match layer unavailable"));
        assert!(evidence_risk_factors(&layers).is_empty());
    }

    #[test]
    fn test_low_extraction_is_an_evidence_factor() {
        let layers = layers_with_scores(ScoreSet {
            extraction: Some(0.6),
            ..ScoreSet::uniform(0.95)
        });
        assert_eq!(
            evidence_risk_factors(&layers),
            vec!["Low field extraction confidence".to_string()]
        );
    }

    #[test]
    fn test_tamper_signals() {
        let mut layers = with_tamper_probability(layers_with_scores(ScoreSet::uniform(0.9)), 0.7);
        if let LayerResult::Forensics(f) = &mut layers[LayerKind::Forensics.position()] {
            f.tamper_types = vec!["copy_move".to_string(), "ela".to_string()];
            f.hash_match = Some(false);
        }

        let factors = risk_factors(&layers);
        assert!(factors.contains(&"High tampering probability detected".to_string()));
        assert!(factors.contains(&"Tampering indicators: copy_move, ela".to_string()));
        assert!(factors.contains(&"Image hash mismatch".to_string()));
        assert!(!authenticity_indicators(&layers).contains(&"Low tampering probability".to_string()));
    }
}
