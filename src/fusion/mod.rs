//! Weighted fusion of evidence layers into a risk score
//!
//! Each present layer contributes `weight * score`. The weight of an
//! unavailable layer is redistributed across the present layers in
//! proportion to their own weights; it is never dropped. `confidence` is the
//! fraction of base weight that was backed by evidence.

mod factors;
mod scorer;

pub use factors::{authenticity_indicators, evidence_risk_factors, risk_factors};
pub use scorer::{FusionError, FusionScorer};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::decision::DecisionThresholds;
use crate::evidence::LayerKind;

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Base fusion weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub extraction: f64,
    pub database_match: f64,
    pub forensic: f64,
    pub signature: f64,
    pub qr_integrity: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            extraction: 0.25,
            database_match: 0.30,
            forensic: 0.25,
            signature: 0.15,
            qr_integrity: 0.05,
        }
    }
}

impl FusionWeights {
    /// Base weight of a layer.
    pub fn weight(&self, layer: LayerKind) -> f64 {
        match layer {
            LayerKind::Extraction => self.extraction,
            LayerKind::DatabaseMatch => self.database_match,
            LayerKind::Forensics => self.forensic,
            LayerKind::SignatureSeal => self.signature,
            LayerKind::QrIntegrity => self.qr_integrity,
        }
    }

    /// Sum of all base weights.
    pub fn total(&self) -> f64 {
        LayerKind::ALL.iter().map(|l| self.weight(*l)).sum()
    }

    /// Check that weights are finite, non-negative and sum to one.
    pub fn validate(&self) -> Result<(), String> {
        for layer in LayerKind::ALL {
            let weight = self.weight(layer);
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("{} weight must be a non-negative number, got {}", layer, weight));
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_EPSILON {
            return Err(format!("fusion weights must sum to 1.0, got {}", total));
        }
        Ok(())
    }
}

/// Ordinal risk bucket derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket an overall score.
    ///
    /// Uses the decision thresholds so that `low` coincides with the
    /// auto-approve band and `critical` with the auto-reject band.
    pub fn from_score(overall: f64, thresholds: &DecisionThresholds) -> Self {
        if overall >= thresholds.auto_approve {
            RiskLevel::Low
        } else if overall >= thresholds.review_floor {
            RiskLevel::Medium
        } else if overall > thresholds.auto_reject {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused risk score for one verification attempt.
///
/// Component scores are `None` for unavailable layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub extraction_confidence: Option<f64>,
    pub database_match_score: Option<f64>,
    pub forensic_score: Option<f64>,
    pub signature_score: Option<f64>,
    pub qr_integrity_score: Option<f64>,

    /// Weighted score in [0, 1] after redistribution.
    pub overall_score: f64,

    /// Fraction of base weight backed by available evidence.
    pub confidence: f64,

    pub risk_level: RiskLevel,

    /// Negative signals gathered from layer detail.
    pub risk_factors: Vec<String>,

    /// Positive signals gathered from layer detail.
    pub authenticity_indicators: Vec<String>,

    /// Weight actually applied to each layer (zero for unavailable layers).
    pub effective_weights: BTreeMap<LayerKind, f64>,
}

impl RiskScore {
    /// Component score of a layer.
    pub fn component(&self, layer: LayerKind) -> Option<f64> {
        match layer {
            LayerKind::Extraction => self.extraction_confidence,
            LayerKind::DatabaseMatch => self.database_match_score,
            LayerKind::Forensics => self.forensic_score,
            LayerKind::SignatureSeal => self.signature_score,
            LayerKind::QrIntegrity => self.qr_integrity_score,
        }
    }

    /// Layers that contributed no evidence.
    pub fn unavailable_layers(&self) -> Vec<LayerKind> {
        LayerKind::ALL
            .iter()
            .copied()
            .filter(|layer| self.component(*layer).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_valid() {
        let weights = FusionWeights::default();
        assert!(weights.validate().is_ok());
        assert!((weights.total() - 1.0).abs() < WEIGHT_EPSILON);
    }

    #[test]
    fn test_weights_not_summing_to_one_rejected() {
        let weights = FusionWeights {
            qr_integrity: 0.10,
            ..Default::default()
        };
        assert!(weights.validate().unwrap_err().contains("sum to 1.0"));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = FusionWeights {
            extraction: -0.05,
            database_match: 0.60,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_risk_level_bands() {
        let thresholds = DecisionThresholds::default();
        assert_eq!(RiskLevel::from_score(0.85, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.84, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.60, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.45, &thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.30, &thresholds), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.0, &thresholds), RiskLevel::Critical);
    }
}
