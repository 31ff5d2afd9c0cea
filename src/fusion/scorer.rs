//! Fusion scorer

use std::collections::BTreeMap;
use thiserror::Error;

use super::{authenticity_indicators, risk_factors, FusionWeights, RiskLevel, RiskScore};
use crate::decision::DecisionThresholds;
use crate::evidence::{find_layer, LayerKind, LayerResult};

/// Fusion failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    /// No layer carried evidence, so there is nothing to weigh.
    #[error("inconsistent fusion state: no evidence layer available")]
    InconsistentFusionState,
}

/// Combines layer scores into a [`RiskScore`].
///
/// Pure: the same layers always produce the same score.
#[derive(Debug, Clone)]
pub struct FusionScorer {
    weights: FusionWeights,
    thresholds: DecisionThresholds,
}

impl FusionScorer {
    /// Create a scorer. Weights are assumed validated.
    pub fn new(weights: FusionWeights, thresholds: DecisionThresholds) -> Self {
        Self { weights, thresholds }
    }

    /// Base weights.
    pub fn weights(&self) -> &FusionWeights {
        &self.weights
    }

    /// Score a set of layer results.
    pub fn score(&self, layers: &[LayerResult]) -> Result<RiskScore, FusionError> {
        let mut components: BTreeMap<LayerKind, f64> = BTreeMap::new();
        let mut present_weight = 0.0;
        let mut weighted_sum = 0.0;

        for layer in LayerKind::ALL {
            if let Some(score) = find_layer(layers, layer).and_then(LayerResult::score) {
                let weight = self.weights.weight(layer);
                present_weight += weight;
                weighted_sum += weight * score;
                components.insert(layer, score);
            }
        }

        if components.is_empty() || present_weight <= 0.0 {
            return Err(FusionError::InconsistentFusionState);
        }

        let overall_score = (weighted_sum / present_weight).clamp(0.0, 1.0);
        let confidence = (present_weight / self.weights.total()).clamp(0.0, 1.0);

        let effective_weights = LayerKind::ALL
            .iter()
            .map(|layer| {
                let weight = if components.contains_key(layer) {
                    self.weights.weight(*layer) / present_weight
                } else {
                    0.0
                };
                (*layer, weight)
            })
            .collect();

        Ok(RiskScore {
            extraction_confidence: components.get(&LayerKind::Extraction).copied(),
            database_match_score: components.get(&LayerKind::DatabaseMatch).copied(),
            forensic_score: components.get(&LayerKind::Forensics).copied(),
            signature_score: components.get(&LayerKind::SignatureSeal).copied(),
            qr_integrity_score: components.get(&LayerKind::QrIntegrity).copied(),
            overall_score,
            confidence,
            risk_level: RiskLevel::from_score(overall_score, &self.thresholds),
            risk_factors: risk_factors(layers),
            authenticity_indicators: authenticity_indicators(layers),
            effective_weights,
        })
    }
}
