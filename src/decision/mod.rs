//! Decision engine
//!
//! Maps fused evidence onto a [`VerificationStatus`]. Hard overrides
//! (tampering, invalid signatures, a credential with no authentication
//! marks at all) are evaluated before any threshold; a high score never
//! outranks them. Soft conditions (low confidence, a database miss, field
//! mismatches, risk factors behind a high score) force review but never
//! reject.

mod engine;
mod status;

pub use engine::DecisionEngine;
pub use status::VerificationStatus;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::LayerKind;

/// Score thresholds shared by the decision engine and risk banding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// At or above: verified (absent overrides and forced review).
    pub auto_approve: f64,

    /// Lower edge of the `medium` risk band.
    pub review_floor: f64,

    /// At or below: failed.
    pub auto_reject: f64,

    /// Evidence coverage below which review is forced.
    pub confidence_floor: f64,

    /// Field mismatch percentage above which review is forced.
    pub max_mismatch_percent: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.85,
            review_floor: 0.60,
            auto_reject: 0.30,
            confidence_floor: 0.80,
            max_mismatch_percent: 10.0,
        }
    }
}

impl DecisionThresholds {
    /// Check bounds and ordering.
    pub fn validate(&self) -> Result<(), String> {
        let unit = [
            ("auto_approve", self.auto_approve),
            ("review_floor", self.review_floor),
            ("auto_reject", self.auto_reject),
            ("confidence_floor", self.confidence_floor),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("thresholds.{} must be within [0, 1], got {}", name, value));
            }
        }
        if !(self.auto_reject < self.review_floor && self.review_floor < self.auto_approve) {
            return Err(format!(
                "thresholds must satisfy auto_reject < review_floor < auto_approve, got {} / {} / {}",
                self.auto_reject, self.review_floor, self.auto_approve
            ));
        }
        if !(0.0..=100.0).contains(&self.max_mismatch_percent) {
            return Err(format!(
                "thresholds.max_mismatch_percent must be within [0, 100], got {}",
                self.max_mismatch_percent
            ));
        }
        Ok(())
    }
}

/// Limits that reject regardless of score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardOverrides {
    /// Tamper probability at or above which the credential is tampered;
    /// the ceiling itself is tampered.
    pub tamper_ceiling: f64,

    /// Number of distinct tamper indicators at which the credential is tampered.
    pub tamper_indicator_limit: usize,
}

impl Default for HardOverrides {
    fn default() -> Self {
        Self {
            tamper_ceiling: 0.80,
            tamper_indicator_limit: 3,
        }
    }
}

impl HardOverrides {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.tamper_ceiling > 0.0 && self.tamper_ceiling <= 1.0) {
            return Err(format!(
                "overrides.tamper_ceiling must be within (0, 1], got {}",
                self.tamper_ceiling
            ));
        }
        if self.tamper_indicator_limit == 0 {
            return Err("overrides.tamper_indicator_limit must be at least 1".to_string());
        }
        Ok(())
    }
}

/// One condition that shaped a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EscalationReason {
    TamperCeilingExceeded { tamper_probability: f64, ceiling: f64 },
    ImageHashMismatch,
    TamperIndicators { count: usize, limit: usize },
    SignatureInvalid { layer: LayerKind },
    NoAuthenticationMarks,
    NoEvidence,
    ScoreInReviewBand { overall: f64 },
    LowConfidence {
        confidence: f64,
        floor: f64,
        unavailable: Vec<LayerKind>,
    },
    DatabaseMatchMiss,
    ConsistencyMismatch { mismatch_percent: f64, limit: f64 },
    RiskFactorsPresent { factors: Vec<String> },
}

impl EscalationReason {
    /// Returns true for reasons that reject outright.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            EscalationReason::TamperCeilingExceeded { .. }
                | EscalationReason::ImageHashMismatch
                | EscalationReason::TamperIndicators { .. }
                | EscalationReason::SignatureInvalid { .. }
                | EscalationReason::NoAuthenticationMarks
        )
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::TamperCeilingExceeded {
                tamper_probability,
                ceiling,
            } => write!(
                f,
                "tamper probability {:.2} at or above ceiling {:.2}",
                tamper_probability, ceiling
            ),
            EscalationReason::ImageHashMismatch => f.write_str("image hash mismatch"),
            EscalationReason::TamperIndicators { count, limit } => {
                write!(f, "{} tamper indicators (limit {})", count, limit)
            }
            EscalationReason::SignatureInvalid { layer } => {
                write!(f, "{} layer reports an invalid signature", layer)
            }
            EscalationReason::NoAuthenticationMarks => {
                f.write_str("no seal, signature or QR code detected")
            }
            EscalationReason::NoEvidence => f.write_str("no evidence layer available"),
            EscalationReason::ScoreInReviewBand { overall } => {
                write!(f, "overall score {:.2} in review band", overall)
            }
            EscalationReason::LowConfidence {
                confidence,
                floor,
                unavailable,
            } => {
                write!(f, "confidence {:.2} below floor {:.2}", confidence, floor)?;
                if !unavailable.is_empty() {
                    let names: Vec<&str> = unavailable.iter().map(|l| l.as_str()).collect();
                    write!(f, " (unavailable: {})", names.join(", "))?;
                }
                Ok(())
            }
            EscalationReason::DatabaseMatchMiss => f.write_str("no database match"),
            EscalationReason::ConsistencyMismatch {
                mismatch_percent,
                limit,
            } => write!(
                f,
                "field mismatch {:.2}% above limit {:.2}%",
                mismatch_percent, limit
            ),
            EscalationReason::RiskFactorsPresent { factors } => {
                write!(f, "risk factors despite high score: {}", factors.join(", "))
            }
        }
    }
}

/// Output of the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: VerificationStatus,

    /// Every triggering condition, hard reasons first.
    pub escalation_reasons: Vec<EscalationReason>,

    /// Deterministic explanation built from the same inputs.
    pub rationale: String,

    /// Fusion confidence at decision time; 0 with no score.
    pub auto_decision_confidence: f64,
}

impl Decision {
    pub fn requires_manual_review(&self) -> bool {
        self.status == VerificationStatus::RequiresReview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_valid() {
        assert!(DecisionThresholds::default().validate().is_ok());
        assert!(HardOverrides::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_order_enforced() {
        let thresholds = DecisionThresholds {
            auto_reject: 0.70,
            ..Default::default()
        };
        let err = thresholds.validate().unwrap_err();
        assert!(err.contains("auto_reject < review_floor < auto_approve"));
    }

    #[test]
    fn test_threshold_bounds_enforced() {
        let thresholds = DecisionThresholds {
            confidence_floor: 1.5,
            ..Default::default()
        };
        assert!(thresholds.validate().unwrap_err().contains("confidence_floor"));
    }

    #[test]
    fn test_zero_indicator_limit_rejected() {
        let overrides = HardOverrides {
            tamper_indicator_limit: 0,
            ..Default::default()
        };
        assert!(overrides.validate().is_err());
    }

    #[test]
    fn test_reason_display_is_stable() {
        let reason = EscalationReason::LowConfidence {
            confidence: 0.7,
            floor: 0.8,
            unavailable: vec![LayerKind::DatabaseMatch],
        };
        assert_eq!(
            reason.to_string(),
            "confidence 0.70 below floor 0.80 (unavailable: database_match)"
        );
        assert!(!reason.is_hard());
        assert!(EscalationReason::ImageHashMismatch.is_hard());
        assert!(EscalationReason::NoAuthenticationMarks.is_hard());
        assert!(!EscalationReason::RiskFactorsPresent { factors: Vec::new() }.is_hard());
    }

    #[test]
    fn test_reason_serde_tag() {
        let json = serde_json::to_value(EscalationReason::SignatureInvalid {
            layer: LayerKind::QrIntegrity,
        })
        .unwrap();
        assert_eq!(json["reason"], "signature_invalid");
        assert_eq!(json["layer"], "qr_integrity");
    }
}
