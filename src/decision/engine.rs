//! Decision engine implementation

use tracing::debug;

use super::{Decision, DecisionThresholds, EscalationReason, HardOverrides, VerificationStatus};
use crate::consistency::ConsistencyReport;
use crate::evidence::{database_match, forensics, qr_integrity, signature_seal, LayerKind, LayerResult};
use crate::fusion::{evidence_risk_factors, RiskScore};

/// Pure decision function over layer results, fused score and consistency.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    thresholds: DecisionThresholds,
    overrides: HardOverrides,
}

impl DecisionEngine {
    pub fn new(thresholds: DecisionThresholds, overrides: HardOverrides) -> Self {
        Self { thresholds, overrides }
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    pub fn overrides(&self) -> &HardOverrides {
        &self.overrides
    }

    /// Decide a verification.
    ///
    /// `risk` is `None` when fusion had no evidence to weigh; that always
    /// ends in review unless a hard override fires.
    pub fn decide(
        &self,
        layers: &[LayerResult],
        risk: Option<&RiskScore>,
        consistency: Option<&ConsistencyReport>,
    ) -> Decision {
        let tamper = self.tamper_reasons(layers);
        let signature = signature_reasons(layers);
        let mut soft = self.soft_reasons(layers, risk, consistency);

        // Only an otherwise approvable score needs risk factors to hold it back.
        let hard_fired = !tamper.is_empty() || !signature.is_empty();
        if !hard_fired && risk.is_some_and(|r| r.overall_score >= self.thresholds.auto_approve) {
            let factors = evidence_risk_factors(layers);
            if !factors.is_empty() {
                soft.push(EscalationReason::RiskFactorsPresent { factors });
            }
        }

        let status = if !tamper.is_empty() {
            VerificationStatus::Tampered
        } else if !signature.is_empty() {
            VerificationStatus::SignatureInvalid
        } else {
            match risk {
                None => VerificationStatus::RequiresReview,
                Some(r) if r.overall_score <= self.thresholds.auto_reject => VerificationStatus::Failed,
                Some(r) if r.overall_score >= self.thresholds.auto_approve && soft.is_empty() => {
                    VerificationStatus::Verified
                }
                Some(_) => VerificationStatus::RequiresReview,
            }
        };

        let mut escalation_reasons = tamper;
        escalation_reasons.extend(signature);
        if let Some(r) = risk {
            if r.overall_score > self.thresholds.auto_reject && r.overall_score < self.thresholds.auto_approve {
                escalation_reasons.push(EscalationReason::ScoreInReviewBand {
                    overall: r.overall_score,
                });
            }
        }
        escalation_reasons.extend(soft);

        let rationale = self.rationale(status, risk, &escalation_reasons);
        let auto_decision_confidence = risk.map(|r| r.confidence).unwrap_or(0.0);

        debug!(
            status = %status,
            overall = risk.map(|r| r.overall_score),
            reasons = escalation_reasons.len(),
            "decision made"
        );

        Decision {
            status,
            escalation_reasons,
            rationale,
            auto_decision_confidence,
        }
    }

    fn tamper_reasons(&self, layers: &[LayerResult]) -> Vec<EscalationReason> {
        let mut reasons = Vec::new();
        let Some(f) = forensics(layers) else {
            return reasons;
        };
        if f.tamper_probability >= self.overrides.tamper_ceiling {
            reasons.push(EscalationReason::TamperCeilingExceeded {
                tamper_probability: f.tamper_probability,
                ceiling: self.overrides.tamper_ceiling,
            });
        }
        if f.hash_match == Some(false) {
            reasons.push(EscalationReason::ImageHashMismatch);
        }
        if f.tamper_types.len() >= self.overrides.tamper_indicator_limit {
            reasons.push(EscalationReason::TamperIndicators {
                count: f.tamper_types.len(),
                limit: self.overrides.tamper_indicator_limit,
            });
        }
        reasons
    }

    fn soft_reasons(
        &self,
        layers: &[LayerResult],
        risk: Option<&RiskScore>,
        consistency: Option<&ConsistencyReport>,
    ) -> Vec<EscalationReason> {
        let mut reasons = Vec::new();
        match risk {
            None => reasons.push(EscalationReason::NoEvidence),
            Some(r) if r.confidence < self.thresholds.confidence_floor => {
                reasons.push(EscalationReason::LowConfidence {
                    confidence: r.confidence,
                    floor: self.thresholds.confidence_floor,
                    unavailable: r.unavailable_layers(),
                });
            }
            Some(_) => {}
        }
        if database_match(layers).is_some_and(|d| !d.match_found) {
            reasons.push(EscalationReason::DatabaseMatchMiss);
        }
        if let Some(report) = consistency {
            let mismatch = report.mismatch_percentage();
            if mismatch > self.thresholds.max_mismatch_percent {
                reasons.push(EscalationReason::ConsistencyMismatch {
                    mismatch_percent: mismatch,
                    limit: self.thresholds.max_mismatch_percent,
                });
            }
        }
        reasons
    }

    fn rationale(
        &self,
        status: VerificationStatus,
        risk: Option<&RiskScore>,
        reasons: &[EscalationReason],
    ) -> String {
        let score = match risk {
            Some(r) => format!(
                "overall {:.2}, confidence {:.2}, risk {}",
                r.overall_score, r.confidence, r.risk_level
            ),
            None => "no fused score".to_string(),
        };
        let listed = reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        match status {
            VerificationStatus::Verified => format!(
                "verified: {} at or above auto-approve {:.2}",
                score, self.thresholds.auto_approve
            ),
            VerificationStatus::Failed if reasons.is_empty() => format!(
                "failed: {} at or below auto-reject {:.2}",
                score, self.thresholds.auto_reject
            ),
            VerificationStatus::Failed => format!(
                "failed: {} at or below auto-reject {:.2}; also: {}",
                score, self.thresholds.auto_reject, listed
            ),
            _ => format!("{}: {} ({})", status, listed, score),
        }
    }
}

fn signature_reasons(layers: &[LayerResult]) -> Vec<EscalationReason> {
    let mut reasons = Vec::new();
    if signature_seal(layers).is_some_and(|s| s.signature_valid == Some(false)) {
        reasons.push(EscalationReason::SignatureInvalid {
            layer: LayerKind::SignatureSeal,
        });
    }
    if qr_integrity(layers).is_some_and(|q| q.qr_decoded && q.signature_valid == Some(false)) {
        reasons.push(EscalationReason::SignatureInvalid {
            layer: LayerKind::QrIntegrity,
        });
    }
    // An unavailable QR layer counts as no QR code.
    let unmarked = signature_seal(layers).is_some_and(|s| s.seals_detected == 0 && s.signatures_detected == 0);
    if unmarked && !qr_integrity(layers).is_some_and(|q| q.qr_detected) {
        reasons.push(EscalationReason::NoAuthenticationMarks);
    }
    reasons
}
