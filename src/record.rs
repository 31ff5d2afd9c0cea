//! Verification record
//!
//! The aggregate root of one verification attempt. A record is created
//! `pending` with its collected evidence, decided exactly once, and then
//! changed at most once by a reviewer (from `requires_review`) or by an
//! audited manual override (from `tampered` / `signature_invalid`).

use chrono::{DateTime, Utc};
use credfuse_protocol::CertificateFields;
use serde::{Deserialize, Serialize};

use crate::consistency::ConsistencyReport;
use crate::decision::{Decision, EscalationReason, VerificationStatus};
use crate::evidence::{Collection, LayerResult, LayerTiming};
use crate::fusion::RiskScore;

/// Prefix of every verification id.
pub const VERIFICATION_ID_PREFIX: &str = "ver_";

/// Generate a new verification id (`ver_` + lowercase ULID)
pub fn generate_verification_id() -> String {
    format!(
        "{}{}",
        VERIFICATION_ID_PREFIX,
        ulid::Ulid::new().to_string().to_lowercase()
    )
}

/// Errors for record transitions
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: VerificationStatus,
        to: VerificationStatus,
    },

    #[error("Verification {0} has already been decided")]
    AlreadyDecided(String),

    #[error("Verification {0} has already been reviewed")]
    AlreadyReviewed(String),

    #[error("Manual override is only permitted from tampered or signature_invalid, not {0}")]
    OverrideNotPermitted(VerificationStatus),

    #[error("Manual override must target verified or failed, not {0}")]
    InvalidOverrideTarget(VerificationStatus),

    #[error("Verification {0} already carries a manual override")]
    AlreadyOverridden(String),

    #[error("{field} must not be empty")]
    MissingField { field: &'static str },
}

/// A reviewer's decision on a record in `requires_review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub reviewer_id: String,
    pub approved: bool,
    pub notes: String,

    /// Corrections to use for issuance; never written back into the evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_fields: Option<CertificateFields>,
}

/// Audit record of a manual override of a hard rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub operator_id: String,
    pub reason: String,
    pub from: VerificationStatus,
    pub to: VerificationStatus,
    pub at: DateTime<Utc>,
}

/// One verification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Verification identifier (`ver_` + ULID)
    pub id: String,

    /// Opaque reference to the submitted credential
    pub blob_ref: String,

    /// Current status
    pub status: VerificationStatus,

    /// Certificate fields as submitted (extracted, with manual fields applied)
    pub fields: CertificateFields,

    /// One result per evidence layer, in layer order
    pub layer_results: Vec<LayerResult>,

    /// Per-layer timing and outcome
    pub layer_timings: Vec<LayerTiming>,

    /// Fused score; absent until decided, or when no evidence was available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<RiskScore>,

    /// Cross-source field consistency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyReport>,

    #[serde(default)]
    pub decision_rationale: String,

    #[serde(default)]
    pub auto_decision_confidence: f64,

    #[serde(default)]
    pub escalation_reasons: Vec<EscalationReason>,

    #[serde(default)]
    pub requires_manual_review: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,

    /// Reviewer corrections, applied only at issuance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_fields: Option<CertificateFields>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<ManualOverride>,

    /// Wall time from request to decision
    #[serde(default)]
    pub processing_time_ms: u64,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl VerificationRecord {
    /// Create a pending record from collected evidence.
    pub fn new(blob_ref: impl Into<String>, fields: CertificateFields, collection: Collection) -> Self {
        Self {
            id: generate_verification_id(),
            blob_ref: blob_ref.into(),
            status: VerificationStatus::Pending,
            fields,
            layer_results: collection.results,
            layer_timings: collection.timings,
            risk_score: None,
            consistency: None,
            decision_rationale: String::new(),
            auto_decision_confidence: 0.0,
            escalation_reasons: Vec::new(),
            requires_manual_review: false,
            reviewer_id: None,
            review_notes: None,
            corrected_fields: None,
            manual_override: None,
            processing_time_ms: 0,
            created_at: Utc::now(),
            decided_at: None,
            reviewed_at: None,
        }
    }

    fn transition(&mut self, to: VerificationStatus) -> Result<(), RecordError> {
        if !self.status.can_transition_to(to) {
            return Err(RecordError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Apply the decision engine's output. Allowed once, from `pending`.
    pub fn apply_decision(
        &mut self,
        risk_score: Option<RiskScore>,
        consistency: ConsistencyReport,
        decision: Decision,
    ) -> Result<(), RecordError> {
        if self.decided_at.is_some() {
            return Err(RecordError::AlreadyDecided(self.id.clone()));
        }
        self.transition(decision.status)?;

        self.requires_manual_review = decision.requires_manual_review();
        self.risk_score = risk_score;
        self.consistency = Some(consistency);
        self.decision_rationale = decision.rationale;
        self.auto_decision_confidence = decision.auto_decision_confidence;
        self.escalation_reasons = decision.escalation_reasons;
        self.decided_at = Some(Utc::now());
        Ok(())
    }

    /// Apply a reviewer's decision. Allowed once, from `requires_review`.
    pub fn apply_review(&mut self, review: ReviewDecision) -> Result<(), RecordError> {
        if review.reviewer_id.trim().is_empty() {
            return Err(RecordError::MissingField { field: "reviewer_id" });
        }
        if self.reviewer_id.is_some() {
            return Err(RecordError::AlreadyReviewed(self.id.clone()));
        }
        let target = if review.approved {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Failed
        };
        self.transition(target)?;

        self.requires_manual_review = false;
        self.reviewer_id = Some(review.reviewer_id);
        self.review_notes = Some(review.notes);
        self.corrected_fields = review.corrected_fields;
        self.reviewed_at = Some(Utc::now());
        Ok(())
    }

    /// Override a hard rejection. Carries its own audit record.
    pub fn apply_manual_override(
        &mut self,
        operator_id: &str,
        to: VerificationStatus,
        reason: &str,
    ) -> Result<(), RecordError> {
        if operator_id.trim().is_empty() {
            return Err(RecordError::MissingField { field: "operator_id" });
        }
        if reason.trim().is_empty() {
            return Err(RecordError::MissingField { field: "reason" });
        }
        if self.manual_override.is_some() {
            return Err(RecordError::AlreadyOverridden(self.id.clone()));
        }
        if !self.status.is_hard_rejection() {
            return Err(RecordError::OverrideNotPermitted(self.status));
        }
        if !matches!(to, VerificationStatus::Verified | VerificationStatus::Failed) {
            return Err(RecordError::InvalidOverrideTarget(to));
        }

        self.manual_override = Some(ManualOverride {
            operator_id: operator_id.to_string(),
            reason: reason.to_string(),
            from: self.status,
            to,
            at: Utc::now(),
        });
        self.status = to;
        Ok(())
    }

    /// Check if the record accepts no further transition
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Only verified records may be attested.
    pub fn is_attestable(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    /// Fields to sign: submitted fields with any reviewer corrections applied.
    pub fn issuance_fields(&self) -> CertificateFields {
        match &self.corrected_fields {
            Some(corrected) => self.fields.overlay(corrected),
            None => self.fields.clone(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionEngine;
    use crate::mock::{layers_with_scores, sample_fields, with_tamper_probability, ScoreSet};

    fn record_for(layers: Vec<LayerResult>) -> VerificationRecord {
        let collection = Collection {
            results: layers,
            timings: Vec::new(),
            cancelled: false,
        };
        VerificationRecord::new("blob://test", sample_fields(), collection)
    }

    fn decide(record: &mut VerificationRecord) {
        let decision = DecisionEngine::default().decide(&record.layer_results, None, None);
        let consistency = crate::consistency::ConsistencyValidator::new().validate(None, None, None);
        record.apply_decision(None, consistency, decision).unwrap();
    }

    fn decision_with(status: VerificationStatus) -> Decision {
        Decision {
            status,
            escalation_reasons: Vec::new(),
            rationale: format!("{}: test", status),
            auto_decision_confidence: 1.0,
        }
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = record_for(layers_with_scores(ScoreSet::uniform(0.9)));
        assert_eq!(record.status, VerificationStatus::Pending);
        assert!(record.id.starts_with(VERIFICATION_ID_PREFIX));
        assert_eq!(record.id.len(), VERIFICATION_ID_PREFIX.len() + 26);
        assert_eq!(record.id, record.id.to_lowercase());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_decision_applied_once() {
        let mut record = record_for(layers_with_scores(ScoreSet::default()));
        decide(&mut record);
        assert_eq!(record.status, VerificationStatus::RequiresReview);
        assert!(record.requires_manual_review);
        assert!(record.decided_at.is_some());

        let consistency = crate::consistency::ConsistencyValidator::new().validate(None, None, None);
        let err = record
            .apply_decision(None, consistency, decision_with(VerificationStatus::Verified))
            .unwrap_err();
        assert!(matches!(err, RecordError::AlreadyDecided(_)));
        assert_eq!(record.status, VerificationStatus::RequiresReview);
    }

    #[test]
    fn test_review_once() {
        let mut record = record_for(layers_with_scores(ScoreSet::default()));
        decide(&mut record);

        let mut corrected = CertificateFields::default();
        corrected.grade = Some("Distinction".to_string());
        record
            .apply_review(ReviewDecision {
                reviewer_id: "reviewer-7".to_string(),
                approved: true,
                notes: "seal checked by hand".to_string(),
                corrected_fields: Some(corrected),
            })
            .unwrap();

        assert_eq!(record.status, VerificationStatus::Verified);
        assert!(!record.requires_manual_review);
        assert!(record.is_attestable());
        assert_eq!(record.fields.grade.as_deref(), Some("First"));
        assert_eq!(record.issuance_fields().grade.as_deref(), Some("Distinction"));

        let err = record
            .apply_review(ReviewDecision {
                reviewer_id: "reviewer-8".to_string(),
                approved: false,
                notes: String::new(),
                corrected_fields: None,
            })
            .unwrap_err();
        assert!(matches!(err, RecordError::AlreadyReviewed(_)));
    }

    #[test]
    fn test_review_requires_review_status() {
        let mut record = record_for(layers_with_scores(ScoreSet::uniform(0.9)));
        let err = record
            .apply_review(ReviewDecision {
                reviewer_id: "reviewer-7".to_string(),
                approved: true,
                notes: String::new(),
                corrected_fields: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::InvalidTransition {
                from: VerificationStatus::Pending,
                to: VerificationStatus::Verified
            }
        ));
    }

    #[test]
    fn test_tampered_needs_audited_override() {
        let layers = with_tamper_probability(layers_with_scores(ScoreSet::uniform(1.0)), 0.95);
        let mut record = record_for(layers);
        decide(&mut record);
        assert_eq!(record.status, VerificationStatus::Tampered);
        assert!(record.is_terminal());

        let review = ReviewDecision {
            reviewer_id: "reviewer-7".to_string(),
            approved: true,
            notes: String::new(),
            corrected_fields: None,
        };
        assert!(record.apply_review(review).is_err());

        assert!(matches!(
            record.apply_manual_override("ops-1", VerificationStatus::Verified, " "),
            Err(RecordError::MissingField { field: "reason" })
        ));
        assert!(matches!(
            record.apply_manual_override("ops-1", VerificationStatus::RequiresReview, "retake"),
            Err(RecordError::InvalidOverrideTarget(_))
        ));

        record
            .apply_manual_override("ops-1", VerificationStatus::Verified, "scanner artefact confirmed")
            .unwrap();
        assert_eq!(record.status, VerificationStatus::Verified);
        let audit = record.manual_override.as_ref().unwrap();
        assert_eq!(audit.from, VerificationStatus::Tampered);
        assert_eq!(audit.operator_id, "ops-1");

        assert!(matches!(
            record.apply_manual_override("ops-2", VerificationStatus::Failed, "second thoughts"),
            Err(RecordError::AlreadyOverridden(_))
        ));
    }

    #[test]
    fn test_override_not_permitted_for_soft_outcomes() {
        let mut record = record_for(layers_with_scores(ScoreSet::default()));
        decide(&mut record);
        assert!(matches!(
            record.apply_manual_override("ops-1", VerificationStatus::Verified, "trust me"),
            Err(RecordError::OverrideNotPermitted(VerificationStatus::RequiresReview))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut record = record_for(layers_with_scores(ScoreSet::uniform(0.9)));
        decide(&mut record);

        let parsed = VerificationRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.status, record.status);
        assert_eq!(parsed.layer_results, record.layer_results);
        assert_eq!(parsed.escalation_reasons, record.escalation_reasons);
    }
}
