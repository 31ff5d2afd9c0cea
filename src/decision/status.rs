//! Verification status state machine
//!
//! PENDING → {VERIFIED | FAILED | REQUIRES_REVIEW | TAMPERED | SIGNATURE_INVALID}
//! REQUIRES_REVIEW → {VERIFIED | FAILED} (reviewer decision, once)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verification status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Evidence collected, no decision yet
    Pending,
    /// Approved; eligible for attestation
    Verified,
    /// Rejected on score
    Failed,
    /// Waiting for a reviewer
    RequiresReview,
    /// Rejected by a tamper override
    Tampered,
    /// Rejected by a signature override
    SignatureInvalid,
}

impl VerificationStatus {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: VerificationStatus) -> bool {
        use VerificationStatus::*;
        match (self, target) {
            // Decision engine
            (Pending, Verified) => true,
            (Pending, Failed) => true,
            (Pending, RequiresReview) => true,
            (Pending, Tampered) => true,
            (Pending, SignatureInvalid) => true,

            // Reviewer
            (RequiresReview, Verified) => true,
            (RequiresReview, Failed) => true,

            _ => false,
        }
    }

    /// Terminal states accept no further automatic or reviewer transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified
                | VerificationStatus::Failed
                | VerificationStatus::Tampered
                | VerificationStatus::SignatureInvalid
        )
    }

    /// Outcomes produced by a hard override.
    pub fn is_hard_rejection(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Tampered | VerificationStatus::SignatureInvalid
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
            VerificationStatus::RequiresReview => "requires_review",
            VerificationStatus::Tampered => "tampered",
            VerificationStatus::SignatureInvalid => "signature_invalid",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationStatus::*;

    const ALL: [VerificationStatus; 6] = [
        Pending,
        Verified,
        Failed,
        RequiresReview,
        Tampered,
        SignatureInvalid,
    ];

    #[test]
    fn test_pending_transitions() {
        for target in [Verified, Failed, RequiresReview, Tampered, SignatureInvalid] {
            assert!(Pending.can_transition_to(target), "pending -> {}", target);
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_review_transitions() {
        assert!(RequiresReview.can_transition_to(Verified));
        assert!(RequiresReview.can_transition_to(Failed));
        assert!(!RequiresReview.can_transition_to(Tampered));
        assert!(!RequiresReview.can_transition_to(RequiresReview));
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&RequiresReview).unwrap(),
            "\"requires_review\""
        );
        let parsed: VerificationStatus = serde_json::from_str("\"signature_invalid\"").unwrap();
        assert_eq!(parsed, SignatureInvalid);
        for status in ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }
}
