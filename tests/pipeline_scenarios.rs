//! End-to-end verification scenarios
//!
//! Each test drives the public `VerificationEngine` with mock evidence
//! sources and checks the decided record, and for verified records the
//! attestation that comes out of it.

use std::sync::Arc;

use credfuse::mock::{
    clean_layer, layers_with_scores, sample_fields, sources_with_scores, static_source, with_tamper_probability,
    ScoreSet,
};
use credfuse::signing::generate_keypair;
use credfuse::{
    AttestationService, CancelToken, EngineConfig, EscalationReason, IssuerSigner, KeyRegistry, LayerKind,
    LayerResult, ReviewDecision, VerificationEngine, VerificationRequest, VerificationStatus,
};

const ISSUER: &str = "royal-institution";

/// Engine wired to a fresh registry with one registered issuer key
fn attesting_engine() -> (VerificationEngine, Arc<AttestationService>) {
    let registry = Arc::new(KeyRegistry::new());
    let key = generate_keypair();
    let public_key = credfuse::signing::encode_verifying_key(&key.verifying_key());
    let key_id = registry.register(ISSUER, &public_key).unwrap();

    let config = EngineConfig::default();
    let service = Arc::new(AttestationService::new(registry, config.attestation));
    let signer = Arc::new(IssuerSigner::new(ISSUER, key_id, key));
    let engine = VerificationEngine::new(config)
        .unwrap()
        .with_attestation(service.clone(), signer);
    (engine, service)
}

fn scenario_one_scores() -> ScoreSet {
    ScoreSet {
        extraction: Some(0.95),
        database_match: Some(0.95),
        forensics: Some(0.9),
        signature_seal: Some(0.9),
        qr_integrity: Some(1.0),
    }
}

// =============================================================================
// Scenario 1: strong evidence on every layer
// =============================================================================

#[test]
fn test_strong_evidence_is_verified_and_attested() {
    let (engine, service) = attesting_engine();
    let request = VerificationRequest::new("blob://scenario-1").with_sources(sources_with_scores(scenario_one_scores()));

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();
    let record = &outcome.record;

    assert_eq!(record.status, VerificationStatus::Verified);
    assert!(!record.requires_manual_review);
    assert!(record.escalation_reasons.is_empty());
    let risk = record.risk_score.as_ref().unwrap();
    assert!((risk.overall_score - 0.9325).abs() < 1e-9);
    assert!(record.decision_rationale.starts_with("verified:"));
    assert!(record.id.starts_with("ver_"));

    let attestation = outcome.attestation.as_ref().expect("verified record should be attested");
    assert_eq!(attestation.payload.data, sample_fields());
    assert!(outcome.attestation_error.is_none());

    let qr = outcome.qr_payload.as_ref().unwrap();
    let response = service.verify_qr(qr);
    assert!(response.valid, "fresh attestation should verify: {:?}", response.error);
    assert_eq!(response.certificate_details, Some(sample_fields()));
    assert_eq!(response.issuer_id.as_deref(), Some(ISSUER));

    let by_id = service.verify_by_id(attestation.id());
    assert!(by_id.valid);
}

#[test]
fn test_outcome_serializes_with_qr_payload() {
    let (engine, _) = attesting_engine();
    let request = VerificationRequest::new("blob://json").with_sources(sources_with_scores(scenario_one_scores()));

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();

    assert_eq!(json["record"]["status"], "verified");
    assert!(json["qr_payload"].is_string());
    assert_eq!(json["attestation"]["payload"]["type"], "certificate_verification");
}

// =============================================================================
// Scenario 2: tamper ceiling overrides a perfect score
// =============================================================================

#[test]
fn test_tamper_override_beats_perfect_score() {
    let (engine, _) = attesting_engine();
    let layers = with_tamper_probability(layers_with_scores(ScoreSet::uniform(1.0)), 0.92);
    let request = VerificationRequest::new("blob://scenario-2").with_sources(layers.into_iter().map(static_source).collect());

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();

    assert_eq!(outcome.record.status, VerificationStatus::Tampered);
    assert!(outcome.record.requires_manual_review);
    assert!(matches!(
        outcome.record.escalation_reasons[0],
        EscalationReason::TamperCeilingExceeded { .. }
    ));
    assert!(outcome.attestation.is_none());
    assert!(outcome.attestation_error.is_none());
}

// =============================================================================
// Scenario 3: missing registry evidence drops confidence below the floor
// =============================================================================

#[test]
fn test_missing_database_layer_requires_review() {
    let (engine, _) = attesting_engine();
    let scores = ScoreSet {
        database_match: None,
        ..ScoreSet::uniform(0.9)
    };
    let request = VerificationRequest::new("blob://scenario-3").with_sources(sources_with_scores(scores));

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();
    let record = &outcome.record;

    assert_eq!(record.status, VerificationStatus::RequiresReview);
    let risk = record.risk_score.as_ref().unwrap();
    assert!((risk.confidence - 0.70).abs() < 1e-9);
    assert!((risk.overall_score - 0.9).abs() < 1e-9);
    assert!(record.escalation_reasons.iter().any(|r| matches!(
        r,
        EscalationReason::LowConfidence { unavailable, .. } if unavailable == &vec![LayerKind::DatabaseMatch]
    )));
    assert!(outcome.attestation.is_none());
}

#[test]
fn test_review_approval_issues_corrected_attestation() {
    let (engine, service) = attesting_engine();
    let scores = ScoreSet {
        database_match: None,
        ..ScoreSet::uniform(0.9)
    };
    let request = VerificationRequest::new("blob://review").with_sources(sources_with_scores(scores));
    let outcome = engine.verify(request, &CancelToken::new()).unwrap();

    let corrected = credfuse::CertificateFields {
        grade: Some("First Class Honours".to_string()),
        ..Default::default()
    };
    let review = ReviewDecision {
        reviewer_id: "reviewer-7".to_string(),
        approved: true,
        notes: "registry offline; checked by phone".to_string(),
        corrected_fields: Some(corrected),
    };

    let reviewed = engine.review(outcome.record, review).unwrap();

    assert_eq!(reviewed.record.status, VerificationStatus::Verified);
    assert_eq!(reviewed.record.fields, sample_fields(), "submitted fields stay untouched");
    let attestation = reviewed.attestation.unwrap();
    assert_eq!(attestation.payload.data.grade.as_deref(), Some("First Class Honours"));
    assert_eq!(attestation.payload.data.name, sample_fields().name);
    assert!(service.verify(&attestation).is_ok());
}

#[test]
fn test_review_rejection_is_final() {
    let (engine, _) = attesting_engine();
    let scores = ScoreSet {
        database_match: None,
        ..ScoreSet::uniform(0.9)
    };
    let request = VerificationRequest::new("blob://reject").with_sources(sources_with_scores(scores));
    let outcome = engine.verify(request, &CancelToken::new()).unwrap();

    let review = ReviewDecision {
        reviewer_id: "reviewer-7".to_string(),
        approved: false,
        notes: "name does not match enrolment".to_string(),
        corrected_fields: None,
    };
    let reviewed = engine.review(outcome.record, review.clone()).unwrap();

    assert_eq!(reviewed.record.status, VerificationStatus::Failed);
    assert!(reviewed.attestation.is_none());
    assert!(engine.review(reviewed.record, review).is_err());
}

// =============================================================================
// Scenario 4: rotation keeps old attestations valid
// =============================================================================

#[test]
fn test_attestation_survives_key_rotation() {
    let (engine, service) = attesting_engine();
    let request = VerificationRequest::new("blob://scenario-4").with_sources(sources_with_scores(scenario_one_scores()));
    let outcome = engine.verify(request, &CancelToken::new()).unwrap();
    let qr = outcome.qr_payload.unwrap();

    let new_key = generate_keypair();
    let new_public = credfuse::signing::encode_verifying_key(&new_key.verifying_key());
    let new_key_id = service.registry().rotate(ISSUER, &new_public).unwrap();

    assert!(service.verify_qr(&qr).valid, "old attestation must stay valid after rotation");

    // The engine still holds the old signer, which is now superseded.
    let request = VerificationRequest::new("blob://after-rotation").with_sources(sources_with_scores(scenario_one_scores()));
    let after = engine.verify(request, &CancelToken::new()).unwrap();
    assert_eq!(after.record.status, VerificationStatus::Verified);
    assert!(after.attestation.is_none());
    assert!(after.attestation_error.unwrap().contains("superseded"));

    let new_signer = IssuerSigner::new(ISSUER, new_key_id, new_key);
    let fresh = service.issue(&new_signer, sample_fields()).unwrap();
    assert!(service.verify(&fresh).is_ok());
}

// =============================================================================
// Edge cases
// =============================================================================

#[test]
fn test_no_evidence_requires_review() {
    let (engine, _) = attesting_engine();
    let outcome = engine
        .verify(VerificationRequest::new("blob://empty"), &CancelToken::new())
        .unwrap();

    assert_eq!(outcome.record.status, VerificationStatus::RequiresReview);
    assert!(outcome.record.risk_score.is_none());
    assert!(outcome.record.escalation_reasons.contains(&EscalationReason::NoEvidence));
    assert!(outcome.record.decision_rationale.contains("no fused score"));
}

#[test]
fn test_credential_without_seal_signature_or_qr_is_signature_invalid() {
    let (engine, _) = attesting_engine();
    let mut request = VerificationRequest::new("blob://unmarked");
    for layer in LayerKind::ALL {
        let mut result = clean_layer(layer, 0.95);
        match &mut result {
            LayerResult::SignatureSeal(s) => {
                s.seals_detected = 0;
                s.signatures_detected = 0;
            }
            LayerResult::QrIntegrity(q) => {
                q.qr_detected = false;
                q.qr_decoded = false;
                q.signature_valid = None;
                q.fields = None;
            }
            _ => {}
        }
        request = request.with_source(static_source(result));
    }

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();

    assert_eq!(outcome.record.status, VerificationStatus::SignatureInvalid);
    assert!(outcome
        .record
        .escalation_reasons
        .contains(&EscalationReason::NoAuthenticationMarks));
    assert!(outcome.attestation.is_none());
}

#[test]
fn test_risk_factors_hold_back_a_high_score() {
    let (engine, _) = attesting_engine();
    let scores = ScoreSet {
        extraction: Some(0.6),
        ..ScoreSet::uniform(1.0)
    };
    let request = VerificationRequest::new("blob://risky").with_sources(sources_with_scores(scores));

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();
    let record = &outcome.record;

    assert!(record.risk_score.as_ref().unwrap().overall_score >= 0.85);
    assert_eq!(record.status, VerificationStatus::RequiresReview);
    assert!(record
        .escalation_reasons
        .iter()
        .any(|r| matches!(r, EscalationReason::RiskFactorsPresent { factors } if factors.len() == 1)));
    assert!(outcome.attestation.is_none());
}

#[test]
fn test_weak_evidence_fails() {
    let (engine, _) = attesting_engine();
    let request = VerificationRequest::new("blob://weak").with_sources(sources_with_scores(ScoreSet::uniform(0.2)));

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();
    assert_eq!(outcome.record.status, VerificationStatus::Failed);
    assert!(!outcome.record.requires_manual_review);
}

#[test]
fn test_manual_field_conflict_escalates() {
    let (engine, _) = attesting_engine();
    let manual = credfuse::CertificateFields {
        name: Some("Charles Babbage".to_string()),
        certificate_id: Some("CERT-1999-0001".to_string()),
        ..Default::default()
    };
    let request = VerificationRequest::new("blob://manual")
        .with_manual_fields(manual)
        .with_sources(sources_with_scores(ScoreSet::uniform(0.95)));

    let outcome = engine.verify(request, &CancelToken::new()).unwrap();

    assert_eq!(outcome.record.status, VerificationStatus::RequiresReview);
    assert_eq!(outcome.record.fields.name.as_deref(), Some("Charles Babbage"));
    let consistency = outcome.record.consistency.as_ref().unwrap();
    assert!(consistency.has_discrepancies());
    assert!(outcome
        .record
        .escalation_reasons
        .iter()
        .any(|r| matches!(r, EscalationReason::ConsistencyMismatch { .. })));
}
