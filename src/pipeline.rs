//! Verification pipeline
//!
//! Collector → (fusion + consistency) → decision → (if verified) attestation.
//!
//! The only state kept between requests is the collector's list of producer
//! threads that outlived their grace period. Every request carries its own
//! evidence sources and cancel token.

use std::sync::Arc;
use std::time::Instant;

use credfuse_protocol::CertificateFields;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::attestation::{AttestationService, IssuanceError, SignedAttestation};
use crate::cancel::{CancelPolicy, CancelToken};
use crate::config::{ConfigError, EngineConfig};
use crate::consistency::ConsistencyValidator;
use crate::decision::DecisionEngine;
use crate::evidence::{
    database_match, extraction, millis, qr_integrity, Collection, EvidenceSource, LayerCollector, LayerResult,
};
use crate::fusion::FusionScorer;
use crate::record::{RecordError, ReviewDecision, VerificationRecord};
use crate::signing::IssuerSigner;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cancelled")]
    Cancelled,

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("issuance error: {0}")]
    Issuance(#[from] IssuanceError),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::InvalidRequest(_) => 2,
            PipelineError::Cancelled => 80,
            PipelineError::Record(_) => 3,
            PipelineError::Issuance(_) => 4,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// One credential to verify
pub struct VerificationRequest {
    /// Opaque reference to the submitted credential
    pub blob_ref: String,

    /// Operator-supplied fields; override extracted values
    pub manual_fields: Option<CertificateFields>,

    /// One evidence source per layer
    pub sources: Vec<Box<dyn EvidenceSource>>,
}

impl VerificationRequest {
    pub fn new(blob_ref: impl Into<String>) -> Self {
        Self {
            blob_ref: blob_ref.into(),
            manual_fields: None,
            sources: Vec::new(),
        }
    }

    pub fn with_manual_fields(mut self, fields: CertificateFields) -> Self {
        self.manual_fields = Some(fields);
        self
    }

    pub fn with_source(mut self, source: Box<dyn EvidenceSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: Vec<Box<dyn EvidenceSource>>) -> Self {
        self.sources.extend(sources);
        self
    }
}

/// Result of one verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub record: VerificationRecord,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<SignedAttestation>,

    /// QR string for the attestation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,

    /// Why a verified record did not get an attestation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_error: Option<String>,
}

impl VerificationOutcome {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

struct Attester {
    service: Arc<AttestationService>,
    signer: Arc<IssuerSigner>,
}

/// Runs verification requests end to end
pub struct VerificationEngine {
    config: EngineConfig,
    collector: LayerCollector,
    scorer: FusionScorer,
    consistency: ConsistencyValidator,
    decision: DecisionEngine,
    attester: Option<Attester>,
}

impl VerificationEngine {
    /// Create an engine; the config is validated first
    pub fn new(config: EngineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            collector: LayerCollector::new(config.timeouts),
            scorer: FusionScorer::new(config.fusion, config.thresholds),
            consistency: ConsistencyValidator::new(),
            decision: DecisionEngine::new(config.thresholds, config.overrides),
            attester: None,
            config,
        })
    }

    /// Issue attestations for verified records with this signer
    pub fn with_attestation(mut self, service: Arc<AttestationService>, signer: Arc<IssuerSigner>) -> Self {
        self.attester = Some(Attester { service, signer });
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The evidence collector, shared across requests
    pub fn collector(&self) -> &LayerCollector {
        &self.collector
    }

    /// Verify one credential
    pub fn verify(&self, request: VerificationRequest, cancel: &CancelToken) -> PipelineResult<VerificationOutcome> {
        let started = Instant::now();
        if request.blob_ref.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("blob_ref must not be empty".to_string()));
        }

        let collection = self.collector.collect(request.sources, cancel);
        if collection.cancelled && self.config.cancel_policy == CancelPolicy::Discard {
            info!(blob_ref = %request.blob_ref, "verification cancelled; discarding");
            return Err(PipelineError::Cancelled);
        }

        let mut record = self.decide_collection(&request.blob_ref, request.manual_fields.as_ref(), collection)?;
        record.processing_time_ms = millis(started.elapsed());

        info!(
            verification_id = %record.id,
            status = %record.status,
            overall = record.risk_score.as_ref().map(|r| r.overall_score),
            processing_time_ms = record.processing_time_ms,
            "verification decided"
        );

        Ok(self.attest(record))
    }

    /// Run fusion, consistency and decision over already collected evidence
    pub fn decide_collection(
        &self,
        blob_ref: &str,
        manual_fields: Option<&CertificateFields>,
        collection: Collection,
    ) -> PipelineResult<VerificationRecord> {
        let fields = submitted_fields(&collection.results, manual_fields);
        let mut record = VerificationRecord::new(blob_ref, fields, collection);

        let risk = match self.scorer.score(&record.layer_results) {
            Ok(risk) => Some(risk),
            Err(e) => {
                warn!(verification_id = %record.id, error = %e, "fusion produced no score");
                None
            }
        };
        let consistency = self
            .consistency
            .validate_layers(&record.layer_results, manual_fields);
        let decision = self
            .decision
            .decide(&record.layer_results, risk.as_ref(), Some(&consistency));

        record.apply_decision(risk, consistency, decision)?;
        Ok(record)
    }

    /// Apply a reviewer decision, issuing an attestation on approval
    pub fn review(&self, mut record: VerificationRecord, review: ReviewDecision) -> PipelineResult<VerificationOutcome> {
        record.apply_review(review)?;
        info!(
            verification_id = %record.id,
            status = %record.status,
            reviewer_id = record.reviewer_id.as_deref().unwrap_or_default(),
            "review applied"
        );
        Ok(self.attest(record))
    }

    fn attest(&self, record: VerificationRecord) -> VerificationOutcome {
        let mut outcome = VerificationOutcome {
            record,
            attestation: None,
            qr_payload: None,
            attestation_error: None,
        };
        let Some(attester) = &self.attester else {
            return outcome;
        };
        if !outcome.record.is_attestable() {
            return outcome;
        }

        let issued = attester
            .service
            .issue_for_record(&attester.signer, &outcome.record)
            .and_then(|attestation| Ok((attestation.to_qr_string()?, attestation)));
        match issued {
            Ok((qr, attestation)) => {
                outcome.qr_payload = Some(qr);
                outcome.attestation = Some(attestation);
            }
            Err(e) => {
                warn!(verification_id = %outcome.record.id, error = %e, "attestation not issued");
                outcome.attestation_error = Some(e.to_string());
            }
        }
        outcome
    }
}

/// Fields as submitted: extracted fields with manual fields applied, or the
/// first other source that carries any fields.
fn submitted_fields(layers: &[LayerResult], manual: Option<&CertificateFields>) -> CertificateFields {
    let base = extraction(layers)
        .map(|e| e.fields.clone())
        .filter(|f| !f.is_empty())
        .or_else(|| qr_integrity(layers).and_then(|q| q.fields.clone()))
        .or_else(|| {
            database_match(layers)
                .filter(|d| d.match_found)
                .and_then(|d| d.record.clone())
        })
        .unwrap_or_default();
    match manual {
        Some(manual) => base.overlay(manual),
        None => base,
    }
}
