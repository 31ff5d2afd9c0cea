//! credfuse - Credential verification fusion and attestation engine
//!
//! This crate fuses the scores of independent verification layers
//! (extraction, registry match, forensics, signature/seal, QR integrity)
//! into one risk score, decides a verification outcome, and issues signed,
//! publicly verifiable attestations for verified credentials.

pub mod attestation;
pub mod cancel;
pub mod config;
pub mod consistency;
pub mod decision;
pub mod evidence;
pub mod fusion;
pub mod keys;
pub mod mock;
pub mod pipeline;
pub mod record;
pub mod signing;
pub mod timeout;

pub use attestation::{AttestationConfig, AttestationError, AttestationService, IssuanceError, SignedAttestation};
pub use cancel::{CancelPolicy, CancelToken};
pub use config::{ConfigError, EffectiveConfig, EngineConfig};
pub use consistency::{ConsistencyReport, ConsistencyValidator};
pub use decision::{Decision, DecisionEngine, DecisionThresholds, EscalationReason, HardOverrides, VerificationStatus};
pub use evidence::{EvidenceSource, LayerCollector, LayerKind, LayerResult};
pub use fusion::{FusionScorer, FusionWeights, RiskLevel, RiskScore};
pub use keys::{InstitutionKey, KeyRegistry, KeyRegistryError};
pub use pipeline::{PipelineError, PipelineResult, VerificationEngine, VerificationOutcome, VerificationRequest};
pub use record::{RecordError, ReviewDecision, VerificationRecord};
pub use signing::{IssuerSigner, SigningError};
pub use timeout::LayerTimeouts;

pub use credfuse_protocol::{CertificateFields, ErrorCode, PublicVerificationResponse};
