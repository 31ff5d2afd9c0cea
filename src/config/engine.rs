//! Engine configuration (typed form of the merged config)

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::attestation::AttestationConfig;
use crate::cancel::CancelPolicy;
use crate::decision::{DecisionThresholds, HardOverrides};
use crate::fusion::FusionWeights;
use crate::timeout::LayerTimeouts;

/// Every tunable the engine reads.
///
/// Nothing in the engine reads global configuration; components receive
/// the section they need from one of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub fusion: FusionWeights,
    pub thresholds: DecisionThresholds,
    pub overrides: HardOverrides,
    pub timeouts: LayerTimeouts,
    pub attestation: AttestationConfig,
    pub cancel_policy: CancelPolicy,
}

impl EngineConfig {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Typed view of a merged config value
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate().map_err(ConfigError::ValidationError)?;
        self.thresholds.validate().map_err(ConfigError::ValidationError)?;
        self.overrides.validate().map_err(ConfigError::ValidationError)?;
        self.timeouts
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.attestation.validate().map_err(ConfigError::ValidationError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fusion.database_match, 0.30);
        assert_eq!(config.thresholds.auto_approve, 0.85);
        assert_eq!(config.overrides.tamper_indicator_limit, 3);
        assert_eq!(config.attestation.validity_days, 3650);
        assert_eq!(config.cancel_policy, CancelPolicy::CompleteWithGrace);
    }

    #[test]
    fn test_to_value() {
        let value = EngineConfig::default().to_value().unwrap();

        assert_eq!(value["fusion"]["extraction"], 0.25);
        assert_eq!(value["timeouts"]["qr_integrity_ms"], 3000);
        assert_eq!(value["cancel_policy"], "complete_with_grace");
    }

    #[test]
    fn test_partial_value_fills_defaults() {
        let config = EngineConfig::from_value(serde_json::json!({
            "thresholds": {"auto_approve": 0.9}
        }))
        .unwrap();

        assert_eq!(config.thresholds.auto_approve, 0.9);
        assert_eq!(config.thresholds.auto_reject, 0.30);
        assert_eq!(config.fusion, FusionWeights::default());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result = EngineConfig::from_value(serde_json::json!({"fusoin": {}}));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
