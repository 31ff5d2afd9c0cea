//! Effective configuration with provenance
//!
//! The effective config is the merged configuration plus a record of which
//! layers contributed to it, with digests of any file it was read from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::engine::EngineConfig;
use super::merge::{deep_merge, merge_layers};

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "credfuse/effective_config@1";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Origin of this source
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Typed, validated form of `config`
    #[serde(skip)]
    engine: EngineConfig,
}

impl EffectiveConfig {
    /// Build effective config from layers: built-in defaults, an optional
    /// TOML file, then CLI overrides.
    ///
    /// A config path that was asked for but does not exist is an error.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        layers.push(EngineConfig::default().to_value()?);
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        if let Some(path) = config_path {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let engine = EngineConfig::from_value(merged.clone())?;
        engine.validate()?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            engine,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    /// Typed engine configuration
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get a config value as f64
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    /// Get a config value as u64
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Parse `section.key=value` CLI overrides into one JSON layer.
///
/// Values are read as JSON when they parse (`0.9`, `true`, `"x"`) and as a
/// plain string otherwise (`discard`).
pub fn parse_overrides(assignments: &[String]) -> Result<Option<Value>, ConfigError> {
    let mut layer: Option<Value> = None;
    for assignment in assignments {
        let (path, raw) = assignment.split_once('=').ok_or_else(|| {
            ConfigError::ParseError(format!("override '{}' must be KEY=VALUE", assignment))
        })?;
        let path = path.trim();
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(ConfigError::ParseError(format!(
                "override '{}' has an empty key",
                assignment
            )));
        }

        let raw = raw.trim();
        let mut value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        for part in path.rsplit('.') {
            let mut map = serde_json::Map::new();
            map.insert(part.to_string(), value);
            value = Value::Object(map);
        }

        layer = Some(match layer {
            Some(existing) => deep_merge(existing, value),
            None => value,
        });
    }
    Ok(layer)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.get_f64("thresholds.auto_approve"), Some(0.85));
        assert_eq!(config.get_u64("attestation.validity_days"), Some(3650));
        assert_eq!(config.engine(), &EngineConfig::default());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_build_with_cli_override() {
        let cli = serde_json::json!({"attestation": {"validity_days": 30}});
        let config = EffectiveConfig::build(None, Some(cli)).unwrap();

        assert_eq!(config.engine().attestation.validity_days, 30);
        assert_eq!(config.sources.last().unwrap().origin, ConfigOrigin::Cli);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let cli = serde_json::json!({"fusion": {"qr_integrity": 0.5}});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_threshold_order_validated() {
        let cli = serde_json::json!({"thresholds": {"review_floor": 0.95}});
        assert!(EffectiveConfig::build(None, Some(cli)).is_err());
    }

    #[test]
    fn test_timeout_bounds_validated() {
        let cli = serde_json::json!({"timeouts": {"forensics_ms": 0}});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("forensics"));
    }

    #[test]
    fn test_load_toml_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "cancel_policy = \"discard\"").unwrap();
        writeln!(temp, "[thresholds]").unwrap();
        writeln!(temp, "auto_approve = 0.9").unwrap();
        writeln!(temp, "[timeouts]").unwrap();
        writeln!(temp, "grace_ms = 250").unwrap();

        let config = EffectiveConfig::build(Some(temp.path()), None).unwrap();

        assert_eq!(config.engine().thresholds.auto_approve, 0.9);
        assert_eq!(config.engine().timeouts.grace_ms, 250);
        assert_eq!(config.engine().cancel_policy, crate::cancel::CancelPolicy::Discard);

        let source = &config.sources[1];
        assert_eq!(source.origin, ConfigOrigin::File);
        assert_eq!(source.digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[attestation]").unwrap();
        writeln!(temp, "validity_days = 365").unwrap();

        let cli = parse_overrides(&["attestation.validity_days=7".to_string()]).unwrap();
        let config = EffectiveConfig::build(Some(temp.path()), cli).unwrap();
        assert_eq!(config.engine().attestation.validity_days, 7);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = EffectiveConfig::build(Some(Path::new("/nonexistent/credfuse.toml")), None);
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[thresholds").unwrap();
        assert!(matches!(
            EffectiveConfig::build(Some(temp.path()), None),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_overrides() {
        let layer = parse_overrides(&[
            "thresholds.auto_approve=0.9".to_string(),
            "thresholds.auto_reject = 0.2".to_string(),
            "cancel_policy=discard".to_string(),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(layer["thresholds"]["auto_approve"], 0.9);
        assert_eq!(layer["thresholds"]["auto_reject"], 0.2);
        assert_eq!(layer["cancel_policy"], "discard");

        assert!(parse_overrides(&[]).unwrap().is_none());
        assert!(parse_overrides(&["novalue".to_string()]).is_err());
        assert!(parse_overrides(&["a..b=1".to_string()]).is_err());
    }
}
