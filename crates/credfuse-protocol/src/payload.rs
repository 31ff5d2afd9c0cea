//! Attestation payload (the signed part of a QR attestation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::CertificateFields;
use crate::{PAYLOAD_TYPE, PAYLOAD_VERSION};

/// Longest accepted nonce, in characters.
pub const MAX_NONCE_LEN: usize = 128;

/// Longest accepted issuer or key identifier, in characters.
pub const MAX_ID_LEN: usize = 128;

/// Versioned attestation payload.
///
/// Field order here is irrelevant for signing: signers and verifiers sign
/// the RFC 8785 canonical encoding, never this struct's serde output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationPayload {
    /// Payload format version (always "1.0" for this implementation).
    pub version: String,

    /// Payload type discriminator (always "certificate_verification").
    #[serde(rename = "type")]
    pub payload_type: String,

    /// Issuing institution.
    pub issuer_id: String,

    /// Key used to sign this payload.
    pub key_id: String,

    /// Attested certificate fields.
    pub data: CertificateFields,

    /// Per-issuance random nonce (hex).
    pub nonce: String,

    /// When the attestation was issued.
    #[serde(with = "wire_time")]
    pub issued_at: DateTime<Utc>,

    /// When the attestation stops being valid.
    #[serde(with = "wire_time")]
    pub expires_at: DateTime<Utc>,
}

/// Timestamps on the wire have exactly one spelling: `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Other RFC 3339 spellings of the same instant (lowercase separators,
/// offsets, fractions) are rejected so a signed payload has one wire form.
mod wire_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let time = DateTime::parse_from_rfc3339(&raw)
            .map_err(de::Error::custom)?
            .with_timezone(&Utc);
        if time.to_rfc3339_opts(SecondsFormat::Secs, true) != raw {
            return Err(de::Error::custom(format!(
                "timestamp '{}' is not of the form YYYY-MM-DDTHH:MM:SSZ",
                raw
            )));
        }
        Ok(time)
    }
}

impl AttestationPayload {
    /// Create a payload of the current version and type.
    pub fn new(
        issuer_id: impl Into<String>,
        key_id: impl Into<String>,
        data: CertificateFields,
        nonce: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: PAYLOAD_VERSION.to_string(),
            payload_type: PAYLOAD_TYPE.to_string(),
            issuer_id: issuer_id.into(),
            key_id: key_id.into(),
            data,
            nonce: nonce.into(),
            issued_at,
            expires_at,
        }
    }

    /// Check structural validity of a payload received from outside.
    ///
    /// Returns a single-line description of the first violation found.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.version != PAYLOAD_VERSION {
            return Err(format!("unsupported payload version '{}'", self.version));
        }
        if self.payload_type != PAYLOAD_TYPE {
            return Err(format!("unsupported payload type '{}'", self.payload_type));
        }
        if self.issuer_id.is_empty() || self.issuer_id.len() > MAX_ID_LEN {
            return Err("issuer_id must be 1..=128 characters".to_string());
        }
        if self.key_id.is_empty() || self.key_id.len() > MAX_ID_LEN {
            return Err("key_id must be 1..=128 characters".to_string());
        }
        if self.nonce.is_empty()
            || self.nonce.len() > MAX_NONCE_LEN
            || !self.nonce.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err("nonce must be 1..=128 hex characters".to_string());
        }
        if self.expires_at < self.issued_at {
            return Err("expires_at precedes issued_at".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> AttestationPayload {
        AttestationPayload::new(
            "inst-01",
            "inst-01-key-1",
            CertificateFields {
                name: Some("Ada Lovelace".to_string()),
                ..Default::default()
            },
            "00ff10ab",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2036, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_type_field_renamed() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "certificate_verification");
        assert_eq!(json["version"], "1.0");
        assert!(json.get("payload_type").is_none());
    }

    #[test]
    fn test_timestamps_have_one_spelling() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["issued_at"], "2026-01-01T00:00:00Z");

        let parsed: AttestationPayload = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed, sample());

        for spelling in [
            "2026-01-01t00:00:00Z",
            "2026-01-01 00:00:00Z",
            "2026-01-01T00:00:00z",
            "2026-01-01T00:00:00+00:00",
            "2026-01-01T00:00:00.000Z",
        ] {
            let mut variant = json.clone();
            variant["issued_at"] = spelling.into();
            assert!(
                serde_json::from_value::<AttestationPayload>(variant).is_err(),
                "{} accepted",
                spelling
            );
        }
    }

    #[test]
    fn test_validate_shape_accepts_sample() {
        assert!(sample().validate_shape().is_ok());
    }

    #[test]
    fn test_validate_shape_rejects_bad_version() {
        let mut payload = sample();
        payload.version = "2.0".to_string();
        assert!(payload.validate_shape().unwrap_err().contains("version"));
    }

    #[test]
    fn test_validate_shape_rejects_inverted_window() {
        let mut payload = sample();
        payload.expires_at = payload.issued_at - chrono::Duration::days(1);
        assert!(payload.validate_shape().is_err());
    }

    #[test]
    fn test_validate_shape_rejects_non_hex_nonce() {
        let mut payload = sample();
        payload.nonce = "not-hex!".to_string();
        assert!(payload.validate_shape().is_err());
    }
}
