//! Certificate field set carried in attestations and compared across sources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Certificate fields as extracted, embedded in a QR payload, or stored by
/// an issuer.
///
/// Absent fields are omitted from the serialized form so that the canonical
/// encoding of a payload does not depend on how a producer spells "missing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateFields {
    /// Holder name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issuer-assigned certificate identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,

    /// Course or programme name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,

    /// Issuing institution name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,

    /// Issue date as printed on the credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,

    /// Grade or classification, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,

    /// Issuer-specific extra fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

/// The canonical fields compared by the consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Name,
    CertificateId,
    Course,
    Institution,
    IssueDate,
}

impl FieldName {
    /// All canonical fields in comparison order.
    pub const CANONICAL: [FieldName; 5] = [
        FieldName::Name,
        FieldName::CertificateId,
        FieldName::Course,
        FieldName::Institution,
        FieldName::IssueDate,
    ];

    /// Returns the wire name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Name => "name",
            FieldName::CertificateId => "certificate_id",
            FieldName::Course => "course",
            FieldName::Institution => "institution",
            FieldName::IssueDate => "issue_date",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CertificateFields {
    /// Get a canonical field value.
    pub fn get(&self, field: FieldName) -> Option<&str> {
        let value = match field {
            FieldName::Name => &self.name,
            FieldName::CertificateId => &self.certificate_id,
            FieldName::Course => &self.course,
            FieldName::Institution => &self.institution,
            FieldName::IssueDate => &self.issue_date,
        };
        value.as_deref()
    }

    /// Set a canonical field value.
    pub fn set(&mut self, field: FieldName, value: Option<String>) {
        let slot = match field {
            FieldName::Name => &mut self.name,
            FieldName::CertificateId => &mut self.certificate_id,
            FieldName::Course => &mut self.course,
            FieldName::Institution => &mut self.institution,
            FieldName::IssueDate => &mut self.issue_date,
        };
        *slot = value;
    }

    /// Overlay another field set on top of this one.
    ///
    /// Every field present in `overlay` replaces the corresponding value.
    pub fn overlay(&self, overlay: &CertificateFields) -> CertificateFields {
        let mut merged = self.clone();
        for field in FieldName::CANONICAL {
            if let Some(value) = overlay.get(field) {
                merged.set(field, Some(value.to_string()));
            }
        }
        if overlay.grade.is_some() {
            merged.grade = overlay.grade.clone();
        }
        for (key, value) in &overlay.additional {
            merged.additional.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Number of canonical fields carrying a non-blank value.
    pub fn present_count(&self) -> usize {
        FieldName::CANONICAL
            .iter()
            .filter(|f| self.get(**f).is_some_and(|v| !v.trim().is_empty()))
            .count()
    }

    /// Returns true if no canonical field carries a value.
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}
