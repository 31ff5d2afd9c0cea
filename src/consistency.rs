//! Cross-source field consistency
//!
//! Compares the canonical certificate fields across up to three sources:
//! the extracted fields (with any manual overrides applied), the fields
//! embedded in the QR payload, and the matched issuer database record.
//!
//! Values are compared after case folding and whitespace normalization.
//! Nothing here is fuzzy: "Jon" and "John" disagree.

use credfuse_protocol::{CertificateFields, FieldName};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::{database_match, extraction, qr_integrity, LayerResult};

/// Where a field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Extracted,
    Qr,
    Database,
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldSource::Extracted => "extracted",
            FieldSource::Qr => "qr",
            FieldSource::Database => "database",
        };
        f.write_str(name)
    }
}

/// Two sources disagreeing on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: FieldName,
    pub source_a: FieldSource,
    pub value_a: String,
    pub source_b: FieldSource,
    pub value_b: String,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}='{}' vs {}='{}'",
            self.field, self.source_a, self.value_a, self.source_b, self.value_b
        )
    }
}

/// Result of a consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Sources that contributed at least one field.
    pub sources: Vec<FieldSource>,

    /// Fields present in at least one source.
    pub fields_compared: usize,

    /// Fields on which every source carrying them agrees.
    pub fields_agreeing: usize,

    /// Percentage in [0, 100]; 100 when there was nothing to compare.
    pub match_percentage: f64,

    /// Every disagreeing pair.
    pub discrepancies: Vec<Discrepancy>,
}

impl ConsistencyReport {
    /// Percentage of compared fields with a disagreement.
    pub fn mismatch_percentage(&self) -> f64 {
        100.0 - self.match_percentage
    }

    /// Returns true if any pair of sources disagrees.
    pub fn has_discrepancies(&self) -> bool {
        !self.discrepancies.is_empty()
    }
}

/// Normalize a field value for comparison: trim, collapse inner whitespace,
/// and case-fold. Blank values normalize to `None`.
pub fn normalize(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

/// Stateless field consistency validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyValidator;

impl ConsistencyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Compare up to three field sources.
    pub fn validate(
        &self,
        extracted: Option<&CertificateFields>,
        qr: Option<&CertificateFields>,
        database: Option<&CertificateFields>,
    ) -> ConsistencyReport {
        let candidates = [
            (FieldSource::Extracted, extracted),
            (FieldSource::Qr, qr),
            (FieldSource::Database, database),
        ];
        let present: Vec<(FieldSource, &CertificateFields)> = candidates
            .iter()
            .filter_map(|(source, fields)| fields.map(|f| (*source, f)))
            .filter(|(_, fields)| !fields.is_empty())
            .collect();

        let mut fields_compared = 0;
        let mut fields_agreeing = 0;
        let mut discrepancies = Vec::new();

        for field in FieldName::CANONICAL {
            let values: Vec<(FieldSource, &str, String)> = present
                .iter()
                .filter_map(|(source, fields)| {
                    let raw = fields.get(field)?;
                    normalize(raw).map(|normalized| (*source, raw.trim(), normalized))
                })
                .collect();

            if values.is_empty() {
                continue;
            }
            fields_compared += 1;

            let mut agrees = true;
            for (i, (source_a, raw_a, norm_a)) in values.iter().enumerate() {
                for (source_b, raw_b, norm_b) in values.iter().skip(i + 1) {
                    if norm_a != norm_b {
                        agrees = false;
                        discrepancies.push(Discrepancy {
                            field,
                            source_a: *source_a,
                            value_a: raw_a.to_string(),
                            source_b: *source_b,
                            value_b: raw_b.to_string(),
                        });
                    }
                }
            }
            if agrees {
                fields_agreeing += 1;
            }
        }

        let match_percentage = if fields_compared == 0 {
            100.0
        } else {
            100.0 * fields_agreeing as f64 / fields_compared as f64
        };

        ConsistencyReport {
            sources: present.iter().map(|(source, _)| *source).collect(),
            fields_compared,
            fields_agreeing,
            match_percentage,
            discrepancies,
        }
    }

    /// Compare the field sources carried by a set of layer results.
    ///
    /// `manual_fields` are overlaid on the extracted fields first.
    pub fn validate_layers(
        &self,
        layers: &[LayerResult],
        manual_fields: Option<&CertificateFields>,
    ) -> ConsistencyReport {
        let extracted = match (extraction(layers).map(|e| &e.fields), manual_fields) {
            (Some(fields), Some(manual)) => Some(fields.overlay(manual)),
            (Some(fields), None) => Some(fields.clone()),
            (None, Some(manual)) => Some(manual.clone()),
            (None, None) => None,
        };
        let qr = qr_integrity(layers).and_then(|q| q.fields.as_ref());
        let database = database_match(layers)
            .filter(|d| d.match_found)
            .and_then(|d| d.record.as_ref());

        self.validate(extracted.as_ref(), qr, database)
    }
}
