//! Column-name normalization and required-field validation.
//!
//! Uploaded headers are free-form ("Physical Activity Days Per Week",
//! "CK-MB", "ID "). They are mapped to canonical snake_case names before any
//! comparison, then checked against the required feature set.

use crate::error::{PipelineError, Result};
use crate::types::{RawRecordSet, ValidatedRecordSet};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Canonical name of the patient identifier column
pub const ID_COLUMN: &str = "id";

/// Clinical and demographic fields every upload must provide besides the id
pub const REQUIRED_FEATURES: [&str; 17] = [
    "age",
    "gender",
    "bmi",
    "cholesterol",
    "triglycerides",
    "ck_mb",
    "troponin",
    "diabetes",
    "family_history",
    "smoking",
    "obesity",
    "alcohol_consumption",
    "previous_heart_problems",
    "medication_use",
    "diet",
    "stress_level",
    "physical_activity_days_per_week",
];

/// Characters replaced by `_` during normalization (plus all whitespace)
const SEPARATORS: [char; 5] = [':', '(', ')', '-', '/'];

/// Normalize a column name to its canonical form.
///
/// Lowercase, trim, map `: ( ) - /` and whitespace to `_`, collapse `_` runs
/// and strip underscores from both ends.
pub fn normalize_column_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());

    for ch in lowered.trim().chars() {
        let ch = if ch.is_whitespace() || SEPARATORS.contains(&ch) {
            '_'
        } else {
            ch
        };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }

    out.trim_matches('_').to_string()
}

/// Validates uploads against the required feature set
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    required: Vec<String>,
}

impl SchemaValidator {
    /// Validator requiring the identifier plus [`REQUIRED_FEATURES`]
    pub fn new() -> Self {
        let required = std::iter::once(ID_COLUMN)
            .chain(REQUIRED_FEATURES)
            .map(str::to_string)
            .collect();
        Self { required }
    }

    /// Canonicalize headers and confirm every required field is present.
    ///
    /// The error carries every missing field and every column that was
    /// present, so a caller can self-diagnose.
    pub fn validate(&self, raw: &RawRecordSet) -> Result<ValidatedRecordSet> {
        let canonical: Vec<String> = raw
            .headers()
            .iter()
            .map(|h| normalize_column_name(h))
            .collect();

        // First occurrence wins when two headers collapse to the same name
        let mut seen = HashSet::new();
        let mut keep = Vec::with_capacity(canonical.len());
        for (idx, name) in canonical.iter().enumerate() {
            if seen.insert(name.as_str()) {
                keep.push(idx);
            } else {
                warn!(
                    column = %name,
                    header = %raw.headers()[idx],
                    "Duplicate column after normalization, keeping first occurrence"
                );
            }
        }

        let columns: Vec<String> = keep.iter().map(|&i| canonical[i].clone()).collect();

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|req| !seen.contains(req.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            debug!(missing = ?missing, "Schema validation failed");
            return Err(PipelineError::SchemaValidation {
                missing,
                present: columns,
            });
        }

        let rows = raw
            .rows()
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(ValidatedRecordSet::new(columns, rows))
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}
