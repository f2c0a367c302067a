//! Feature engineering for heart attack risk inference.
//!
//! Turns a validated upload into the feature matrix the classifier was
//! trained on: typed values, no missing cells, and binary risk flags in place
//! of the raw CK-MB and troponin measurements.

use crate::error::{PipelineError, Result};
use crate::schema::{ID_COLUMN, REQUIRED_FEATURES};
use crate::types::{FeatureRecordSet, FeatureValue, ValidatedRecordSet};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Ordinal and boolean-coded columns coerced to integers
pub const INTEGER_COLUMNS: [&str; 9] = [
    "diabetes",
    "family_history",
    "smoking",
    "obesity",
    "alcohol_consumption",
    "previous_heart_problems",
    "medication_use",
    "stress_level",
    "physical_activity_days_per_week",
];

/// CK-MB level at or above which `risk_ck_mb` is set
pub const CK_MB_THRESHOLD: f64 = 0.05;

/// Troponin level at or above which `risk_troponin` is set
pub const TROPONIN_THRESHOLD: f64 = 0.04;

/// Feature columns handed to the classifier, in order
pub const FEATURE_COLUMNS: [&str; 17] = [
    "age",
    "gender",
    "bmi",
    "cholesterol",
    "triglycerides",
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
    "risk_ck_mb",
    "risk_troponin",
];

/// Cell contents treated as missing, compared after trimming
const MISSING_MARKERS: [&str; 13] = [
    "", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "<NA>", "#N/A", "n/a", "-NaN", "-nan",
];

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

/// Auto-index artifacts such as pandas' `Unnamed: 0`
fn is_index_artifact(column: &str) -> bool {
    column.is_empty()
        || column == "unnamed"
        || column
            .strip_prefix("unnamed_")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn parse_finite(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Truncate toward zero; values outside the `i64` range are unparseable
fn truncate_to_i64(value: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    let truncated = value.trunc();
    (-LIMIT..LIMIT).contains(&truncated).then(|| truncated as i64)
}

/// How a raw column is coerced
#[derive(Debug, Clone, Copy, PartialEq)]
enum Coercion {
    /// Finite number truncated toward zero
    Integer,
    /// Finite number, used for the biomarkers
    Float,
    /// Number when it parses, text otherwise
    Inferred,
}

impl Coercion {
    fn for_column(column: &str) -> Self {
        if INTEGER_COLUMNS.contains(&column) {
            Coercion::Integer
        } else if column == "ck_mb" || column == "troponin" {
            Coercion::Float
        } else {
            Coercion::Inferred
        }
    }

    /// `None` means missing: unparseable values never default to a number
    fn apply(self, cell: &str) -> Option<FeatureValue> {
        if is_missing(cell) {
            return None;
        }
        match self {
            Coercion::Integer => parse_finite(cell).and_then(truncate_to_i64).map(FeatureValue::Int),
            Coercion::Float => parse_finite(cell).map(FeatureValue::Float),
            Coercion::Inferred => Some(match parse_finite(cell) {
                Some(v) => FeatureValue::Float(v),
                None => FeatureValue::Text(cell.trim().to_string()),
            }),
        }
    }
}

/// Transforms validated uploads into classifier input.
///
/// Steps run in a fixed order: drop index artifacts, key rows by patient id,
/// coerce types, drop rows with missing values, derive biomarker flags.
/// Coercion runs before the drop so that garbage in a numeric column is
/// caught as missing.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Build the feature matrix for `data`.
    pub fn transform(&self, data: &ValidatedRecordSet) -> Result<FeatureRecordSet> {
        let input_rows = data.len();

        let dropped: Vec<&str> = data
            .columns()
            .iter()
            .map(String::as_str)
            .filter(|c| is_index_artifact(c))
            .collect();
        if !dropped.is_empty() {
            debug!(columns = ?dropped, "Dropped index artifact columns");
        }

        let ids = self.index_by_id(data)?;

        let sources: Vec<(&str, usize, Coercion)> = REQUIRED_FEATURES
            .iter()
            .map(|&name| -> Result<(&'static str, usize, Coercion)> {
                let idx = data.column_index(name).ok_or_else(|| {
                    PipelineError::SchemaValidation {
                        missing: vec![name.to_string()],
                        present: data.columns().to_vec(),
                    }
                })?;
                Ok((name, idx, Coercion::for_column(name)))
            })
            .collect::<Result<_>>()?;

        let mut kept_ids = Vec::with_capacity(input_rows);
        let mut rows = Vec::with_capacity(input_rows);

        for (id, raw_row) in ids.into_iter().zip(data.rows()) {
            let coerced: Option<HashMap<&str, FeatureValue>> = sources
                .iter()
                .map(|&(name, idx, coercion)| coercion.apply(&raw_row[idx]).map(|v| (name, v)))
                .collect();

            let Some(mut values) = coerced else {
                debug!(id = %id, "Dropping row with missing values");
                continue;
            };

            let ck_mb = values.remove("ck_mb").and_then(|v| v.as_f64());
            let troponin = values.remove("troponin").and_then(|v| v.as_f64());
            let (Some(ck_mb), Some(troponin)) = (ck_mb, troponin) else {
                continue;
            };
            values.insert("risk_ck_mb", risk_flag(ck_mb, CK_MB_THRESHOLD));
            values.insert("risk_troponin", risk_flag(troponin, TROPONIN_THRESHOLD));

            let row = FEATURE_COLUMNS
                .iter()
                .filter_map(|c| values.remove(c))
                .collect::<Vec<_>>();
            debug_assert_eq!(row.len(), FEATURE_COLUMNS.len());

            kept_ids.push(id);
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(PipelineError::EmptyAfterCleaning { input_rows });
        }

        info!(
            input_rows = input_rows,
            kept_rows = rows.len(),
            dropped_rows = input_rows - rows.len(),
            "Features extracted"
        );

        Ok(FeatureRecordSet::new(
            self.feature_names().iter().map(|c| c.to_string()).collect(),
            kept_ids,
            rows,
        ))
    }

    /// Patient ids in row order; rejects empty and repeated ids
    fn index_by_id(&self, data: &ValidatedRecordSet) -> Result<Vec<String>> {
        let idx = data
            .column_index(ID_COLUMN)
            .ok_or_else(|| PipelineError::SchemaValidation {
                missing: vec![ID_COLUMN.to_string()],
                present: data.columns().to_vec(),
            })?;

        let mut ids = Vec::with_capacity(data.len());
        let mut seen = HashSet::new();
        let mut duplicates: Vec<String> = Vec::new();

        for (row_no, row) in data.rows().iter().enumerate() {
            let id = row[idx].trim();
            if is_missing(id) {
                return Err(PipelineError::MissingIdentifier { row: row_no + 1 });
            }
            if !seen.insert(id.to_string()) && !duplicates.iter().any(|d| d == id) {
                duplicates.push(id.to_string());
            }
            ids.push(id.to_string());
        }

        if !duplicates.is_empty() {
            return Err(PipelineError::DuplicateIdentifier { ids: duplicates });
        }

        Ok(ids)
    }

    /// Get feature names (classifier contract order).
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_COLUMNS
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn risk_flag(value: f64, threshold: f64) -> FeatureValue {
    FeatureValue::Int(i64::from(value >= threshold))
}
