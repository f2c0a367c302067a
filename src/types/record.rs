//! Tabular record sets flowing through the pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Uploaded table before any validation.
///
/// Cells are kept exactly as read; rows shorter than the header are padded
/// with empty cells so every row has one cell per header.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecordSet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawRecordSet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Table whose headers are canonical and cover every required field
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ValidatedRecordSet {
    /// Built by the schema validator once required columns are confirmed
    pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Canonical column names, unique, in upload order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Typed feature cell. Missing values never reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            FeatureValue::Text(_) => None,
        }
    }

    /// Integer view of the value; integral floats qualify
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(*v),
            FeatureValue::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Feature matrix handed to the classifier.
///
/// Patient ids are held outside the matrix as the row key.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecordSet {
    columns: Vec<String>,
    ids: Vec<String>,
    rows: Vec<Vec<FeatureValue>>,
}

impl FeatureRecordSet {
    pub fn new(columns: Vec<String>, ids: Vec<String>, rows: Vec<Vec<FeatureValue>>) -> Self {
        debug_assert_eq!(ids.len(), rows.len());
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, ids, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of `column`, one per row in table order
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &FeatureValue> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_rows_padded_to_header_width() {
        let raw = RawRecordSet::new(
            vec!["id".into(), "age".into(), "bmi".into()],
            vec![vec!["1".into()]],
        );
        assert_eq!(raw.rows()[0], vec!["1", "", ""]);
    }

    #[test]
    fn test_integer_view_accepts_integral_floats() {
        assert_eq!(FeatureValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(FeatureValue::Int(2).as_i64(), Some(2));
        assert_eq!(FeatureValue::Float(0.5).as_i64(), None);
        assert_eq!(FeatureValue::Text("Male".into()).as_i64(), None);
    }

    #[test]
    fn test_column_view() {
        let set = FeatureRecordSet::new(
            vec!["gender".into(), "diet".into()],
            vec!["7".into(), "8".into()],
            vec![
                vec![FeatureValue::Text("Male".into()), FeatureValue::Int(1)],
                vec![FeatureValue::Text("Female".into()), FeatureValue::Int(2)],
            ],
        );

        let diet: Vec<&FeatureValue> = set.column("diet").unwrap().collect();
        assert_eq!(diet, vec![&FeatureValue::Int(1), &FeatureValue::Int(2)]);
        assert!(set.column("bmi").is_none());
        assert!(set.has_column("gender"));
    }
}
