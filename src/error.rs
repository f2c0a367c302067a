//! Error taxonomy for the risk scoring pipeline
//!
//! Every stage raises the most specific variant it can. Diagnostic detail
//! (missing columns, duplicate ids) travels as structured payload so callers
//! can branch on [`ErrorKind`] instead of parsing message text.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures raised by the ingest, validation, transform and inference stages
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Uploaded file is not a CSV
    #[error("Please upload a CSV file (got {filename:?})")]
    UnsupportedFileType { filename: String },

    /// Zero bytes uploaded, or a header with no data rows
    #[error("Uploaded file contains no data")]
    EmptyInput,

    /// CSV could not be parsed
    #[error("Failed to read CSV file: {0}")]
    CsvRead(#[from] csv::Error),

    /// A data row has more fields than the header
    #[error("Row {row} has {found} fields but the header has {expected}")]
    MalformedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Upload could not be written to or read back from the upload directory
    #[error("Failed to store upload: {reason}")]
    UploadStorage { reason: String },

    /// Required canonical fields absent after name normalization
    #[error(
        "Missing required features: {}\nAvailable columns: {}",
        missing.join(", "),
        present.join(", ")
    )]
    SchemaValidation {
        missing: Vec<String>,
        present: Vec<String>,
    },

    /// A data row has an empty identifier cell
    #[error("Row {row} has no patient identifier")]
    MissingIdentifier { row: usize },

    /// Identifier column has repeated values
    #[error("Duplicate patient identifiers: {}", ids.join(", "))]
    DuplicateIdentifier { ids: Vec<String> },

    /// Every row was eliminated by missing-value cleaning
    #[error("No data left after preprocessing: all {input_rows} rows had missing or invalid values")]
    EmptyAfterCleaning { input_rows: usize },

    /// Feature set lacks columns the classifier pipeline requires
    #[error("Missing features required by the model: {}", missing.join(", "))]
    MissingFeature { missing: Vec<String> },

    /// Model artifact not found at the configured path
    #[error("Model file not found at {}", path.display())]
    ModelArtifactMissing { path: PathBuf },

    /// Model artifact exists but cannot be used
    #[error("Invalid model artifact at {}: {reason}", path.display())]
    ModelArtifactInvalid { path: PathBuf, reason: String },

    /// Internal failure of the classifier during prediction
    #[error("Prediction failed: {0}")]
    Inference(#[from] ClassifierError),
}

/// Failures internal to the classifier pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("column {column:?} is required by the model but absent")]
    ColumnNotFound { column: String },

    #[error("shape mismatch: expected {expected} probabilities, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("column {column:?} holds {value:?}, which does not fit a {expected} input")]
    UnsupportedValue {
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("model input {column:?} has an unsupported type")]
    UnsupportedInput { column: String },

    #[error("model produced no probability output")]
    MissingOutput,

    #[error("ONNX Runtime error: {0}")]
    Runtime(String),

    #[error("non-finite probability for row {row}")]
    NonFinite { row: usize },
}

/// Discriminant of [`PipelineError`], stable across message wording changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFileType,
    EmptyInput,
    CsvRead,
    MalformedRow,
    UploadStorage,
    SchemaValidation,
    MissingIdentifier,
    DuplicateIdentifier,
    EmptyAfterCleaning,
    MissingFeature,
    ModelArtifactMissing,
    ModelArtifactInvalid,
    Inference,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFileType => "unsupported_file_type",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::CsvRead => "csv_read",
            ErrorKind::MalformedRow => "malformed_row",
            ErrorKind::UploadStorage => "upload_storage",
            ErrorKind::SchemaValidation => "schema_validation",
            ErrorKind::MissingIdentifier => "missing_identifier",
            ErrorKind::DuplicateIdentifier => "duplicate_identifier",
            ErrorKind::EmptyAfterCleaning => "empty_after_cleaning",
            ErrorKind::MissingFeature => "missing_feature",
            ErrorKind::ModelArtifactMissing => "model_artifact_missing",
            ErrorKind::ModelArtifactInvalid => "model_artifact_invalid",
            ErrorKind::Inference => "inference",
        }
    }
}

impl PipelineError {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedFileType { .. } => ErrorKind::UnsupportedFileType,
            PipelineError::EmptyInput => ErrorKind::EmptyInput,
            PipelineError::CsvRead(_) => ErrorKind::CsvRead,
            PipelineError::MalformedRow { .. } => ErrorKind::MalformedRow,
            PipelineError::UploadStorage { .. } => ErrorKind::UploadStorage,
            PipelineError::SchemaValidation { .. } => ErrorKind::SchemaValidation,
            PipelineError::MissingIdentifier { .. } => ErrorKind::MissingIdentifier,
            PipelineError::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
            PipelineError::EmptyAfterCleaning { .. } => ErrorKind::EmptyAfterCleaning,
            PipelineError::MissingFeature { .. } => ErrorKind::MissingFeature,
            PipelineError::ModelArtifactMissing { .. } => ErrorKind::ModelArtifactMissing,
            PipelineError::ModelArtifactInvalid { .. } => ErrorKind::ModelArtifactInvalid,
            PipelineError::Inference(_) => ErrorKind::Inference,
        }
    }

    /// Startup failures that must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ModelArtifactMissing | ErrorKind::ModelArtifactInvalid
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_lists_missing_and_present() {
        let err = PipelineError::SchemaValidation {
            missing: vec!["troponin".to_string(), "diet".to_string()],
            present: vec!["id".to_string(), "age".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("troponin, diet"));
        assert!(message.contains("id, age"));
        assert_eq!(err.kind(), ErrorKind::SchemaValidation);
    }

    #[test]
    fn test_inference_wraps_classifier_error() {
        let err: PipelineError = ClassifierError::Runtime(
            "Unknown Category and zeros = 0.".to_string(),
        )
        .into();

        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.to_string().contains("Unknown Category"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_artifact_errors_are_fatal() {
        let err = PipelineError::ModelArtifactMissing {
            path: PathBuf::from("models/model.onnx"),
        };
        assert!(err.is_fatal());
        assert_eq!(err.kind().as_str(), "model_artifact_missing");
    }
}
