//! End-to-end processing of one uploaded file

use crate::error::{ErrorKind, PipelineError};
use crate::feature_extractor::FeatureExtractor;
use crate::ingest;
use crate::metrics::PipelineMetrics;
use crate::models::InferenceService;
use crate::schema::SchemaValidator;
use crate::types::PredictionResult;
use crate::upload::UploadStore;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Failed request: the error plus, when relevant, the columns supplied
#[derive(Debug)]
pub struct ProcessingFailure {
    pub error: PipelineError,
    /// Header row as uploaded, attached to schema and cleaning failures
    pub supplied_columns: Option<Vec<String>>,
}

impl ProcessingFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<PipelineError> for ProcessingFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            supplied_columns: None,
        }
    }
}

impl fmt::Display for ProcessingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(columns) = &self.supplied_columns {
            write!(f, "\n\nUploaded columns: {}", columns.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ProcessingFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs ingest, validation, feature extraction and inference in order
pub struct RiskPipeline {
    validator: SchemaValidator,
    extractor: FeatureExtractor,
    inference: Arc<InferenceService>,
    metrics: Arc<PipelineMetrics>,
    uploads: UploadStore,
}

impl RiskPipeline {
    pub fn new(
        inference: Arc<InferenceService>,
        metrics: Arc<PipelineMetrics>,
        uploads: UploadStore,
    ) -> Self {
        Self {
            validator: SchemaValidator::new(),
            extractor: FeatureExtractor::new(),
            inference,
            metrics,
            uploads,
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Score every row of an uploaded CSV file.
    ///
    /// The upload is stored under a unique name only once its filename has
    /// passed the CSV check, then parsed back from disk. The stored copy is
    /// removed when processing ends unless uploads are retained.
    pub fn process(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<PredictionResult, ProcessingFailure> {
        let start = Instant::now();
        info!(file = %filename, bytes = content.len(), "Processing file");

        let outcome = self.run(filename, content);
        let elapsed = start.elapsed();

        match &outcome {
            Ok((input_rows, result)) => {
                let probabilities: Vec<f64> = result.rows.iter().map(|r| r.probability).collect();
                self.metrics
                    .record_success(elapsed, *input_rows, &probabilities);
                info!(
                    file = %filename,
                    input_rows = input_rows,
                    scored_rows = result.len(),
                    processing_time_us = elapsed.as_micros() as u64,
                    "File processed"
                );
            }
            Err(failure) => {
                self.metrics.record_failure(elapsed, failure.kind());
                error!(
                    file = %filename,
                    kind = failure.kind().as_str(),
                    error = %failure,
                    "Processing failed"
                );
            }
        }

        outcome.map(|(_, result)| result)
    }

    fn run(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<(usize, PredictionResult), ProcessingFailure> {
        ingest::ensure_csv_filename(filename)?;
        let stored = self
            .uploads
            .save(filename, content)
            .map_err(|e| PipelineError::UploadStorage {
                reason: format!("{e:#}"),
            })?;
        let raw = ingest::read_csv_file(stored.path())?;

        let with_columns = |error: PipelineError| ProcessingFailure {
            error,
            supplied_columns: Some(raw.headers().to_vec()),
        };

        let validated = self.validator.validate(&raw).map_err(with_columns)?;
        let features = self.extractor.transform(&validated).map_err(with_columns)?;
        let result = self.inference.predict(&features)?;

        Ok((raw.len(), result))
    }
}
