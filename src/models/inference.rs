//! Inference service wrapping the loaded classifier

use crate::config::AppConfig;
use crate::error::{ClassifierError, PipelineError, Result};
use crate::models::classifier::Classifier;
use crate::models::loader::ModelLoader;
use crate::types::{FeatureRecordSet, PredictionResult, RowPrediction};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

/// Columns the model's own transforms need before it can score anything
pub const PIPELINE_REQUIRED_COLUMNS: [&str; 4] = [
    "gender",
    "diet",
    "stress_level",
    "physical_activity_days_per_week",
];

/// Classifier shared by every request.
///
/// Created once at startup and handed to request handlers behind an `Arc`.
/// Never mutated after construction.
pub struct InferenceService {
    classifier: Box<dyn Classifier>,
}

impl InferenceService {
    /// Load the model configured in `config`
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::load(&config.model.path, config.model.onnx_threads)
    }

    /// Load the model artifact at `path`
    pub fn load<P: AsRef<Path>>(path: P, onnx_threads: usize) -> Result<Self> {
        let classifier = ModelLoader::with_threads(onnx_threads).load(path)?;
        Ok(Self::with_classifier(Box::new(classifier)))
    }

    /// Wrap an already loaded classifier
    pub fn with_classifier(classifier: Box<dyn Classifier>) -> Self {
        info!(
            required = ?PIPELINE_REQUIRED_COLUMNS,
            inputs = classifier.input_columns().len(),
            "Inference service initialized"
        );
        Self { classifier }
    }

    /// Positive-class probability for every row of `features`.
    ///
    /// Fails with [`PipelineError::MissingFeature`] before any scoring if a
    /// column the model needs is absent. Classifier failures come back as
    /// [`PipelineError::Inference`].
    pub fn predict(&self, features: &FeatureRecordSet) -> Result<PredictionResult> {
        let missing: Vec<String> = PIPELINE_REQUIRED_COLUMNS
            .iter()
            .filter(|c| !features.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingFeature { missing });
        }

        let start = Instant::now();
        let proba = self
            .classifier
            .predict_proba(features)
            .and_then(|proba| check_probabilities(proba, features.len()))
            .map_err(|e| {
                error!(error = %e, rows = features.len(), "Model inference failed");
                PipelineError::Inference(e)
            })?;

        let rows = features
            .ids()
            .iter()
            .zip(proba)
            .map(|(id, p)| RowPrediction {
                id: id.clone(),
                probability: p[1],
            })
            .collect::<Vec<_>>();

        debug!(
            rows = rows.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Inference complete"
        );

        Ok(PredictionResult::new(rows))
    }
}

/// One finite probability in [0, 1] per input row
fn check_probabilities(
    proba: Vec<[f64; 2]>,
    rows: usize,
) -> std::result::Result<Vec<[f64; 2]>, ClassifierError> {
    if proba.len() != rows {
        return Err(ClassifierError::ShapeMismatch {
            expected: rows,
            actual: proba.len(),
        });
    }
    if let Some(row) = proba
        .iter()
        .position(|p| !p[1].is_finite() || !(0.0..=1.0).contains(&p[1]))
    {
        return Err(ClassifierError::NonFinite { row });
    }
    Ok(proba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::classifier::tests::StubClassifier;
    use crate::types::FeatureValue;

    fn service() -> InferenceService {
        InferenceService::with_classifier(Box::new(StubClassifier {
            columns: PIPELINE_REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }))
    }

    fn features_with(columns: &[&str], gender: &str) -> FeatureRecordSet {
        let value = |column: &str, first: bool| match column {
            "gender" => FeatureValue::Text(if first { gender } else { "Female" }.to_string()),
            _ => FeatureValue::Int(if first { 1 } else { 6 }),
        };
        FeatureRecordSet::new(
            columns.iter().map(|c| c.to_string()).collect(),
            vec!["10".to_string(), "3".to_string()],
            vec![
                columns.iter().map(|c| value(c, true)).collect(),
                columns.iter().map(|c| value(c, false)).collect(),
            ],
        )
    }

    /// Classifier returning a fixed answer regardless of input
    struct FixedClassifier(Vec<[f64; 2]>);

    impl Classifier for FixedClassifier {
        fn input_columns(&self) -> Vec<String> {
            Vec::new()
        }

        fn predict_proba(
            &self,
            _features: &FeatureRecordSet,
        ) -> std::result::Result<Vec<[f64; 2]>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_predict_keeps_row_order_and_range() {
        let result = service()
            .predict(&features_with(&PIPELINE_REQUIRED_COLUMNS, "Male"))
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[0].id, "10");
        assert_eq!(result.rows[1].id, "3");
        assert!(result.rows.iter().all(|r| (0.0..=1.0).contains(&r.probability)));
    }

    #[test]
    fn test_missing_feature_lists_exactly_the_absent_columns() {
        let set = features_with(&["gender", "physical_activity_days_per_week"], "Male");
        let err = service().predict(&set).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingFeature);
        match err {
            PipelineError::MissingFeature { missing } => {
                assert_eq!(missing, vec!["diet", "stress_level"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classifier_failure_is_wrapped() {
        let set = features_with(&PIPELINE_REQUIRED_COLUMNS, "Unknown");
        let err = service().predict(&set).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
    }

    #[test]
    fn test_wrong_row_count_is_shape_mismatch() {
        let service = InferenceService::with_classifier(Box::new(FixedClassifier(vec![[0.5, 0.5]])));
        let err = service
            .predict(&features_with(&PIPELINE_REQUIRED_COLUMNS, "Male"))
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Inference(ClassifierError::ShapeMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_non_finite_probability_is_rejected() {
        let service = InferenceService::with_classifier(Box::new(FixedClassifier(vec![
            [0.5, 0.5],
            [f64::NAN, f64::NAN],
        ])));
        let err = service
            .predict(&features_with(&PIPELINE_REQUIRED_COLUMNS, "Male"))
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Inference(ClassifierError::NonFinite { row: 1 })
        ));
    }

    #[test]
    fn test_missing_artifact_fails_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let err = InferenceService::load(dir.path().join("absent.onnx"), 1)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ModelArtifactMissing);
    }
}
