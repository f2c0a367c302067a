//! ONNX model loader

use crate::error::{PipelineError, Result};
use crate::models::classifier::{Classifier, OnnxClassifier};
use anyhow::Context;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loader for the fused classifier graph
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load the classifier stored at `path`.
    ///
    /// A missing file is [`PipelineError::ModelArtifactMissing`]; a file ONNX
    /// Runtime cannot load, or whose inputs and outputs do not fit a feature
    /// table, is [`PipelineError::ModelArtifactInvalid`].
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<OnnxClassifier> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PipelineError::ModelArtifactMissing {
                path: path.to_path_buf(),
            });
        }

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let invalid = |reason: String| PipelineError::ModelArtifactInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let session = self
            .build_session(path)
            .map_err(|e| invalid(format!("{e:#}")))?;
        let classifier = OnnxClassifier::from_session(session).map_err(|e| invalid(e.to_string()))?;

        info!(
            inputs = ?classifier.input_columns(),
            output = %classifier.output_name(),
            "Model loaded successfully"
        );

        Ok(classifier)
    }

    fn build_session(&self, path: &Path) -> anyhow::Result<Session> {
        ort::init().commit()?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;
        Ok(session)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::with_threads(1)
    }
}
