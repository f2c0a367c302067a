//! Heart Risk Pipeline Library
//!
//! Validates uploaded CSV files of patient measurements, engineers the
//! features a pre-trained classifier expects, and returns a heart attack
//! risk probability per patient.

pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod schema;
pub mod server;
pub mod types;
pub mod upload;

pub use config::AppConfig;
pub use error::{ClassifierError, ErrorKind, PipelineError};
pub use feature_extractor::FeatureExtractor;
pub use models::inference::InferenceService;
pub use processor::{ProcessingFailure, RiskPipeline};
pub use schema::{normalize_column_name, SchemaValidator};
pub use types::{FeatureRecordSet, PredictionResult, RawRecordSet, ValidatedRecordSet};
