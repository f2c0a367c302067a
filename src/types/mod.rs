//! Type definitions for the risk scoring pipeline

pub mod prediction;
pub mod record;

pub use prediction::{PredictionResult, PredictionRow, RowPrediction};
pub use record::{FeatureRecordSet, FeatureValue, RawRecordSet, ValidatedRecordSet};
