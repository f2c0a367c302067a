//! Classifier seam and the ONNX Runtime implementation behind it

use crate::error::ClassifierError;
use crate::types::{FeatureRecordSet, FeatureValue};
use ort::memory::Allocator;
use ort::session::{Session, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::{
    DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor, ValueType,
};
use std::sync::RwLock;
use tracing::debug;

/// Binary classifier scoring a feature table.
///
/// `predict_proba` returns `[p0, p1]` for every row, in row order.
pub trait Classifier: Send + Sync {
    /// Columns the classifier reads, by name
    fn input_columns(&self) -> Vec<String>;

    fn predict_proba(&self, features: &FeatureRecordSet) -> Result<Vec<[f64; 2]>, ClassifierError>;
}

/// One named model input and the tensor element type it expects
#[derive(Debug, Clone)]
struct ModelInput {
    name: String,
    ty: TensorElementType,
}

/// Fused preprocessing plus estimator graph run through ONNX Runtime
pub struct OnnxClassifier {
    /// Session behind a lock, `run` needs `&mut`
    session: RwLock<Session>,
    inputs: Vec<ModelInput>,
    output_name: String,
}

impl OnnxClassifier {
    /// Wrap a committed session, checking that every input is a tensor of a
    /// type the feature table can fill
    pub fn from_session(session: Session) -> Result<Self, ClassifierError> {
        let mut inputs = Vec::with_capacity(session.inputs.len());
        for input in &session.inputs {
            let ty = match &input.input_type {
                ValueType::Tensor { ty, .. }
                    if matches!(
                        ty,
                        TensorElementType::String
                            | TensorElementType::Int64
                            | TensorElementType::Float32
                    ) =>
                {
                    *ty
                }
                _ => {
                    return Err(ClassifierError::UnsupportedInput {
                        column: input.name.clone(),
                    })
                }
            };
            inputs.push(ModelInput {
                name: input.name.clone(),
                ty,
            });
        }

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone())
            .ok_or(ClassifierError::MissingOutput)?;

        Ok(Self {
            session: RwLock::new(session),
            inputs,
            output_name,
        })
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Build one `[rows, 1]` tensor for a model input from its feature column
    fn input_tensor(
        &self,
        input: &ModelInput,
        features: &FeatureRecordSet,
    ) -> Result<DynValue, ClassifierError> {
        let column = features
            .column(&input.name)
            .ok_or_else(|| ClassifierError::ColumnNotFound {
                column: input.name.clone(),
            })?;
        let shape = vec![features.len() as i64, 1];
        let unsupported = |value: &FeatureValue, expected: &'static str| {
            ClassifierError::UnsupportedValue {
                column: input.name.clone(),
                value: value.to_string(),
                expected,
            }
        };

        let tensor = match input.ty {
            TensorElementType::String => {
                let texts: Vec<String> = column.map(FeatureValue::to_string).collect();
                Tensor::from_string_array((shape, texts.as_slice()))
                    .map_err(runtime)?
                    .into_dyn()
            }
            TensorElementType::Int64 => {
                let values = column
                    .map(|v| v.as_i64().ok_or_else(|| unsupported(v, "int64")))
                    .collect::<Result<Vec<i64>, _>>()?;
                Tensor::from_array((shape, values)).map_err(runtime)?.into_dyn()
            }
            _ => {
                let values = column
                    .map(|v| {
                        v.as_f64()
                            .map(|x| x as f32)
                            .ok_or_else(|| unsupported(v, "float"))
                    })
                    .collect::<Result<Vec<f32>, _>>()?;
                Tensor::from_array((shape, values)).map_err(runtime)?.into_dyn()
            }
        };
        Ok(tensor)
    }

    /// Class probabilities from either a `[rows, classes]` tensor or a
    /// `seq(map(int64, float))` output
    fn extract_probabilities(
        &self,
        outputs: &SessionOutputs,
        rows: usize,
    ) -> Result<Vec<[f64; 2]>, ClassifierError> {
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or(ClassifierError::MissingOutput)?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            if dims.len() != 2 || dims[0] as usize != rows || dims[1] < 2 {
                return Err(ClassifierError::ShapeMismatch {
                    expected: rows * 2,
                    actual: data.len(),
                });
            }
            let classes = dims[1] as usize;
            debug!(output = %self.output_name, "Extracted from tensor");
            return Ok((0..rows)
                .map(|r| [data[r * classes] as f64, data[r * classes + 1] as f64])
                .collect());
        }

        if DynSequenceValueType::can_downcast(output.dtype()) {
            let sequence = output
                .downcast_ref::<DynSequenceValueType>()
                .map_err(runtime)?;
            let maps = sequence
                .try_extract_sequence::<DynMapValueType>(&Allocator::default())
                .map_err(runtime)?;

            let mut proba = Vec::with_capacity(maps.len());
            for map in &maps {
                let mut row = [f64::NAN; 2];
                for (class_id, p) in map.try_extract_key_values::<i64, f32>().map_err(runtime)? {
                    if let Some(slot) = usize::try_from(class_id).ok().and_then(|c| row.get_mut(c)) {
                        *slot = p as f64;
                    }
                }
                proba.push(row);
            }
            debug!(output = %self.output_name, "Extracted from seq(map)");
            return Ok(proba);
        }

        Err(ClassifierError::MissingOutput)
    }
}

impl Classifier for OnnxClassifier {
    fn input_columns(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.name.clone()).collect()
    }

    fn predict_proba(&self, features: &FeatureRecordSet) -> Result<Vec<[f64; 2]>, ClassifierError> {
        let inputs = self
            .inputs
            .iter()
            .map(|input| Ok((input.name.clone(), self.input_tensor(input, features)?)))
            .collect::<Result<Vec<(String, DynValue)>, ClassifierError>>()?;

        let mut session = self
            .session
            .write()
            .map_err(|e| ClassifierError::Runtime(format!("Lock error: {}", e)))?;
        let outputs = session.run(inputs).map_err(runtime)?;

        self.extract_probabilities(&outputs, features.len())
    }
}

fn runtime(e: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::Runtime(e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Logistic scorer over a handful of named columns, for exercising the
    /// inference service without a native runtime
    pub(crate) struct StubClassifier {
        pub columns: Vec<String>,
    }

    impl StubClassifier {
        pub(crate) fn heart_risk() -> Self {
            Self {
                columns: [
                    "gender",
                    "diet",
                    "stress_level",
                    "physical_activity_days_per_week",
                    "risk_troponin",
                ]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            }
        }
    }

    impl Classifier for StubClassifier {
        fn input_columns(&self) -> Vec<String> {
            self.columns.clone()
        }

        fn predict_proba(
            &self,
            features: &FeatureRecordSet,
        ) -> Result<Vec<[f64; 2]>, ClassifierError> {
            let mut z = vec![-1.0; features.len()];
            for name in &self.columns {
                let column = features
                    .column(name)
                    .ok_or_else(|| ClassifierError::ColumnNotFound {
                        column: name.clone(),
                    })?;
                for (acc, value) in z.iter_mut().zip(column) {
                    *acc += match value {
                        FeatureValue::Text(t) if t == "Male" => 0.2,
                        FeatureValue::Text(t) if t == "Female" => -0.2,
                        FeatureValue::Text(t) => {
                            return Err(ClassifierError::Runtime(format!(
                                "Unknown Category {t:?} and zeros = 0."
                            )))
                        }
                        other => 0.1 * other.as_f64().unwrap_or_default(),
                    };
                }
            }
            Ok(z
                .into_iter()
                .map(|z| {
                    let p1 = 1.0 / (1.0 + (-z).exp());
                    [1.0 - p1, p1]
                })
                .collect())
        }
    }

    #[test]
    fn test_stub_rejects_unknown_category() {
        let features = FeatureRecordSet::new(
            vec!["gender".to_string()],
            vec!["1".to_string()],
            vec![vec![FeatureValue::Text("Other".into())]],
        );
        let stub = StubClassifier {
            columns: vec!["gender".to_string()],
        };
        assert!(matches!(
            stub.predict_proba(&features),
            Err(ClassifierError::Runtime(_))
        ));
    }
}
