//! Prediction output data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decimal places used when presenting probabilities
pub const PRESENTATION_DECIMALS: i32 = 4;

/// Round a probability for presentation.
///
/// Halves go to the even neighbour of the scaled value, as numpy's `round`
/// does, so `0.00125` presents as `0.0012`.
pub fn round_probability(p: f64) -> f64 {
    let factor = 10f64.powi(PRESENTATION_DECIMALS);
    (p * factor).round_ties_even() / factor
}

/// Positive-class probability for one patient, at full precision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPrediction {
    /// Patient identifier
    pub id: String,
    /// Probability of the risk outcome (0.0 - 1.0)
    pub probability: f64,
}

/// Presentation row: `{id, proba}` with proba rounded to 4 places
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub id: String,
    pub proba: f64,
}

impl From<&RowPrediction> for PredictionRow {
    fn from(row: &RowPrediction) -> Self {
        Self {
            id: row.id.clone(),
            proba: round_probability(row.probability),
        }
    }
}

/// Probabilities for every row that survived cleaning, in table order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub rows: Vec<RowPrediction>,
    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
}

impl PredictionResult {
    pub fn new(rows: Vec<RowPrediction>) -> Self {
        Self {
            rows,
            generated_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows rounded for display
    pub fn presentation(&self) -> Vec<PredictionRow> {
        self.rows.iter().map(PredictionRow::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_probability() {
        assert_eq!(round_probability(0.123456), 0.1235);
        assert_eq!(round_probability(1.0), 1.0);
        assert_eq!(round_probability(0.0), 0.0);
    }

    #[test]
    fn test_round_probability_ties_to_even() {
        // 0.00125 * 1e4 and 0.00375 * 1e4 are exact halves
        assert_eq!(round_probability(0.00125), 0.0012);
        assert_eq!(round_probability(0.00375), 0.0038);
        assert_eq!(round_probability(0.00005), 0.0);
    }

    #[test]
    fn test_presentation_keeps_order_and_rounds() {
        let result = PredictionResult::new(vec![
            RowPrediction {
                id: "9".to_string(),
                probability: 0.987654321,
            },
            RowPrediction {
                id: "2".to_string(),
                probability: 0.1,
            },
        ]);

        let rows = result.presentation();
        assert_eq!(rows[0].id, "9");
        assert_eq!(rows[0].proba, 0.9877);
        assert_eq!(rows[1].id, "2");
        assert_eq!(result.rows[0].probability, 0.987654321);
    }

    #[test]
    fn test_presentation_row_serialization() {
        let row = PredictionRow {
            id: "42".to_string(),
            proba: 0.5,
        };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":"42","proba":0.5}"#);
    }
}
