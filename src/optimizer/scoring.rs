//! Evaluation metrics

use super::config::OptimizeDirection;
use crate::error::{KolosalError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric a search optimizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// Fraction of exactly matched class labels
    Accuracy,
    MeanSquaredError,
    /// Coefficient of determination
    R2,
}

impl Scoring {
    pub fn direction(self) -> OptimizeDirection {
        match self {
            Scoring::Accuracy | Scoring::R2 => OptimizeDirection::Maximize,
            Scoring::MeanSquaredError => OptimizeDirection::Minimize,
        }
    }

    /// Score predictions against the true targets
    pub fn score(self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(KolosalError::Composition(format!(
                "{} predictions for {} targets",
                y_pred.len(),
                y_true.len()
            )));
        }
        if y_true.is_empty() {
            return Err(KolosalError::Config("cannot score an empty fold".to_string()));
        }
        let n = y_true.len() as f64;

        let value = match self {
            Scoring::Accuracy => {
                let hits = y_true
                    .iter()
                    .zip(y_pred)
                    .filter(|(t, p)| (t.round() - p.round()).abs() < f64::EPSILON)
                    .count();
                hits as f64 / n
            }
            Scoring::MeanSquaredError => (y_true - y_pred).mapv(|d| d * d).sum() / n,
            Scoring::R2 => {
                let mean = y_true.sum() / n;
                let ss_res = (y_true - y_pred).mapv(|d| d * d).sum();
                let ss_tot = y_true.mapv(|t| (t - mean) * (t - mean)).sum();
                if ss_tot == 0.0 {
                    if ss_res == 0.0 { 1.0 } else { 0.0 }
                } else {
                    1.0 - ss_res / ss_tot
                }
            }
        };
        Ok(value)
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scoring::Accuracy => "accuracy",
            Scoring::MeanSquaredError => "mean_squared_error",
            Scoring::R2 => "r2",
        };
        f.write_str(name)
    }
}
