//! Boundary to the external ML library that supplies numeric implementations
//!
//! The composition layer never trains anything itself. An [`Estimator`] is
//! handed the bound hyperparameters and training data and returns a
//! [`FittedModel`]; the fitted model maps inputs to an output matrix.
//! Operators fed by a parallel composite receive several input matrices.

use crate::error::BoxError;
use ndarray::{Array1, Array2};
use serde_json::{Map, Value};

/// Bound hyperparameter assignment of an individual operator
pub type Hyperparams = Map<String, Value>;

/// Trainable implementation of an operator
pub trait Estimator: Send + Sync {
    /// Fit on `inputs` (one matrix, or a tuple from a parallel composite)
    fn fit(
        &self,
        hyperparams: &Hyperparams,
        inputs: &[Array2<f64>],
        y: Option<&Array1<f64>>,
    ) -> std::result::Result<Box<dyn FittedModel>, BoxError>;
}

/// Trained implementation of an operator
pub trait FittedModel: Send + Sync {
    /// Transform or predict; estimators return a single-column matrix
    fn predict(&self, inputs: &[Array2<f64>]) -> std::result::Result<Array2<f64>, BoxError>;
}
