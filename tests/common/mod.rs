//! Shared fixtures for integration tests

#![allow(dead_code)]

use kolosal_compose::error::BoxError;
use kolosal_compose::operator::{Estimator, FittedModel, Hyperparams, Operator, OperatorRegistry};
use ndarray::{Array1, Array2};
use std::sync::Arc;

/// Predicts 1 when the first feature exceeds its training mean
pub struct ThresholdClassifier;

struct FittedThreshold {
    threshold: f64,
}

impl Estimator for ThresholdClassifier {
    fn fit(
        &self,
        _: &Hyperparams,
        inputs: &[Array2<f64>],
        y: Option<&Array1<f64>>,
    ) -> Result<Box<dyn FittedModel>, BoxError> {
        let x = match inputs {
            [x] => x,
            _ => return Err("expected a single input".into()),
        };
        if y.is_none() {
            return Err("labels are required".into());
        }
        let threshold = x.column(0).mean().ok_or("no samples")?;
        Ok(Box::new(FittedThreshold { threshold }))
    }
}

impl FittedModel for FittedThreshold {
    fn predict(&self, inputs: &[Array2<f64>]) -> Result<Array2<f64>, BoxError> {
        let x = inputs.first().ok_or("no input")?;
        Ok(x.column(0)
            .mapv(|v| if v > self.threshold { 1.0 } else { 0.0 })
            .insert_axis(ndarray::Axis(1)))
    }
}

/// Always fails to fit
pub struct BrokenEstimator;

impl Estimator for BrokenEstimator {
    fn fit(&self, _: &Hyperparams, _: &[Array2<f64>], _: Option<&Array1<f64>>) -> Result<Box<dyn FittedModel>, BoxError> {
        Err("solver diverged".into())
    }
}

/// Fits anything and predicts NaN for every sample
pub struct NanEstimator;

struct FittedNan;

impl Estimator for NanEstimator {
    fn fit(&self, _: &Hyperparams, _: &[Array2<f64>], _: Option<&Array1<f64>>) -> Result<Box<dyn FittedModel>, BoxError> {
        Ok(Box::new(FittedNan))
    }
}

impl FittedModel for FittedNan {
    fn predict(&self, inputs: &[Array2<f64>]) -> Result<Array2<f64>, BoxError> {
        let x = inputs.first().ok_or("no input")?;
        Ok(Array2::from_elem((x.nrows(), 1), f64::NAN))
    }
}

pub fn registry() -> OperatorRegistry {
    OperatorRegistry::builtin().unwrap()
}

/// Builtin operator by name
pub fn op(name: &str) -> Operator {
    registry().get(name).unwrap().into()
}

/// LogisticRegression backed by [`ThresholdClassifier`]
pub fn classifier() -> Operator {
    registry()
        .get("LogisticRegression")
        .unwrap()
        .with_estimator(Arc::new(ThresholdClassifier))
        .into()
}

/// KNeighborsClassifier backed by [`BrokenEstimator`]
pub fn broken_classifier() -> Operator {
    registry()
        .get("KNeighborsClassifier")
        .unwrap()
        .with_estimator(Arc::new(BrokenEstimator))
        .into()
}

/// DecisionTreeClassifier backed by [`NanEstimator`]
pub fn nan_estimator() -> Operator {
    registry()
        .get("DecisionTreeClassifier")
        .unwrap()
        .with_estimator(Arc::new(NanEstimator))
        .into()
}

/// 40 samples, 2 features; the label is 1 when the first feature is at least 20
pub fn classification_data() -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 7) as f64 });
    let y = Array1::from_shape_fn(40, |i| if i >= 20 { 1.0 } else { 0.0 });
    (x, y)
}
