//! Built-in operator declarations
//!
//! Hyperparameter schemas follow scikit-learn parameter conventions,
//! including the optimizer extensions (`minimumForOptimizer`, `distribution`,
//! `relevantToOptimizer`). The structural operators `NoOp` and
//! `ConcatFeatures` and the two scalers ship with implementations; the other
//! operators are schema-only until an [`Estimator`] is attached.

use super::individual::{DataSchemas, IndividualOp};
use super::library::{Estimator, FittedModel, Hyperparams};
use super::Tags;
use crate::error::{BoxError, Result};
use crate::schema::Schema;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use serde_json::{json, Value};
use std::sync::Arc;

type LibResult<T> = std::result::Result<T, BoxError>;

/// Every built-in operator, in state schema-only
pub fn builtin_operators() -> Result<Vec<IndividualOp>> {
    Ok(vec![
        pca()?,
        standard_scaler()?,
        min_max_scaler()?,
        logistic_regression()?,
        k_neighbors_classifier()?,
        decision_tree_classifier()?,
        no_op()?,
        concat_features()?,
    ])
}

fn dataset() -> Value {
    json!({
        "description": "Features; the outer array is over samples.",
        "type": "array",
        "items": {"type": "array", "items": {"type": "number"}}
    })
}

fn labels() -> Value {
    json!({"description": "Target values.", "type": "array", "items": {"type": "number"}})
}

fn transformer_data() -> Result<DataSchemas> {
    Ok(DataSchemas {
        input_fit: Schema::from_value(json!({
            "type": "object",
            "required": ["X"],
            "properties": {"X": dataset(), "y": {"description": "Target class labels; ignored."}}
        }))?,
        input_predict: Schema::from_value(json!({
            "type": "object",
            "required": ["X"],
            "properties": {"X": dataset()}
        }))?,
        output: Schema::from_value(dataset())?,
    })
}

fn classifier_data() -> Result<DataSchemas> {
    Ok(DataSchemas {
        input_fit: Schema::from_value(json!({
            "type": "object",
            "required": ["X", "y"],
            "properties": {"X": dataset(), "y": labels()}
        }))?,
        input_predict: Schema::from_value(json!({
            "type": "object",
            "required": ["X"],
            "properties": {"X": dataset()}
        }))?,
        output: Schema::from_value(labels())?,
    })
}

fn declare(name: &str, hyperparams: Value, data: DataSchemas, tags: Tags) -> Result<IndividualOp> {
    IndividualOp::declare(name, Schema::from_value(hyperparams)?, data, tags)
}

fn pca() -> Result<IndividualOp> {
    declare(
        "PCA",
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["n_components", "whiten", "svd_solver", "tol", "iterated_power", "random_state"],
            "relevantToOptimizer": ["n_components", "whiten", "svd_solver"],
            "properties": {
                "n_components": {
                    "anyOf": [
                        {"enum": [null], "description": "Keep all components."},
                        {"enum": ["mle"], "forOptimizer": false},
                        {
                            "type": "number",
                            "minimum": 0.0,
                            "exclusiveMinimum": true,
                            "maximum": 1.0,
                            "exclusiveMaximum": true,
                            "description": "Fraction of variance to keep."
                        },
                        {"type": "integer", "minimum": 1, "forOptimizer": false}
                    ],
                    "default": null
                },
                "whiten": {"type": "boolean", "default": false},
                "svd_solver": {"enum": ["auto", "full", "arpack", "randomized"], "default": "auto"},
                "tol": {"type": "number", "minimum": 0.0, "default": 0.0},
                "iterated_power": {
                    "anyOf": [
                        {"type": "integer", "minimum": 0, "maximumForOptimizer": 10},
                        {"enum": ["auto"]}
                    ],
                    "default": "auto"
                },
                "random_state": {"anyOf": [{"type": "integer"}, {"enum": [null]}], "default": null}
            }
        }),
        transformer_data()?,
        Tags::new().with_pre("~categoricals").with_op("transformer").with_op("estimator"),
    )
}

fn standard_scaler() -> Result<IndividualOp> {
    let op = declare(
        "StandardScaler",
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["with_mean", "with_std"],
            "relevantToOptimizer": [],
            "properties": {
                "with_mean": {"type": "boolean", "default": true},
                "with_std": {"type": "boolean", "default": true}
            }
        }),
        transformer_data()?,
        Tags::new().with_pre("~categoricals").with_op("transformer").with_op("interpretable"),
    )?;
    Ok(op.with_estimator(Arc::new(ScalerEstimator::Standard)))
}

fn min_max_scaler() -> Result<IndividualOp> {
    let op = declare(
        "MinMaxScaler",
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["feature_range"],
            "relevantToOptimizer": [],
            "properties": {
                "feature_range": {
                    "type": "array",
                    "minItems": 2,
                    "maxItems": 2,
                    "items": {"type": "number"},
                    "default": [0, 1]
                },
                "clip": {"type": "boolean", "default": false}
            }
        }),
        transformer_data()?,
        Tags::new().with_pre("~categoricals").with_op("transformer").with_op("interpretable"),
    )?;
    Ok(op.with_estimator(Arc::new(ScalerEstimator::MinMax)))
}

fn logistic_regression() -> Result<IndividualOp> {
    declare(
        "LogisticRegression",
        json!({
            "allOf": [
                {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["penalty", "C", "tol", "max_iter", "solver", "fit_intercept"],
                    "relevantToOptimizer": ["C", "tol", "max_iter", "solver"],
                    "properties": {
                        "penalty": {"enum": ["l1", "l2"], "default": "l2"},
                        "C": {
                            "description": "Inverse regularization strength.",
                            "type": "number",
                            "minimum": 0.0,
                            "exclusiveMinimum": true,
                            "distribution": "loguniform",
                            "minimumForOptimizer": 0.03125,
                            "maximumForOptimizer": 32768,
                            "default": 1.0
                        },
                        "tol": {
                            "type": "number",
                            "minimum": 0.0,
                            "exclusiveMinimum": true,
                            "distribution": "loguniform",
                            "minimumForOptimizer": 1e-05,
                            "maximumForOptimizer": 0.1,
                            "default": 0.0001
                        },
                        "max_iter": {
                            "type": "integer",
                            "minimum": 1,
                            "distribution": "loguniform",
                            "minimumForOptimizer": 10,
                            "maximumForOptimizer": 1000,
                            "default": 100
                        },
                        "solver": {
                            "enum": ["liblinear", "newton-cg", "lbfgs", "sag", "saga"],
                            "default": "liblinear"
                        },
                        "fit_intercept": {"type": "boolean", "default": true},
                        "random_state": {"anyOf": [{"type": "integer"}, {"enum": [null]}], "default": null}
                    }
                },
                {
                    "description": "The newton-cg, sag and lbfgs solvers support only l2 penalties.",
                    "anyOf": [
                        {"type": "object", "properties": {"solver": {"not": {"enum": ["newton-cg", "sag", "lbfgs"]}}}},
                        {"type": "object", "properties": {"penalty": {"enum": ["l2"]}}}
                    ]
                }
            ]
        }),
        classifier_data()?,
        Tags::new()
            .with_pre("~categoricals")
            .with_op("estimator")
            .with_op("classifier")
            .with_op("interpretable")
            .with_post("probabilities"),
    )
}

fn k_neighbors_classifier() -> Result<IndividualOp> {
    declare(
        "KNeighborsClassifier",
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["n_neighbors", "weights", "algorithm", "p", "metric"],
            "relevantToOptimizer": ["n_neighbors", "weights", "p"],
            "properties": {
                "n_neighbors": {
                    "type": "integer",
                    "minimum": 1,
                    "minimumForOptimizer": 3,
                    "maximumForOptimizer": 100,
                    "distribution": "uniform",
                    "default": 5
                },
                "weights": {"enum": ["uniform", "distance"], "default": "uniform"},
                "algorithm": {"enum": ["auto", "ball_tree", "kd_tree", "brute"], "default": "auto"},
                "p": {
                    "type": "integer",
                    "minimum": 1,
                    "minimumForOptimizer": 1,
                    "maximumForOptimizer": 3,
                    "distribution": "uniform",
                    "default": 2
                },
                "metric": {"enum": ["minkowski", "euclidean", "manhattan"], "default": "minkowski"}
            }
        }),
        classifier_data()?,
        Tags::new()
            .with_pre("~categoricals")
            .with_op("estimator")
            .with_op("classifier")
            .with_op("interpretable")
            .with_post("probabilities"),
    )
}

fn decision_tree_classifier() -> Result<IndividualOp> {
    declare(
        "DecisionTreeClassifier",
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["criterion", "splitter", "max_depth", "min_samples_split", "min_samples_leaf", "max_features"],
            "relevantToOptimizer": ["criterion", "max_depth", "min_samples_split", "min_samples_leaf", "max_features"],
            "properties": {
                "criterion": {"enum": ["gini", "entropy"], "default": "gini"},
                "splitter": {"enum": ["best", "random"], "default": "best"},
                "max_depth": {
                    "anyOf": [
                        {"type": "integer", "minimum": 1, "minimumForOptimizer": 3, "maximumForOptimizer": 5},
                        {"enum": [null], "description": "Expand until leaves are pure."}
                    ],
                    "default": null
                },
                "min_samples_split": {
                    "anyOf": [
                        {"type": "integer", "minimum": 2, "minimumForOptimizer": 2, "maximumForOptimizer": 5},
                        {
                            "type": "number",
                            "minimum": 0.0,
                            "exclusiveMinimum": true,
                            "maximum": 1.0,
                            "minimumForOptimizer": 0.01,
                            "maximumForOptimizer": 0.5
                        }
                    ],
                    "default": 2
                },
                "min_samples_leaf": {
                    "anyOf": [
                        {"type": "integer", "minimum": 1, "minimumForOptimizer": 1, "maximumForOptimizer": 5},
                        {
                            "type": "number",
                            "minimum": 0.0,
                            "exclusiveMinimum": true,
                            "maximum": 0.5,
                            "minimumForOptimizer": 0.01
                        }
                    ],
                    "default": 1
                },
                "max_features": {
                    "anyOf": [
                        {"type": "integer", "minimum": 1, "forOptimizer": false},
                        {
                            "type": "number",
                            "minimum": 0.0,
                            "exclusiveMinimum": true,
                            "maximum": 1.0,
                            "distribution": "uniform"
                        },
                        {"enum": ["auto", "sqrt", "log2", null]}
                    ],
                    "default": null
                }
            }
        }),
        classifier_data()?,
        Tags::new()
            .with_op("estimator")
            .with_op("classifier")
            .with_op("interpretable")
            .with_post("probabilities"),
    )
}

fn no_op() -> Result<IndividualOp> {
    let op = declare(
        "NoOp",
        json!({
            "type": "object",
            "additionalProperties": false,
            "relevantToOptimizer": [],
            "properties": {}
        }),
        DataSchemas::default(),
        Tags::new().with_op("transformer").with_op("interpretable"),
    )?;
    Ok(op.with_estimator(Arc::new(Identity)))
}

fn concat_features() -> Result<IndividualOp> {
    let input = json!({
        "description": "Outer array is over the datasets to concatenate.",
        "type": "array",
        "items": dataset()
    });
    let data = DataSchemas {
        input_fit: Schema::from_value(json!({
            "type": "object",
            "required": ["X"],
            "properties": {"X": input.clone(), "y": {}}
        }))?,
        input_predict: Schema::from_value(json!({
            "type": "object",
            "required": ["X"],
            "properties": {"X": input}
        }))?,
        output: Schema::from_value(dataset())?,
    };
    let op = declare(
        "ConcatFeatures",
        json!({
            "type": "object",
            "additionalProperties": false,
            "relevantToOptimizer": [],
            "properties": {}
        }),
        data,
        Tags::new().with_op("transformer"),
    )?;
    Ok(op.with_estimator(Arc::new(Concat)))
}

fn single(inputs: &[Array2<f64>]) -> LibResult<&Array2<f64>> {
    match inputs {
        [x] => Ok(x),
        _ => Err(format!("expected a single input matrix, got {}", inputs.len()).into()),
    }
}

/// Identity transform
struct Identity;

impl Estimator for Identity {
    fn fit(&self, _: &Hyperparams, inputs: &[Array2<f64>], _: Option<&Array1<f64>>) -> LibResult<Box<dyn FittedModel>> {
        single(inputs)?;
        Ok(Box::new(Identity))
    }
}

impl FittedModel for Identity {
    fn predict(&self, inputs: &[Array2<f64>]) -> LibResult<Array2<f64>> {
        Ok(single(inputs)?.clone())
    }
}

/// Column-wise concatenation of a tuple of datasets
struct Concat;

impl Estimator for Concat {
    fn fit(&self, _: &Hyperparams, inputs: &[Array2<f64>], _: Option<&Array1<f64>>) -> LibResult<Box<dyn FittedModel>> {
        Concat.predict(inputs)?;
        Ok(Box::new(Concat))
    }
}

impl FittedModel for Concat {
    fn predict(&self, inputs: &[Array2<f64>]) -> LibResult<Array2<f64>> {
        if inputs.is_empty() {
            return Err("nothing to concatenate".into());
        }
        let views: Vec<ArrayView2<f64>> = inputs.iter().map(|x| x.view()).collect();
        Ok(concatenate(Axis(1), &views)?)
    }
}

/// Per-column affine scaling, `(x - center) / scale`
enum ScalerEstimator {
    Standard,
    MinMax,
}

struct FittedScaler {
    center: Array1<f64>,
    scale: Array1<f64>,
    /// Target range for min-max scaling
    range: Option<(f64, f64)>,
    clip: bool,
}

impl Estimator for ScalerEstimator {
    fn fit(
        &self,
        hyperparams: &Hyperparams,
        inputs: &[Array2<f64>],
        _: Option<&Array1<f64>>,
    ) -> LibResult<Box<dyn FittedModel>> {
        let x = single(inputs)?;
        if x.nrows() == 0 {
            return Err("cannot fit a scaler on zero samples".into());
        }
        let flag = |name: &str, default: bool| hyperparams.get(name).and_then(Value::as_bool).unwrap_or(default);
        let non_zero = |s: f64| if s == 0.0 || !s.is_finite() { 1.0 } else { s };

        let fitted = match self {
            ScalerEstimator::Standard => {
                let n = x.ncols();
                let center = if flag("with_mean", true) {
                    x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n))
                } else {
                    Array1::zeros(n)
                };
                let scale = if flag("with_std", true) {
                    let ddof = if x.nrows() > 1 { 1.0 } else { 0.0 };
                    x.std_axis(Axis(0), ddof).mapv(non_zero)
                } else {
                    Array1::ones(n)
                };
                FittedScaler { center, scale, range: None, clip: false }
            }
            ScalerEstimator::MinMax => {
                let min = x.fold_axis(Axis(0), f64::INFINITY, |a, &b| a.min(b));
                let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |a, &b| a.max(b));
                let scale = (&max - &min).mapv(non_zero);
                let range = hyperparams
                    .get("feature_range")
                    .and_then(Value::as_array)
                    .and_then(|r| Some((r.first()?.as_f64()?, r.get(1)?.as_f64()?)))
                    .unwrap_or((0.0, 1.0));
                if range.0 >= range.1 {
                    return Err(format!("feature_range minimum {} must be below maximum {}", range.0, range.1).into());
                }
                FittedScaler { center: min, scale, range: Some(range), clip: flag("clip", false) }
            }
        };
        Ok(Box::new(fitted))
    }
}

impl FittedModel for FittedScaler {
    fn predict(&self, inputs: &[Array2<f64>]) -> LibResult<Array2<f64>> {
        let x = single(inputs)?;
        if x.ncols() != self.center.len() {
            return Err(format!("expected {} features, got {}", self.center.len(), x.ncols()).into());
        }
        let mut scaled = (x - &self.center) / &self.scale;
        if let Some((low, high)) = self.range {
            scaled.mapv_inplace(|v| {
                let v = v * (high - low) + low;
                if self.clip {
                    v.clamp(low, high)
                } else {
                    v
                }
            });
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate;
    use ndarray::array;

    #[test]
    fn test_defaults_validate_for_every_builtin() {
        for op in builtin_operators().unwrap() {
            let defaults = Value::Object(op.defaults());
            assert!(validate(&defaults, op.hyperparam_schema()).is_ok(), "{}", op.name());
        }
    }

    #[test]
    fn test_logistic_regression_solver_constraint() {
        let lr = logistic_regression().unwrap();
        assert!(lr.bind(&json!({"solver": "lbfgs", "penalty": "l2"})).is_ok());
        assert!(lr.bind(&json!({"solver": "lbfgs", "penalty": "l1"})).is_err());
        assert!(lr.bind(&json!({"solver": "saga", "penalty": "l1"})).is_ok());
    }

    #[test]
    fn test_concat_features() {
        let a = array![[1.0], [2.0]];
        let b = array![[3.0, 4.0], [5.0, 6.0]];
        let fitted = Concat.fit(&Hyperparams::new(), &[a.clone(), b.clone()], None).unwrap();
        let out = fitted.predict(&[a, b]).unwrap();
        assert_eq!(out, array![[1.0, 3.0, 4.0], [2.0, 5.0, 6.0]]);

        let short = array![[1.0]];
        assert!(Concat.predict(&[short, array![[1.0], [2.0]]]).is_err());
    }

    #[test]
    fn test_identity_rejects_tuples() {
        let x = array![[1.0, 2.0]];
        assert_eq!(Identity.predict(&[x.clone()]).unwrap(), x);
        assert!(Identity.predict(&[x.clone(), x]).is_err());
    }

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0]];
        let fitted = ScalerEstimator::Standard.fit(&Hyperparams::new(), &[x.clone()], None).unwrap();
        let out = fitted.predict(&[x]).unwrap();
        assert!((out[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((out[[2, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(out[[1, 1]], 0.0);
    }

    #[test]
    fn test_min_max_scaler_range() {
        let x = array![[0.0], [5.0], [10.0]];
        let mut params = Hyperparams::new();
        params.insert("feature_range".into(), json!([-1, 1]));
        let fitted = ScalerEstimator::MinMax.fit(&params, &[x.clone()], None).unwrap();
        let out = fitted.predict(&[x]).unwrap();
        assert_eq!(out, array![[-1.0], [0.0], [1.0]]);
    }
}
