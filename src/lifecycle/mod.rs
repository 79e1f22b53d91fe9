//! Operator lifecycle: `SchemaOnly -> Planned -> Trainable -> Trained`
//!
//! Every transition returns a new operator value with a new identity; the
//! value it was derived from is never modified. Fitting and prediction are
//! delegated to the [`Estimator`](crate::operator::Estimator) attached to
//! each individual operator.

use crate::error::{BoxError, KolosalError, Result, ValidationError};
use crate::operator::{FittedModel, Hyperparams, IndividualOp, Operator, OperatorKind};
use crate::pipeline::{assemble, step_keys};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

static NULL: Value = Value::Null;

/// Lifecycle state of an operator, ordered from least to most advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Declared with schemas only
    SchemaOnly,
    /// Some hyperparameters fixed, the rest left to search
    Planned,
    /// Every hyperparameter bound and validated
    Trainable,
    /// Fitted to data
    Trained,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::SchemaOnly => "schema-only",
            LifecycleState::Planned => "planned",
            LifecycleState::Trainable => "trainable",
            LifecycleState::Trained => "trained",
        };
        f.write_str(name)
    }
}

fn as_object<'v>(config: &'v Value, schema: &Operator) -> Result<Option<&'v Map<String, Value>>> {
    match config {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(ValidationError::new(
            "",
            "type object",
            schema.hyperparam_schema().to_value(),
            other.clone(),
        )
        .into()),
    }
}

/// Reject keys of `config` that name no step
fn check_keys(config: Option<&Map<String, Value>>, keys: &[String], op: &Operator) -> Result<()> {
    if let Some(map) = config {
        if let Some((unknown, value)) = map.iter().find(|(k, _)| !keys.contains(k)) {
            return Err(ValidationError::new(
                unknown.as_str(),
                "additionalProperties false",
                op.hyperparam_schema().to_value(),
                value.clone(),
            )
            .into());
        }
    }
    Ok(())
}

fn under(key: &str, err: KolosalError) -> KolosalError {
    match err {
        KolosalError::Validation(v) => KolosalError::Validation(v.prefixed(key)),
        other => other,
    }
}

impl Operator {
    /// Fix part of the hyperparameters without validating them
    ///
    /// Composite configurations are keyed by step key; steps already past
    /// planned are kept as they are.
    pub fn plan(&self, partial: &Value) -> Result<Operator> {
        let state = self.state();
        if state > LifecycleState::Planned {
            return Err(KolosalError::state("plan", LifecycleState::Planned, state));
        }

        match self {
            Operator::Individual(op) => Ok(Operator::Individual(op.planned(partial)?)),
            Operator::Sequence(c) | Operator::Parallel(c) | Operator::Choice(c) => {
                let config = as_object(partial, self)?;
                let keys = step_keys(c.steps());
                check_keys(config, &keys, self)?;

                let mut steps = Vec::with_capacity(keys.len());
                for (key, step) in keys.iter().zip(c.steps()) {
                    if step.state() > LifecycleState::Planned {
                        steps.push(step.clone());
                        continue;
                    }
                    let sub = config.and_then(|m| m.get(key)).unwrap_or(&NULL);
                    steps.push(step.plan(sub).map_err(|e| under(key, e))?);
                }
                Ok(assemble(self.kind(), steps))
            }
        }
    }

    /// Validate a complete configuration and return a trainable operator
    ///
    /// A choice takes a single-key object `{branch_key: config}` and resolves
    /// to the selected branch, so the result contains no choice. Trained
    /// steps given no configuration are kept and reused by [`execute`](Self::execute).
    pub fn bind(&self, config: &Value) -> Result<Operator> {
        let bound = match self {
            Operator::Individual(op) => Operator::Individual(op.bind(config)?),
            Operator::Sequence(c) | Operator::Parallel(c) => {
                let map = as_object(config, self)?;
                let keys = step_keys(c.steps());
                check_keys(map, &keys, self)?;

                let mut steps = Vec::with_capacity(keys.len());
                for (key, step) in keys.iter().zip(c.steps()) {
                    match map.and_then(|m| m.get(key)) {
                        None if step.state() == LifecycleState::Trained => steps.push(step.clone()),
                        sub => steps.push(step.bind(sub.unwrap_or(&NULL)).map_err(|e| under(key, e))?),
                    }
                }
                assemble(self.kind(), steps)
            }
            Operator::Choice(c) => {
                let map = as_object(config, self)?;
                let keys = step_keys(c.steps());
                check_keys(map, &keys, self)?;

                let selected: Vec<(usize, &Value)> = match map {
                    Some(m) => keys
                        .iter()
                        .enumerate()
                        .filter_map(|(i, k)| m.get(k).map(|v| (i, v)))
                        .collect(),
                    None if keys.len() == 1 => vec![(0, &NULL)],
                    None => Vec::new(),
                };
                match selected.as_slice() {
                    [(i, sub)] => c.steps()[*i].bind(sub).map_err(|e| under(&keys[*i], e))?,
                    _ => {
                        return Err(ValidationError::new(
                            "",
                            format!("exactly one of [{}]", keys.join(", ")),
                            self.hyperparam_schema().to_value(),
                            config.clone(),
                        )
                        .into())
                    }
                }
            }
        };
        debug!(operator = %bound, "Bound hyperparameters");
        Ok(bound)
    }

    /// Every violation `bind` would find in `config`, with nested paths
    ///
    /// Values are merged over defaults first, exactly as `bind` merges them,
    /// so fields left to their defaults are never reported.
    pub fn violations(&self, config: &Value) -> Vec<ValidationError> {
        let mut out = Vec::new();
        collect_violations(self, config, &mut out);
        out
    }

    /// Fit a trainable operator, returning the trained operator
    pub fn execute(&self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<Operator> {
        let state = self.state();
        if state != LifecycleState::Trainable {
            return Err(KolosalError::state("execute", LifecycleState::Trainable, state));
        }
        let start = Instant::now();
        let (trained, _) = fit(self, vec![x.clone()], y, false)?;
        info!(
            operator = %self,
            samples = x.nrows(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitted operator"
        );
        Ok(trained)
    }

    /// Predictions of a trained operator with a single one-column output
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let out = self.transform(x)?;
        if out.ncols() != 1 {
            return Err(KolosalError::Composition(format!(
                "predict needs a single one-column output, {} produces {} columns",
                self,
                out.ncols()
            )));
        }
        Ok(out.index_axis_move(Axis(1), 0))
    }

    /// Output of a trained operator
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let state = self.state();
        if state != LifecycleState::Trained {
            return Err(KolosalError::state("transform", LifecycleState::Trained, state));
        }
        let mut outputs = run(self, vec![x.clone()])?;
        match outputs.len() {
            1 => Ok(outputs.remove(0)),
            n => Err(KolosalError::Composition(format!(
                "{} produces a tuple of {} outputs; merge them with ConcatFeatures",
                self, n
            ))),
        }
    }
}

fn collect_violations(op: &Operator, config: &Value, out: &mut Vec<ValidationError>) {
    let c = match op {
        Operator::Individual(ind) => {
            out.extend(ind.violations(config));
            return;
        }
        Operator::Sequence(c) | Operator::Parallel(c) | Operator::Choice(c) => c,
    };
    let map = match as_object(config, op) {
        Ok(map) => map,
        Err(err) => {
            out.extend(err.as_validation().cloned());
            return;
        }
    };
    let keys = step_keys(c.steps());
    if let Some(m) = map {
        for (unknown, value) in m.iter().filter(|(k, _)| !keys.contains(k)) {
            out.push(ValidationError::new(
                unknown.as_str(),
                "additionalProperties false",
                op.hyperparam_schema().to_value(),
                value.clone(),
            ));
        }
    }

    if let Operator::Choice(_) = op {
        let selected: Vec<usize> = match map {
            Some(m) => (0..keys.len()).filter(|&i| m.contains_key(&keys[i])).collect(),
            None if keys.len() == 1 => vec![0],
            None => Vec::new(),
        };
        match selected.as_slice() {
            [i] => {
                let sub = map.and_then(|m| m.get(&keys[*i])).unwrap_or(&NULL);
                nested(&keys[*i], &c.steps()[*i], sub, out);
            }
            _ => out.push(ValidationError::new(
                "",
                format!("exactly one of [{}]", keys.join(", ")),
                op.hyperparam_schema().to_value(),
                config.clone(),
            )),
        }
        return;
    }

    for (key, step) in keys.iter().zip(c.steps()) {
        match map.and_then(|m| m.get(key)) {
            None if step.state() == LifecycleState::Trained => {}
            sub => nested(key, step, sub.unwrap_or(&NULL), out),
        }
    }
}

fn nested(key: &str, step: &Operator, sub: &Value, out: &mut Vec<ValidationError>) {
    let mut found = Vec::new();
    collect_violations(step, sub, &mut found);
    out.extend(found.into_iter().map(|v| v.prefixed(key)));
}

fn training_error(op: &IndividualOp, source: BoxError) -> KolosalError {
    KolosalError::Training {
        operator: op.name().to_string(),
        source,
    }
}

/// Fit `op` on `inputs`; outputs are computed only when a later step needs them
fn fit(
    op: &Operator,
    inputs: Vec<Array2<f64>>,
    y: Option<&Array1<f64>>,
    need_output: bool,
) -> Result<(Operator, Option<Vec<Array2<f64>>>)> {
    match op {
        Operator::Individual(ind) => {
            let (trained, fitted): (IndividualOp, Arc<dyn FittedModel>) = match ind.fitted() {
                Some(fitted) if ind.state() == LifecycleState::Trained => {
                    debug!(operator = ind.name(), "Reusing trained operator");
                    (ind.clone(), Arc::clone(fitted))
                }
                _ => {
                    let estimator = ind
                        .estimator()
                        .ok_or_else(|| training_error(ind, "no implementation is attached".into()))?;
                    let empty = Hyperparams::new();
                    let hyperparams = ind.hyperparams().unwrap_or(&empty);
                    let start = Instant::now();
                    let fitted: Arc<dyn FittedModel> =
                        Arc::from(estimator.fit(hyperparams, &inputs, y).map_err(|e| training_error(ind, e))?);
                    debug!(
                        operator = ind.name(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Fitted step"
                    );
                    (ind.trained(Arc::clone(&fitted)), fitted)
                }
            };
            let output = if need_output {
                Some(vec![fitted.predict(&inputs).map_err(|e| training_error(ind, e))?])
            } else {
                None
            };
            Ok((Operator::Individual(trained), output))
        }
        Operator::Sequence(c) => {
            let last = c.steps().len().saturating_sub(1);
            let mut current = inputs;
            let mut steps = Vec::with_capacity(c.steps().len());
            let mut output = None;
            for (i, step) in c.steps().iter().enumerate() {
                let needed = need_output || i < last;
                let (trained, out) = fit(step, current, y, needed)?;
                steps.push(trained);
                current = out.unwrap_or_default();
                if i == last {
                    output = if need_output { Some(current) } else { None };
                    break;
                }
            }
            Ok((assemble(OperatorKind::Sequence, steps), output))
        }
        Operator::Parallel(c) => {
            let mut steps = Vec::with_capacity(c.steps().len());
            let mut outputs = Vec::new();
            for step in c.steps() {
                let (trained, out) = fit(step, inputs.clone(), y, need_output)?;
                steps.push(trained);
                outputs.extend(out.unwrap_or_default());
            }
            let output = if need_output { Some(outputs) } else { None };
            Ok((assemble(OperatorKind::Parallel, steps), output))
        }
        Operator::Choice(_) => Err(KolosalError::state("execute", LifecycleState::Trainable, op.state())),
    }
}

/// Outputs of a trained operator; parallel composites yield one matrix per branch
fn run(op: &Operator, inputs: Vec<Array2<f64>>) -> Result<Vec<Array2<f64>>> {
    match op {
        Operator::Individual(ind) => {
            let fitted = ind
                .fitted()
                .ok_or_else(|| KolosalError::state("transform", LifecycleState::Trained, ind.state()))?;
            let out = fitted.predict(&inputs).map_err(|source| KolosalError::Prediction {
                operator: ind.name().to_string(),
                source,
            })?;
            Ok(vec![out])
        }
        Operator::Sequence(c) => c.steps().iter().try_fold(inputs, |current, step| run(step, current)),
        Operator::Parallel(c) => {
            let mut outputs = Vec::new();
            for step in c.steps() {
                outputs.extend(run(step, inputs.clone())?);
            }
            Ok(outputs)
        }
        Operator::Choice(_) => Err(KolosalError::state("transform", LifecycleState::Trained, op.state())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorRegistry;
    use crate::pipeline::{choice, parallel, sequence};
    use ndarray::array;
    use serde_json::json;

    fn op(name: &str) -> Operator {
        OperatorRegistry::builtin().unwrap().get(name).unwrap().into()
    }

    #[test]
    fn test_state_order_and_display() {
        assert!(LifecycleState::SchemaOnly < LifecycleState::Planned);
        assert!(LifecycleState::Trainable < LifecycleState::Trained);
        assert_eq!(LifecycleState::SchemaOnly.to_string(), "schema-only");
        assert_eq!(serde_json::to_value(LifecycleState::SchemaOnly).unwrap(), json!("schema_only"));
    }

    #[test]
    fn test_violations_follow_bind() {
        let lr = op("LogisticRegression");
        let found = lr.violations(&json!({"C": -1}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "C");
        assert!(lr.violations(&json!({"C": 0.5})).is_empty());

        let either = choice(&[op("LogisticRegression"), op("KNeighborsClassifier")]).unwrap();
        let pipeline = sequence(&op("PCA"), &either).unwrap();
        let found = pipeline.violations(&json!({
            "PCA": {"whiten": "yes"},
            "choice": {"LogisticRegression": {"C": -1}},
            "extra": 1
        }));
        let paths: Vec<&str> = found.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["extra", "PCA.whiten", "choice.LogisticRegression.C"]);

        let found = pipeline.violations(&json!({"choice": {}}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "choice");
        assert!(found[0].constraint.starts_with("exactly one of"));
    }

    #[test]
    fn test_plan_then_bind_keeps_planned_values() {
        let pca = op("PCA");
        let planned = pca.plan(&json!({"whiten": true})).unwrap();
        assert_eq!(planned.state(), LifecycleState::Planned);

        let bound = planned.bind(&json!({"svd_solver": "full"})).unwrap();
        let params = bound.as_individual().unwrap().hyperparams().unwrap();
        assert_eq!(params["whiten"], json!(true));
        assert_eq!(params["svd_solver"], json!("full"));
    }

    #[test]
    fn test_plan_rejects_later_states() {
        let bound = op("NoOp").bind(&NULL).unwrap();
        let err = bound.plan(&NULL).unwrap_err();
        assert!(matches!(
            err,
            KolosalError::State { required: LifecycleState::Planned, actual: LifecycleState::Trainable, .. }
        ));
    }

    #[test]
    fn test_bind_choice_resolves_branch() {
        let pipeline = sequence(
            &op("StandardScaler"),
            &choice(&[op("LogisticRegression"), op("KNeighborsClassifier")]).unwrap(),
        )
        .unwrap();

        let err = pipeline
            .bind(&json!({"KNeighborsClassifier": {"n_neighbors": 7}}))
            .unwrap_err();
        // step keys of the sequence are StandardScaler and choice
        assert_eq!(err.as_validation().unwrap().path, "KNeighborsClassifier");

        let bound = pipeline
            .bind(&json!({"choice": {"KNeighborsClassifier": {"n_neighbors": 7}}}))
            .unwrap();
        assert_eq!(bound.state(), LifecycleState::Trainable);
        assert_eq!(bound.to_string(), "StandardScaler >> KNeighborsClassifier");
    }

    #[test]
    fn test_bind_choice_needs_one_branch() {
        let either = choice(&[op("LogisticRegression"), op("KNeighborsClassifier")]).unwrap();
        let err = either.bind(&NULL).unwrap_err();
        assert!(err.as_validation().unwrap().constraint.starts_with("exactly one of"));

        let err = either
            .bind(&json!({"LogisticRegression": {}, "KNeighborsClassifier": {}}))
            .unwrap_err();
        assert!(err.as_validation().is_some());
    }

    #[test]
    fn test_bind_error_path_is_nested() {
        let pipeline = sequence(&op("PCA"), &op("LogisticRegression")).unwrap();
        let err = pipeline.bind(&json!({"LogisticRegression": {"C": 0}})).unwrap_err();
        let violation = err.as_validation().unwrap();
        assert_eq!(violation.path, "LogisticRegression.C");
        assert_eq!(violation.constraint, "exclusiveMinimum 0");
    }

    #[test]
    fn test_execute_and_transform_scalers() {
        let x = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let pipeline = sequence(&op("StandardScaler"), &op("MinMaxScaler")).unwrap();

        let err = pipeline.execute(&x, None).unwrap_err();
        assert!(matches!(err, KolosalError::State { .. }));

        let trainable = pipeline.bind(&NULL).unwrap();
        assert!(matches!(trainable.transform(&x), Err(KolosalError::State { .. })));

        let trained = trainable.execute(&x, None).unwrap();
        assert_eq!(trained.state(), LifecycleState::Trained);
        assert_eq!(trainable.state(), LifecycleState::Trainable);

        let out = trained.transform(&x).unwrap();
        assert_eq!(out.column(0).to_vec(), vec![0.0, 0.5, 1.0]);
        assert!(trained.predict(&x).is_err());
    }

    #[test]
    fn test_parallel_tuple_must_be_merged() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let both = parallel(&op("NoOp"), &op("MinMaxScaler")).unwrap();
        let trained = both.bind(&NULL).unwrap().execute(&x, None).unwrap();
        assert!(matches!(trained.transform(&x), Err(KolosalError::Composition(_))));

        let merged = sequence(&both, &op("ConcatFeatures")).unwrap();
        let trained = merged.bind(&NULL).unwrap().execute(&x, None).unwrap();
        let out = trained.transform(&x).unwrap();
        assert_eq!(out.dim(), (2, 4));
    }

    #[test]
    fn test_execute_without_implementation() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 1.0];
        let trainable = op("LogisticRegression").bind(&NULL).unwrap();
        match trainable.execute(&x, Some(&y)) {
            Err(KolosalError::Training { operator, .. }) => assert_eq!(operator, "LogisticRegression"),
            other => panic!("unexpected {:?}", other.map(|o| o.to_string())),
        }
    }

    #[test]
    fn test_trained_steps_are_reused() {
        let x = array![[0.0], [10.0]];
        let scaler = op("MinMaxScaler").bind(&NULL).unwrap().execute(&x, None).unwrap();
        let pipeline = sequence(&scaler, &op("NoOp")).unwrap();
        let trainable = pipeline.bind(&NULL).unwrap();
        assert_eq!(trainable.steps()[0].id(), scaler.id());

        // refit on different data: the reused scaler keeps its original range
        let other = array![[0.0], [5.0]];
        let trained = trainable.execute(&other, None).unwrap();
        assert_eq!(trained.steps()[0].id(), scaler.id());
        assert_eq!(trained.transform(&other).unwrap(), array![[0.0], [0.5]]);
    }
}
