//! Sampling configurations from a search space

use super::{join_path, Arm, Distribution, SearchSpace};
use crate::error::{KolosalError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A configuration drawn from a search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Index of the drawn arm
    pub arm: usize,
    pub label: String,
    /// Flat values by hyperparameter path
    pub values: BTreeMap<String, Value>,
    /// Nested configuration accepted by `bind`
    pub config: Value,
}

impl Distribution {
    /// Draw a value
    pub fn sample(&self, rng: &mut impl Rng) -> Value {
        match self {
            Distribution::Uniform { low, high } => Value::from(rng.gen::<f64>() * (high - low) + low),
            Distribution::LogUniform { low, high } => {
                let log_low = low.ln();
                let log_high = high.ln();
                let val = (rng.gen::<f64>() * (log_high - log_low) + log_low).exp();
                Value::from(val.clamp(*low, *high))
            }
            Distribution::IntUniform { low, high } => Value::from(rng.gen_range(*low..=*high)),
            Distribution::IntLogUniform { low, high } => {
                let log_low = (*low as f64).ln();
                let log_high = (*high as f64).ln();
                let val = (rng.gen::<f64>() * (log_high - log_low) + log_low).exp() as i64;
                Value::from(val.clamp(*low, *high))
            }
            Distribution::Categorical { choices } => {
                if choices.is_empty() {
                    return Value::Null;
                }
                let idx = rng.gen_range(0..choices.len());
                choices[idx].clone()
            }
            Distribution::Constant { value } => value.clone(),
            Distribution::OneOf { alternatives } => {
                if alternatives.is_empty() {
                    return Value::Null;
                }
                let idx = rng.gen_range(0..alternatives.len());
                alternatives[idx].sample(rng)
            }
        }
    }
}

impl SearchSpace {
    /// Draw an arm uniformly, then every hyperparameter of that arm
    pub fn sample(&self, rng: &mut impl Rng) -> Result<Sample> {
        let arms = self.arms();
        if arms.is_empty() {
            return Err(KolosalError::SearchSpace("search space has no arms".to_string()));
        }
        let arm = if arms.len() == 1 { 0 } else { rng.gen_range(0..arms.len()) };

        let values: BTreeMap<String, Value> = arms[arm]
            .params
            .iter()
            .map(|(path, dist)| (path.clone(), dist.sample(rng)))
            .collect();
        let config = self.assemble(arm, &values)?;

        Ok(Sample {
            arm,
            label: arms[arm].label.clone(),
            values,
            config,
        })
    }

    /// Nest flat `values` of arm `arm` into a configuration for `bind`
    ///
    /// Hyperparameters left out keep their defaults; the arm's choice
    /// selections are always present.
    pub fn assemble(&self, arm: usize, values: &BTreeMap<String, Value>) -> Result<Value> {
        let arm: &Arm = self.arms().get(arm).ok_or_else(|| {
            KolosalError::SearchSpace(format!("arm {} out of range, space has {}", arm, self.n_arms()))
        })?;

        let mut root = Value::Object(Map::new());
        for (prefix, key) in &arm.selections {
            insert_path(&mut root, &join_path(prefix, key), None)?;
        }
        for (path, value) in values {
            if !arm.params.contains_key(path) {
                return Err(KolosalError::SearchSpace(format!(
                    "'{}' is not a hyperparameter of arm {}",
                    path, arm.label
                )));
            }
            insert_path(&mut root, path, Some(value.clone()))?;
        }
        Ok(root)
    }
}

/// Set `path` in `root`, creating objects along the way; `None` ensures an object exists
fn insert_path(root: &mut Value, path: &str, value: Option<Value>) -> Result<()> {
    let mut node = root;
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| KolosalError::SearchSpace("empty hyperparameter path".to_string()))?;

    for segment in parents {
        node = child_object(node, segment, path)?;
    }
    match value {
        Some(value) => {
            as_map(node, path)?.insert(last.to_string(), value);
        }
        None => {
            child_object(node, last, path)?;
        }
    }
    Ok(())
}

fn child_object<'v>(node: &'v mut Value, segment: &str, path: &str) -> Result<&'v mut Value> {
    let child = as_map(node, path)?
        .entry(segment.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        return Err(KolosalError::SearchSpace(format!("'{}' conflicts with a value at '{}'", path, segment)));
    }
    Ok(child)
}

fn as_map<'v>(node: &'v mut Value, path: &str) -> Result<&'v mut Map<String, Value>> {
    node.as_object_mut()
        .ok_or_else(|| KolosalError::SearchSpace(format!("'{}' passes through a non-object value", path)))
}
