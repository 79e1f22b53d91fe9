//! Schema to search-space compilation

use super::{join_path, Arm, Distribution, SearchSpace};
use crate::error::{KolosalError, Result};
use crate::lifecycle::LifecycleState;
use crate::operator::{IndividualOp, Operator};
use crate::pipeline::step_keys;
use crate::schema::{Bound, SamplingHint, Schema, SchemaType};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Upper limit on the number of arms a pipeline's choices may multiply into
pub const MAX_ARMS: usize = 4096;

/// Arm under construction; `keys` are the selected branch keys in pipeline order
#[derive(Default, Clone)]
struct Partial {
    keys: Vec<String>,
    selections: BTreeMap<String, String>,
    params: BTreeMap<String, Distribution>,
}

impl Partial {
    fn merge(&self, other: &Partial) -> Partial {
        let mut merged = self.clone();
        merged.keys.extend(other.keys.iter().cloned());
        merged.selections.extend(other.selections.clone());
        merged.params.extend(other.params.clone());
        merged
    }

    fn into_arm(self) -> Arm {
        let label = if self.keys.is_empty() {
            "default".to_string()
        } else {
            self.keys.join("+")
        };
        Arm {
            label,
            selections: self.selections,
            params: self.params,
        }
    }
}

/// Compile the search space of `op`
///
/// Operators already trainable contribute nothing; planned operators
/// contribute only the hyperparameters not fixed by `plan`. Compilation is
/// deterministic: equal operators compile to equal spaces.
pub fn compile(op: &Operator) -> Result<SearchSpace> {
    let has_choice = contains_choice(op);
    let mut arms: Vec<Arm> = compile_arms(op, "")?.into_iter().map(Partial::into_arm).collect();

    let space = if has_choice {
        SearchSpace::Choice { arms }
    } else {
        SearchSpace::Product(arms.pop().unwrap_or_default())
    };
    debug!(
        operator = %op,
        arms = space.n_arms(),
        params = space.n_params(),
        "Compiled search space"
    );
    Ok(space)
}

fn contains_choice(op: &Operator) -> bool {
    matches!(op, Operator::Choice(_)) || op.steps().iter().any(contains_choice)
}

fn compile_arms(op: &Operator, prefix: &str) -> Result<Vec<Partial>> {
    match op {
        Operator::Individual(ind) => Ok(vec![Partial {
            params: compile_individual(ind, prefix)?,
            ..Partial::default()
        }]),
        Operator::Sequence(c) | Operator::Parallel(c) => {
            let mut arms = vec![Partial::default()];
            for (key, step) in step_keys(c.steps()).iter().zip(c.steps()) {
                let step_arms = compile_arms(step, &join_path(prefix, key))?;
                let count = arms.len().saturating_mul(step_arms.len());
                if count > MAX_ARMS {
                    return Err(too_many_arms(count));
                }
                arms = arms
                    .iter()
                    .flat_map(|left| step_arms.iter().map(move |right| left.merge(right)))
                    .collect();
            }
            Ok(arms)
        }
        Operator::Choice(c) => {
            let mut arms = Vec::new();
            for (key, branch) in step_keys(c.steps()).iter().zip(c.steps()) {
                for mut arm in compile_arms(branch, &join_path(prefix, key))? {
                    arm.keys.insert(0, key.clone());
                    arm.selections.insert(prefix.to_string(), key.clone());
                    arms.push(arm);
                }
                if arms.len() > MAX_ARMS {
                    return Err(too_many_arms(arms.len()));
                }
            }
            Ok(arms)
        }
    }
}

fn too_many_arms(count: usize) -> KolosalError {
    KolosalError::SearchSpace(format!(
        "pipeline choices multiply into {} arms, more than the limit of {}",
        count, MAX_ARMS
    ))
}

fn compile_individual(op: &IndividualOp, prefix: &str) -> Result<BTreeMap<String, Distribution>> {
    let mut params = BTreeMap::new();
    if op.state() >= LifecycleState::Trainable {
        return Ok(params);
    }
    let Some(object) = op.hyperparam_schema().object_schema() else {
        return Ok(params);
    };
    let Some(properties) = &object.properties else {
        return Ok(params);
    };

    for (name, schema) in properties {
        if let Some(relevant) = &object.relevant_to_optimizer {
            if !relevant.contains(name) {
                continue;
            }
        }
        if op.state() == LifecycleState::Planned && op.assigned().contains_key(name) {
            continue;
        }
        let path = join_path(prefix, name);
        if let Some(dist) = compile_schema(schema, &path)? {
            params.insert(path, dist);
        }
    }
    Ok(params)
}

fn compile_schema(schema: &Schema, path: &str) -> Result<Option<Distribution>> {
    if schema.for_optimizer == Some(false) {
        return Ok(None);
    }

    if let Some(arms) = &schema.any_of {
        let mut alternatives = Vec::with_capacity(arms.len());
        for arm in arms {
            if let Some(dist) = compile_schema(arm, path)? {
                alternatives.push(dist);
            }
        }
        return Ok(match alternatives.len() {
            0 => None,
            1 => alternatives.pop(),
            _ => Some(Distribution::OneOf { alternatives }),
        });
    }

    if let Some(values) = &schema.enum_values {
        return Ok(match values.as_slice() {
            [] => None,
            [only] => Some(Distribution::Constant { value: only.clone() }),
            _ => Some(Distribution::Categorical { choices: values.clone() }),
        });
    }

    match schema.kind {
        Some(SchemaType::Boolean) => Ok(Some(Distribution::Categorical {
            choices: vec![Value::Bool(false), Value::Bool(true)],
        })),
        Some(SchemaType::Null) => Ok(Some(Distribution::Constant { value: Value::Null })),
        Some(SchemaType::Number) => compile_number(schema, path, false),
        Some(SchemaType::Integer) => compile_number(schema, path, true),
        _ => Ok(None),
    }
}

fn compile_number(schema: &Schema, path: &str, integer: bool) -> Result<Option<Distribution>> {
    let low = schema
        .minimum_for_optimizer
        .map(|value| Bound { value, exclusive: false })
        .or_else(|| schema.lower_bound());
    let high = schema
        .maximum_for_optimizer
        .map(|value| Bound { value, exclusive: false })
        .or_else(|| schema.upper_bound());
    let (Some(low), Some(high)) = (low, high) else {
        return Ok(None);
    };
    let log = schema.distribution == Some(SamplingHint::Loguniform);

    if integer {
        let lo = if low.exclusive { low.value.floor() + 1.0 } else { low.value.ceil() };
        let hi = if high.exclusive { high.value.ceil() - 1.0 } else { high.value.floor() };
        check_range(lo, hi, log, path)?;
        let (lo, hi) = (lo as i64, hi as i64);
        return Ok(Some(if lo == hi {
            Distribution::Constant { value: Value::from(lo) }
        } else if log {
            Distribution::IntLogUniform { low: lo, high: hi }
        } else {
            Distribution::IntUniform { low: lo, high: hi }
        }));
    }

    let nudge = |x: f64| x.abs().max(1.0) * f64::EPSILON;
    let lo = if low.exclusive { low.value + nudge(low.value) } else { low.value };
    let hi = if high.exclusive { high.value - nudge(high.value) } else { high.value };
    check_range(lo, hi, log, path)?;
    Ok(Some(if lo == hi {
        Distribution::Constant { value: Value::from(lo) }
    } else if log {
        Distribution::LogUniform { low: lo, high: hi }
    } else {
        Distribution::Uniform { low: lo, high: hi }
    }))
}

fn check_range(low: f64, high: f64, log: bool, path: &str) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || low > high {
        return Err(KolosalError::SearchSpace(format!(
            "empty range [{}, {}] for {}",
            low, high, path
        )));
    }
    if log && low <= 0.0 {
        return Err(KolosalError::SearchSpace(format!(
            "log-uniform range for {} needs a positive lower bound, got {}",
            path, low
        )));
    }
    Ok(())
}
