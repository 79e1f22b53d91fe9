//! Search spaces compiled from operator schemas
//!
//! Provides:
//! - [`compile`] - derive the search space of an operator
//! - [`SearchSpace`] - a product of hyperparameter distributions, or a
//!   top-level categorical over the arms of the pipeline's choices
//! - [`SearchSpace::sample`] / [`SearchSpace::assemble`] - turn flat
//!   optimizer suggestions into configurations accepted by `bind`
//!
//! Hyperparameters are addressed by flat dotted paths that mirror the nested
//! configuration: `PCA.n_components`, `choice.LogisticRegression.C`.

mod compile;
mod sample;

pub use compile::{compile, MAX_ARMS};
pub use sample::Sample;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Distribution of a single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Uniform { low: f64, high: f64 },
    LogUniform { low: f64, high: f64 },
    IntUniform { low: i64, high: i64 },
    IntLogUniform { low: i64, high: i64 },
    Categorical { choices: Vec<Value> },
    Constant { value: Value },
    /// One of several alternatives, from an `anyOf` schema
    OneOf { alternatives: Vec<Distribution> },
}

/// One combination of choice branches with its hyperparameter distributions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Arm {
    /// Selected branch keys joined by `+`
    pub label: String,
    /// Choice path (empty for a top-level choice) to the selected branch key
    pub selections: BTreeMap<String, String>,
    /// Distributions by hyperparameter path
    pub params: BTreeMap<String, Distribution>,
}

/// Search space of an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchSpace {
    /// No choice: a single product of distributions
    Product(Arm),
    /// Top-level categorical over arms
    Choice { arms: Vec<Arm> },
}

impl SearchSpace {
    pub fn arms(&self) -> &[Arm] {
        match self {
            SearchSpace::Product(arm) => std::slice::from_ref(arm),
            SearchSpace::Choice { arms } => arms,
        }
    }

    pub fn n_arms(&self) -> usize {
        self.arms().len()
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, SearchSpace::Choice { .. })
    }

    /// Number of searched hyperparameters over all arms
    pub fn n_params(&self) -> usize {
        self.arms().iter().map(|a| a.params.len()).sum()
    }
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
