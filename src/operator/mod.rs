//! Operator model
//!
//! Provides:
//! - [`Operator`] - closed set of individual and composite operators
//! - [`IndividualOp`] - a declared operator with its schemas and lifecycle state
//! - [`Estimator`] / [`FittedModel`] - the boundary to the ML library
//! - [`OperatorRegistry`] - process-wide catalog installed at start-up

pub mod catalog;
mod individual;
mod library;
mod registry;

pub use individual::{DataSchemas, Declaration, IndividualOp};
pub use library::{Estimator, FittedModel, Hyperparams};
pub use registry::{global, install, OperatorRegistry};

use crate::lifecycle::LifecycleState;
use crate::pipeline::{step_keys, Composite};
use crate::schema::{AdditionalProperties, Schema, SchemaType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of an operator value (a graph node)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(u64);

impl OpId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        OpId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Descriptive operator tags; they never affect composition legality
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    /// Preconditions on the input, e.g. `~categoricals`
    #[serde(default)]
    pub pre: Vec<String>,
    /// Operator kind, e.g. `estimator`, `classifier`
    #[serde(default)]
    pub op: Vec<String>,
    /// Output kind, e.g. `probabilities`
    #[serde(default)]
    pub post: Vec<String>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre(mut self, tag: impl Into<String>) -> Self {
        self.pre.push(tag.into());
        self
    }

    pub fn with_op(mut self, tag: impl Into<String>) -> Self {
        self.op.push(tag.into());
        self
    }

    pub fn with_post(mut self, tag: impl Into<String>) -> Self {
        self.post.push(tag.into());
        self
    }

    /// True if any group carries `tag`
    pub fn contains(&self, tag: &str) -> bool {
        self.pre.iter().chain(&self.op).chain(&self.post).any(|t| t == tag)
    }
}

/// Kind of an operator node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Individual,
    Sequence,
    Parallel,
    Choice,
}

/// An individual operator or a composite of operators
#[derive(Debug, Clone)]
pub enum Operator {
    Individual(IndividualOp),
    /// Steps run in order, each feeding the next
    Sequence(Composite),
    /// Branches see the same input; their outputs form a tuple
    Parallel(Composite),
    /// Exactly one branch is selected when binding
    Choice(Composite),
}

impl From<IndividualOp> for Operator {
    fn from(op: IndividualOp) -> Self {
        Operator::Individual(op)
    }
}

impl Operator {
    pub fn id(&self) -> OpId {
        match self {
            Operator::Individual(op) => op.id(),
            Operator::Sequence(c) | Operator::Parallel(c) | Operator::Choice(c) => c.id(),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Individual(_) => OperatorKind::Individual,
            Operator::Sequence(_) => OperatorKind::Sequence,
            Operator::Parallel(_) => OperatorKind::Parallel,
            Operator::Choice(_) => OperatorKind::Choice,
        }
    }

    /// Operator name; composites are named by kind
    pub fn name(&self) -> &str {
        match self {
            Operator::Individual(op) => op.name(),
            Operator::Sequence(_) | Operator::Parallel(_) => "pipeline",
            Operator::Choice(_) => "choice",
        }
    }

    /// Direct constituents; empty for an individual operator
    pub fn steps(&self) -> &[Operator] {
        match self {
            Operator::Individual(_) => &[],
            Operator::Sequence(c) | Operator::Parallel(c) | Operator::Choice(c) => c.steps(),
        }
    }

    pub fn as_individual(&self) -> Option<&IndividualOp> {
        match self {
            Operator::Individual(op) => Some(op),
            _ => None,
        }
    }

    /// Effective lifecycle state: the least advanced constituent; a choice is at most planned
    pub fn state(&self) -> LifecycleState {
        match self {
            Operator::Individual(op) => op.state(),
            Operator::Sequence(c) | Operator::Parallel(c) => min_state(c.steps()),
            Operator::Choice(c) => min_state(c.steps()).min(LifecycleState::Planned),
        }
    }

    /// Same structure with new identities for every node
    pub fn fresh(&self) -> Operator {
        match self {
            Operator::Individual(op) => Operator::Individual(op.fresh()),
            Operator::Sequence(c) => Operator::Sequence(Composite::new(c.steps().iter().map(Operator::fresh).collect())),
            Operator::Parallel(c) => Operator::Parallel(Composite::new(c.steps().iter().map(Operator::fresh).collect())),
            Operator::Choice(c) => Operator::Choice(Composite::new(c.steps().iter().map(Operator::fresh).collect())),
        }
    }

    /// Identities of this node and every node below it
    pub fn node_ids(&self) -> BTreeSet<OpId> {
        let mut ids = BTreeSet::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut BTreeSet<OpId>) {
        ids.insert(self.id());
        for step in self.steps() {
            step.collect_ids(ids);
        }
    }

    /// Individual operators that receive this operator's input
    pub fn ingress(&self) -> Vec<&IndividualOp> {
        match self {
            Operator::Individual(op) => vec![op],
            Operator::Sequence(c) => c.steps().first().map(|s| s.ingress()).unwrap_or_default(),
            Operator::Parallel(c) | Operator::Choice(c) => c.steps().iter().flat_map(|s| s.ingress()).collect(),
        }
    }

    /// Schema of the `X` value this operator consumes
    pub fn input_schema(&self) -> Schema {
        match self {
            Operator::Individual(op) => op.data_schemas().input().clone(),
            Operator::Sequence(c) | Operator::Parallel(c) | Operator::Choice(c) => {
                c.steps().first().map(|s| s.input_schema()).unwrap_or_default()
            }
        }
    }

    /// Schema of the value this operator produces
    pub fn output_schema(&self) -> Schema {
        match self {
            Operator::Individual(op) => op.data_schemas().output.clone(),
            Operator::Sequence(c) => c.steps().last().map(|s| s.output_schema()).unwrap_or_default(),
            Operator::Parallel(c) => {
                let outputs: Vec<Schema> = c.steps().iter().map(|s| s.output_schema()).collect();
                let n = outputs.len();
                Schema {
                    kind: Some(SchemaType::Array),
                    min_items: Some(n),
                    max_items: Some(n),
                    items: Some(Box::new(Schema {
                        any_of: Some(outputs),
                        ..Schema::default()
                    })),
                    ..Schema::default()
                }
            }
            Operator::Choice(c) => {
                let mut outputs: Vec<Schema> = Vec::new();
                for schema in c.steps().iter().map(|s| s.output_schema()) {
                    if !outputs.contains(&schema) {
                        outputs.push(schema);
                    }
                }
                if outputs.len() == 1 {
                    outputs.remove(0)
                } else {
                    Schema {
                        any_of: Some(outputs),
                        ..Schema::default()
                    }
                }
            }
        }
    }

    /// Hyperparameter schema; composites nest their constituents by step key
    ///
    /// A choice is the tagged union of single-key objects `{branch_key: config}`.
    pub fn hyperparam_schema(&self) -> Schema {
        match self {
            Operator::Individual(op) => op.hyperparam_schema().clone(),
            Operator::Sequence(c) | Operator::Parallel(c) => {
                let properties: BTreeMap<String, Schema> = step_keys(c.steps())
                    .into_iter()
                    .zip(c.steps())
                    .map(|(key, step)| (key, step.hyperparam_schema()))
                    .collect();
                Schema {
                    kind: Some(SchemaType::Object),
                    additional_properties: Some(AdditionalProperties::Allowed(false)),
                    properties: Some(properties),
                    ..Schema::default()
                }
            }
            Operator::Choice(c) => {
                let arms = step_keys(c.steps())
                    .into_iter()
                    .zip(c.steps())
                    .map(|(key, branch)| {
                        let mut properties = BTreeMap::new();
                        properties.insert(key.clone(), branch.hyperparam_schema());
                        Schema {
                            kind: Some(SchemaType::Object),
                            required: vec![key],
                            additional_properties: Some(AdditionalProperties::Allowed(false)),
                            properties: Some(properties),
                            ..Schema::default()
                        }
                    })
                    .collect();
                Schema {
                    any_of: Some(arms),
                    ..Schema::default()
                }
            }
        }
    }

    /// Default configuration; a choice defaults to its first branch
    pub fn defaults(&self) -> Value {
        match self {
            Operator::Individual(op) => Value::Object(op.defaults()),
            Operator::Sequence(c) | Operator::Parallel(c) => {
                let fields: Map<String, Value> = step_keys(c.steps())
                    .into_iter()
                    .zip(c.steps())
                    .map(|(key, step)| (key, step.defaults()))
                    .collect();
                Value::Object(fields)
            }
            Operator::Choice(c) => {
                let mut fields = Map::new();
                if let (Some(key), Some(first)) = (step_keys(c.steps()).into_iter().next(), c.steps().first()) {
                    fields.insert(key, first.defaults());
                }
                Value::Object(fields)
            }
        }
    }

    /// JSON description of the operator tree
    pub fn to_json(&self) -> Value {
        match self {
            Operator::Individual(op) => json!({
                "kind": OperatorKind::Individual,
                "name": op.name(),
                "id": op.id(),
                "state": op.state(),
                "hyperparams": op.hyperparams(),
                "tags": op.tags(),
            }),
            Operator::Sequence(c) | Operator::Parallel(c) | Operator::Choice(c) => {
                let steps: Map<String, Value> = step_keys(c.steps())
                    .into_iter()
                    .zip(c.steps())
                    .map(|(key, step)| (key, step.to_json()))
                    .collect();
                json!({
                    "kind": self.kind(),
                    "name": self.name(),
                    "id": c.id(),
                    "state": self.state(),
                    "steps": steps,
                })
            }
        }
    }
}

fn min_state(steps: &[Operator]) -> LifecycleState {
    steps
        .iter()
        .map(Operator::state)
        .min()
        .unwrap_or(LifecycleState::SchemaOnly)
}

impl fmt::Display for Operator {
    /// Pipeline expression: `>>` binds tighter than `&`, which binds tighter than `|`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(
            f: &mut fmt::Formatter<'_>,
            steps: &[Operator],
            sep: &str,
            needs_parens: impl Fn(&Operator) -> bool,
        ) -> fmt::Result {
            for (i, step) in steps.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                if needs_parens(step) {
                    write!(f, "({})", step)?;
                } else {
                    write!(f, "{}", step)?;
                }
            }
            Ok(())
        }

        match self {
            Operator::Individual(op) => f.write_str(op.name()),
            Operator::Sequence(c) => join(f, c.steps(), " >> ", |s| {
                matches!(s, Operator::Parallel(_) | Operator::Choice(_) | Operator::Sequence(_))
            }),
            Operator::Parallel(c) => join(f, c.steps(), " & ", |s| {
                matches!(s, Operator::Choice(_) | Operator::Parallel(_))
            }),
            Operator::Choice(c) => join(f, c.steps(), " | ", |s| matches!(s, Operator::Choice(_))),
        }
    }
}
