//! Individual operators: declaration, defaults and hyperparameter binding

use super::library::{Estimator, FittedModel, Hyperparams};
use super::{OpId, Tags};
use crate::error::{KolosalError, Result, ValidationError};
use crate::lifecycle::LifecycleState;
use crate::schema::{self, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Data schemas of an operator, as `{X, y}` objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSchemas {
    /// Arguments of `fit`
    #[serde(default)]
    pub input_fit: Schema,
    /// Arguments of `predict` / `transform`
    #[serde(default)]
    pub input_predict: Schema,
    /// Result of `predict` / `transform`
    #[serde(default)]
    pub output: Schema,
}

impl DataSchemas {
    /// Schema of the `X` value this operator consumes
    ///
    /// Composition checks the fit-time input; `fit` runs first and sees every
    /// value the operator will ever be fed.
    pub fn input(&self) -> &Schema {
        self.input_fit.data_field("X")
    }
}

/// Immutable declaration shared by every value derived from an operator
#[derive(Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub hyperparams: Schema,
    #[serde(default)]
    pub data: DataSchemas,
    #[serde(default)]
    pub tags: Tags,
    #[serde(skip)]
    estimator: Option<Arc<dyn Estimator>>,
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("has_estimator", &self.estimator.is_some())
            .finish()
    }
}

impl Declaration {
    pub fn new(name: impl Into<String>, hyperparams: Schema, data: DataSchemas, tags: Tags) -> Self {
        Self {
            name: name.into(),
            hyperparams,
            data,
            tags,
            estimator: None,
        }
    }
}

/// An individual operator value at some lifecycle state
#[derive(Clone)]
pub struct IndividualOp {
    id: OpId,
    decl: Arc<Declaration>,
    state: LifecycleState,
    /// Hyperparameters explicitly assigned by `plan` or `bind`
    assigned: Arc<Hyperparams>,
    /// Defaults overlaid with the assigned values
    hyperparams: Option<Arc<Hyperparams>>,
    fitted: Option<Arc<dyn FittedModel>>,
}

impl fmt::Debug for IndividualOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndividualOp")
            .field("id", &self.id)
            .field("name", &self.decl.name)
            .field("state", &self.state)
            .field("hyperparams", &self.hyperparams)
            .finish()
    }
}

impl IndividualOp {
    /// Declare an operator; the result is in state schema-only
    pub fn declare(name: impl Into<String>, hyperparams: Schema, data: DataSchemas, tags: Tags) -> Result<Self> {
        Self::from_declaration(Declaration::new(name, hyperparams, data, tags))
    }

    /// Build an operator from a (possibly deserialized) declaration
    pub fn from_declaration(decl: Declaration) -> Result<Self> {
        check_name(&decl.name)?;

        let defaults = Value::Object(decl.hyperparams.defaults());
        schema::validate(&defaults, &decl.hyperparams).map_err(|e| {
            KolosalError::Schema(format!("defaults of {} do not satisfy its schema: {}", decl.name, e))
        })?;

        Ok(Self {
            id: OpId::fresh(),
            decl: Arc::new(decl),
            state: LifecycleState::SchemaOnly,
            assigned: Arc::new(Hyperparams::new()),
            hyperparams: None,
            fitted: None,
        })
    }

    /// Attach the implementation supplied by the ML library
    pub fn with_estimator(&self, estimator: Arc<dyn Estimator>) -> Self {
        let mut decl = (*self.decl).clone();
        decl.estimator = Some(estimator);
        Self {
            id: OpId::fresh(),
            decl: Arc::new(decl),
            ..self.clone()
        }
    }

    /// Same value under a new node identity
    pub fn fresh(&self) -> Self {
        Self {
            id: OpId::fresh(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn tags(&self) -> &Tags {
        &self.decl.tags
    }

    pub fn hyperparam_schema(&self) -> &Schema {
        &self.decl.hyperparams
    }

    pub fn data_schemas(&self) -> &DataSchemas {
        &self.decl.data
    }

    pub fn declaration(&self) -> &Declaration {
        &self.decl
    }

    pub fn estimator(&self) -> Option<&Arc<dyn Estimator>> {
        self.decl.estimator.as_ref()
    }

    pub(crate) fn fitted(&self) -> Option<&Arc<dyn FittedModel>> {
        self.fitted.as_ref()
    }

    /// Full hyperparameter assignment, once planned or bound
    pub fn hyperparams(&self) -> Option<&Hyperparams> {
        self.hyperparams.as_deref()
    }

    /// Hyperparameters fixed by an explicit `plan` or `bind`
    pub fn assigned(&self) -> &Hyperparams {
        &self.assigned
    }

    /// Declared defaults, by hyperparameter name
    pub fn defaults(&self) -> Hyperparams {
        self.decl.hyperparams.defaults()
    }

    /// Validate `config` merged over the current assignment and return a trainable value
    pub fn bind(&self, config: &Value) -> Result<Self> {
        let (assigned, full) = self.merged(config)?;

        let candidate = Value::Object(full);
        schema::validate(&candidate, &self.decl.hyperparams)?;
        let full = match candidate {
            Value::Object(map) => map,
            _ => Hyperparams::new(),
        };

        Ok(self.derive(LifecycleState::Trainable, assigned, Some(full), None))
    }

    /// Attach defaults overlaid with `partial` without validation
    pub(crate) fn planned(&self, partial: &Value) -> Result<Self> {
        let (assigned, full) = self.merged(partial)?;
        Ok(self.derive(LifecycleState::Planned, assigned, Some(full), None))
    }

    /// Every violation `bind` would report for `config`, not just the first
    pub fn violations(&self, config: &Value) -> Vec<ValidationError> {
        match self.merged(config) {
            Ok((_, full)) => schema::violations(&Value::Object(full), &self.decl.hyperparams),
            Err(violation) => vec![violation],
        }
    }

    /// Explicit assignment after applying `config`, and that assignment over the defaults
    fn merged(&self, config: &Value) -> std::result::Result<(Hyperparams, Hyperparams), ValidationError> {
        let given = as_assignment(config, &self.decl.hyperparams)?;
        let mut assigned = (*self.assigned).clone();
        assigned.extend(given);
        let mut full = self.defaults();
        full.extend(assigned.clone());
        Ok((assigned, full))
    }

    pub(crate) fn trained(&self, fitted: Arc<dyn FittedModel>) -> Self {
        let full = self.hyperparams.as_deref().cloned();
        self.derive(LifecycleState::Trained, (*self.assigned).clone(), full, Some(fitted))
    }

    fn derive(
        &self,
        state: LifecycleState,
        assigned: Hyperparams,
        hyperparams: Option<Hyperparams>,
        fitted: Option<Arc<dyn FittedModel>>,
    ) -> Self {
        Self {
            id: OpId::fresh(),
            decl: Arc::clone(&self.decl),
            state,
            assigned: Arc::new(assigned),
            hyperparams: hyperparams.map(Arc::new),
            fitted,
        }
    }
}

fn as_assignment(config: &Value, schema: &Schema) -> std::result::Result<Hyperparams, ValidationError> {
    match config {
        Value::Null => Ok(Hyperparams::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(ValidationError::new("", "type object", schema.to_value(), other.clone())),
    }
}

/// Operator names double as configuration path segments
pub(crate) fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(KolosalError::Schema(format!(
            "operator name '{}' must be an identifier ([A-Za-z_][A-Za-z0-9_]*)",
            name
        )))
    }
}
