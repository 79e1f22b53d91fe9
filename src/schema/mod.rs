//! JSON-Schema-like descriptors for hyperparameters and data
//!
//! Provides:
//! - [`Schema`] - recursive descriptor with optimizer extensions
//! - [`validate`] / [`violations`] - structural validation of configurations
//! - [`check_compatible`] - structural compatibility between data schemas

mod compat;
mod validator;

pub use compat::{check_compatible, interchangeable, is_subschema};
pub use validator::{validate, violations};

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// JSON type of a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaType::Null => "null",
            SchemaType::Boolean => "boolean",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::String => "string",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Exclusive bound, in draft-4 flag form or draft-6 numeric form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Exclusive {
    Flag(bool),
    Bound(f64),
}

/// Value of `additionalProperties`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

/// Sampling distribution hint for numeric hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingHint {
    Uniform,
    Loguniform,
}

/// A numeric bound with its exclusivity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub value: f64,
    pub exclusive: bool,
}

/// Recursive descriptor of permitted values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<Exclusive>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<Exclusive>,

    /// Declared default; an explicit `null` default is kept as `Some(Value::Null)`
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<SamplingHint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_for_optimizer: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_for_optimizer: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<Schema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Schema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Properties the optimizer searches; all properties when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_to_optimizer: Option<Vec<String>>,

    /// `false` keeps this fragment out of the search space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_optimizer: Option<bool>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Schema {
    /// Schema accepting any value
    pub fn any() -> Self {
        Self::default()
    }

    /// Schema of a single JSON type
    pub fn of_type(kind: SchemaType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Array schema with the given item schema
    pub fn array_of(items: Schema) -> Self {
        Self {
            kind: Some(SchemaType::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// Parse a schema from a JSON document
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| KolosalError::Schema(e.to_string()))
    }

    /// Parse a schema from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| KolosalError::Schema(e.to_string()))
    }

    /// Render the schema back to JSON
    pub fn to_value(&self) -> Value {
        // Every map is keyed by String and non-finite numbers become null,
        // so serializing a Schema into a Value cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// True when the schema places no constraint on values
    pub fn is_unconstrained(&self) -> bool {
        let stripped = Schema {
            default: None,
            description: None,
            relevant_to_optimizer: None,
            for_optimizer: None,
            distribution: None,
            minimum_for_optimizer: None,
            maximum_for_optimizer: None,
            ..self.clone()
        };
        stripped == Schema::default()
    }

    /// Effective lower bound, combining `minimum` with `exclusiveMinimum`
    pub fn lower_bound(&self) -> Option<Bound> {
        effective_bound(self.minimum, self.exclusive_minimum, |a, b| a >= b)
    }

    /// Effective upper bound, combining `maximum` with `exclusiveMaximum`
    pub fn upper_bound(&self) -> Option<Bound> {
        effective_bound(self.maximum, self.exclusive_maximum, |a, b| a <= b)
    }

    /// The object schema carrying `properties`, looking through `allOf`
    pub fn object_schema(&self) -> Option<&Schema> {
        if self.properties.is_some() {
            return Some(self);
        }
        self.all_of
            .as_ref()
            .and_then(|members| members.iter().find_map(|m| m.object_schema()))
    }

    /// Declared defaults of an object schema, walking `allOf` members
    pub fn defaults(&self) -> Map<String, Value> {
        let mut out = Map::new();
        self.collect_defaults(&mut out);
        out
    }

    fn collect_defaults(&self, out: &mut Map<String, Value>) {
        if let Some(props) = &self.properties {
            for (name, prop) in props {
                if let Some(default) = &prop.default {
                    out.entry(name.clone()).or_insert_with(|| default.clone());
                }
            }
        }
        if let Some(members) = &self.all_of {
            for member in members {
                member.collect_defaults(out);
            }
        }
    }

    /// The `name` property of an `{X, y}` data schema, or the schema itself
    pub fn data_field(&self, name: &str) -> &Schema {
        self.object_schema()
            .and_then(|obj| obj.properties.as_ref())
            .and_then(|props| props.get(name))
            .unwrap_or(self)
    }
}

fn effective_bound(
    inclusive: Option<f64>,
    exclusive: Option<Exclusive>,
    tighter_or_equal: impl Fn(f64, f64) -> bool,
) -> Option<Bound> {
    match (inclusive, exclusive) {
        (Some(v), Some(Exclusive::Flag(true))) => Some(Bound { value: v, exclusive: true }),
        (Some(v), Some(Exclusive::Bound(e))) => {
            if tighter_or_equal(e, v) {
                Some(Bound { value: e, exclusive: true })
            } else {
                Some(Bound { value: v, exclusive: false })
            }
        }
        (None, Some(Exclusive::Bound(e))) => Some(Bound { value: e, exclusive: true }),
        (Some(v), _) => Some(Bound { value: v, exclusive: false }),
        (None, _) => None,
    }
}
