//! Structural validation of configuration values against a [`Schema`]

use super::{AdditionalProperties, Schema, SchemaType};
use crate::error::ValidationError;
use serde_json::Value;

/// Validate `value` against `schema`, reporting the first violation
///
/// Violations are visited in a deterministic order: object keys are sorted,
/// array items are visited by index.
pub fn validate(value: &Value, schema: &Schema) -> std::result::Result<(), ValidationError> {
    match violations(value, schema).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

/// Collect every violation of `schema` by `value`
pub fn violations(value: &Value, schema: &Schema) -> Vec<ValidationError> {
    let mut out = Vec::new();
    check(value, schema, "", &mut out);
    out
}

fn is_valid(value: &Value, schema: &Schema) -> bool {
    let mut out = Vec::new();
    check(value, schema, "", &mut out);
    out.is_empty()
}

fn violation(path: &str, constraint: String, schema: &Schema, value: &Value) -> ValidationError {
    ValidationError::new(path, constraint, schema.to_value(), value.clone())
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn check(value: &Value, schema: &Schema, path: &str, out: &mut Vec<ValidationError>) {
    if let Some(kind) = schema.kind {
        if !type_matches(value, kind) {
            out.push(violation(path, format!("type {}", kind), schema, value));
            return;
        }
    }

    if let Some(members) = &schema.enum_values {
        if !members.iter().any(|m| values_equal(m, value)) {
            let listed = Value::Array(members.clone());
            out.push(violation(path, format!("enum {}", listed), schema, value));
        }
    }

    if let Some(x) = value.as_f64() {
        check_bounds(x, value, schema, path, out);
    }

    if let Value::Array(elements) = value {
        check_array(elements, value, schema, path, out);
    }

    if let Value::Object(fields) = value {
        check_object(fields, value, schema, path, out);
    }

    if let Some(arms) = &schema.any_of {
        if !arms.iter().any(|arm| is_valid(value, arm)) {
            out.push(violation(path, "anyOf (no alternative matched)".to_string(), schema, value));
        }
    }

    if let Some(members) = &schema.all_of {
        for member in members {
            check(value, member, path, out);
        }
    }

    if let Some(negated) = &schema.not {
        if is_valid(value, negated) {
            out.push(violation(path, format!("not {}", negated.to_value()), schema, value));
        }
    }
}

fn check_bounds(x: f64, value: &Value, schema: &Schema, path: &str, out: &mut Vec<ValidationError>) {
    if let Some(lower) = schema.lower_bound() {
        if lower.exclusive && x <= lower.value {
            out.push(violation(path, format!("exclusiveMinimum {}", lower.value), schema, value));
        } else if !lower.exclusive && x < lower.value {
            out.push(violation(path, format!("minimum {}", lower.value), schema, value));
        }
    }
    if let Some(upper) = schema.upper_bound() {
        if upper.exclusive && x >= upper.value {
            out.push(violation(path, format!("exclusiveMaximum {}", upper.value), schema, value));
        } else if !upper.exclusive && x > upper.value {
            out.push(violation(path, format!("maximum {}", upper.value), schema, value));
        }
    }
}

fn check_array(elements: &[Value], value: &Value, schema: &Schema, path: &str, out: &mut Vec<ValidationError>) {
    if let Some(min) = schema.min_items {
        if elements.len() < min {
            out.push(violation(path, format!("minItems {}", min), schema, value));
        }
    }
    if let Some(max) = schema.max_items {
        if elements.len() > max {
            out.push(violation(path, format!("maxItems {}", max), schema, value));
        }
    }
    if let Some(items) = &schema.items {
        for (i, element) in elements.iter().enumerate() {
            check(element, items, &format!("{}[{}]", path, i), out);
        }
    }
}

fn check_object(
    fields: &serde_json::Map<String, Value>,
    value: &Value,
    schema: &Schema,
    path: &str,
    out: &mut Vec<ValidationError>,
) {
    for name in &schema.required {
        if !fields.contains_key(name) {
            out.push(violation(&child_path(path, name), "required".to_string(), schema, value));
        }
    }

    for (name, field) in fields {
        let declared = schema.properties.as_ref().and_then(|props| props.get(name));
        match (declared, &schema.additional_properties) {
            (Some(prop), _) => check(field, prop, &child_path(path, name), out),
            (None, Some(AdditionalProperties::Allowed(false))) => {
                out.push(violation(
                    &child_path(path, name),
                    "additionalProperties false".to_string(),
                    schema,
                    field,
                ));
            }
            (None, Some(AdditionalProperties::Schema(extra))) => {
                check(field, extra, &child_path(path, name), out)
            }
            (None, _) => {}
        }
    }
}

fn type_matches(value: &Value, kind: SchemaType) -> bool {
    match kind {
        SchemaType::Null => value.is_null(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Integer => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|x| x.is_finite() && x.fract() == 0.0).unwrap_or(false)
        }
        SchemaType::Number => value.is_number(),
        SchemaType::String => value.is_string(),
        SchemaType::Array => value.is_array(),
        SchemaType::Object => value.is_object(),
    }
}

/// JSON equality that compares numbers by value, so `1` equals `1.0`
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(doc: Value) -> Schema {
        Schema::from_value(doc).unwrap()
    }

    #[test]
    fn test_exclusive_minimum_flag() {
        let s = schema(json!({"type": "number", "minimum": 0, "exclusiveMinimum": true, "default": 1.0}));
        assert!(validate(&json!(-0.01), &s).is_err());
        assert!(validate(&json!(0), &s).is_err());
        assert!(validate(&json!(0.0), &s).is_err());
        assert!(validate(&json!(0.01), &s).is_ok());

        let err = validate(&json!(0), &s).unwrap_err();
        assert_eq!(err.constraint, "exclusiveMinimum 0");
        assert_eq!(err.value, json!(0));
    }

    #[test]
    fn test_inclusive_maximum() {
        let s = schema(json!({"type": "integer", "minimum": 1, "maximum": 3}));
        assert!(validate(&json!(3), &s).is_ok());
        assert!(validate(&json!(1), &s).is_ok());
        let err = validate(&json!(4), &s).unwrap_err();
        assert_eq!(err.constraint, "maximum 3");
    }

    #[test]
    fn test_integer_accepts_integral_floats_only() {
        let s = schema(json!({"type": "integer"}));
        assert!(validate(&json!(2), &s).is_ok());
        assert!(validate(&json!(2.0), &s).is_ok());
        assert!(validate(&json!(2.5), &s).is_err());
        assert!(validate(&json!("2"), &s).is_err());
    }

    #[test]
    fn test_enum_membership() {
        let s = schema(json!({"enum": ["l1", "l2", 1]}));
        assert!(validate(&json!("l2"), &s).is_ok());
        assert!(validate(&json!(1.0), &s).is_ok());
        let err = validate(&json!("elasticnet"), &s).unwrap_err();
        assert!(err.constraint.starts_with("enum"));
    }

    #[test]
    fn test_additional_properties_false() {
        let s = schema(json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"C": {"type": "number"}}
        }));
        assert!(validate(&json!({"C": 1.0}), &s).is_ok());
        let err = validate(&json!({"C": 1.0, "gamma": 2}), &s).unwrap_err();
        assert_eq!(err.path, "gamma");
        assert_eq!(err.constraint, "additionalProperties false");
    }

    #[test]
    fn test_additional_properties_schema() {
        let s = schema(json!({"type": "object", "additionalProperties": {"type": "string"}}));
        assert!(validate(&json!({"a": "x"}), &s).is_ok());
        assert_eq!(validate(&json!({"a": 1}), &s).unwrap_err().path, "a");
    }

    #[test]
    fn test_nested_path_and_required() {
        let s = schema(json!({
            "type": "object",
            "required": ["outer"],
            "properties": {
                "outer": {
                    "type": "object",
                    "properties": {"inner": {"type": "array", "items": {"type": "number", "maximum": 1}}}
                }
            }
        }));
        let err = validate(&json!({"outer": {"inner": [0.5, 2.0]}}), &s).unwrap_err();
        assert_eq!(err.path, "outer.inner[1]");

        let err = validate(&json!({}), &s).unwrap_err();
        assert_eq!(err.path, "outer");
        assert_eq!(err.constraint, "required");
    }

    #[test]
    fn test_any_of_all_of_not() {
        let s = schema(json!({
            "anyOf": [{"type": "integer", "minimum": 1}, {"enum": ["auto", null]}]
        }));
        assert!(validate(&json!(3), &s).is_ok());
        assert!(validate(&json!(null), &s).is_ok());
        assert!(validate(&json!(0), &s).is_err());

        let s = schema(json!({"allOf": [{"type": "number"}, {"maximum": 10}], "not": {"enum": [5]}}));
        assert!(validate(&json!(4), &s).is_ok());
        assert!(validate(&json!(11), &s).is_err());
        assert!(validate(&json!(5), &s).is_err());
    }

    #[test]
    fn test_all_violations_reported() {
        let s = schema(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "string"}}
        }));
        let all = violations(&json!({"a": "x", "b": 1}), &s);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].path, "a");
        assert_eq!(all[1].path, "b");
    }

    #[test]
    fn test_array_length() {
        let s = schema(json!({"type": "array", "minItems": 2, "maxItems": 2}));
        assert!(validate(&json!([1, 2]), &s).is_ok());
        assert_eq!(validate(&json!([1]), &s).unwrap_err().constraint, "minItems 2");
    }
}
