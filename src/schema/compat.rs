//! Structural compatibility between data schemas
//!
//! `check_compatible(producer, consumer)` answers whether every value the
//! producer may emit can be fed to the consumer. Only structure is compared:
//! types, array items and arity, required object fields, enums and `anyOf`.
//! Numeric ranges are ignored, and an unconstrained side is compatible.

use super::validator::validate;
use super::{Schema, SchemaType};

/// True if every value of `producer` is accepted by `consumer`
pub fn is_subschema(producer: &Schema, consumer: &Schema) -> bool {
    check_compatible(producer, consumer).is_ok()
}

/// Check that values described by `producer` satisfy `consumer`
pub fn check_compatible(producer: &Schema, consumer: &Schema) -> std::result::Result<(), String> {
    if consumer.is_unconstrained() || producer.is_unconstrained() {
        return Ok(());
    }

    if let Some(arms) = &producer.any_of {
        for (i, arm) in arms.iter().enumerate() {
            check_compatible(arm, consumer).map_err(|e| format!("alternative {}: {}", i, e))?;
        }
        return Ok(());
    }

    if let Some(arms) = &consumer.any_of {
        let mut reasons = Vec::with_capacity(arms.len());
        for arm in arms {
            match check_compatible(producer, arm) {
                Ok(()) => return Ok(()),
                Err(reason) => reasons.push(reason),
            }
        }
        return Err(format!("no accepted alternative ({})", reasons.join("; ")));
    }

    if let Some(members) = &consumer.all_of {
        for member in members {
            check_compatible(producer, member)?;
        }
    }

    if let Some(members) = &producer.all_of {
        if members.iter().any(|m| check_compatible(m, consumer).is_ok()) {
            return Ok(());
        }
    }

    if let Some(values) = &producer.enum_values {
        for value in values {
            validate(value, consumer).map_err(|e| format!("enum value {} rejected: {}", value, e))?;
        }
        return Ok(());
    }
    if consumer.enum_values.is_some() {
        return Err("consumer only accepts enumerated values".to_string());
    }

    if let (Some(produced), Some(accepted)) = (producer.kind, consumer.kind) {
        let widened = produced == SchemaType::Integer && accepted == SchemaType::Number;
        if produced != accepted && !widened {
            return Err(format!("{} is not {}", produced, accepted));
        }
    }

    check_arrays(producer, consumer)?;
    check_objects(producer, consumer)
}

fn check_arrays(producer: &Schema, consumer: &Schema) -> std::result::Result<(), String> {
    if let (Some(min), Some(max)) = (consumer.min_items, producer.max_items) {
        if max < min {
            return Err(format!("at most {} items produced, at least {} required", max, min));
        }
    }
    if let (Some(max), Some(min)) = (consumer.max_items, producer.min_items) {
        if min > max {
            return Err(format!("at least {} items produced, at most {} accepted", min, max));
        }
    }
    if let (Some(produced), Some(accepted)) = (&producer.items, &consumer.items) {
        check_compatible(produced, accepted).map_err(|e| format!("items: {}", e))?;
    }
    Ok(())
}

fn check_objects(producer: &Schema, consumer: &Schema) -> std::result::Result<(), String> {
    let produced = producer.object_schema().unwrap_or(producer);
    let accepted = consumer.object_schema().unwrap_or(consumer);

    for field in &accepted.required {
        let declared = produced.properties.as_ref().and_then(|props| props.get(field));
        let promised = produced.required.contains(field);
        match declared {
            Some(field_schema) => {
                if let Some(wanted) = accepted.properties.as_ref().and_then(|props| props.get(field)) {
                    check_compatible(field_schema, wanted).map_err(|e| format!("field '{}': {}", field, e))?;
                }
            }
            None if promised => {}
            None => return Err(format!("missing required field '{}'", field)),
        }
    }
    Ok(())
}

/// Check that two schemas can stand in for one another in at least one direction
pub fn interchangeable(a: &Schema, b: &Schema) -> std::result::Result<(), String> {
    check_compatible(a, b).or_else(|forward| {
        check_compatible(b, a).map_err(|backward| format!("{}; reverse: {}", forward, backward))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(doc: serde_json::Value) -> Schema {
        Schema::from_value(doc).unwrap()
    }

    #[test]
    fn test_number_array_vs_string_array() {
        let numbers = schema(json!({"type": "array", "items": {"type": "number"}}));
        let strings = schema(json!({"type": "array", "items": {"type": "string"}}));
        let err = check_compatible(&numbers, &strings).unwrap_err();
        assert!(err.contains("number is not string"));
        assert!(check_compatible(&numbers, &numbers).is_ok());
    }

    #[test]
    fn test_integer_widens_to_number() {
        let ints = schema(json!({"type": "integer"}));
        let nums = schema(json!({"type": "number"}));
        assert!(check_compatible(&ints, &nums).is_ok());
        assert!(check_compatible(&nums, &ints).is_err());
        assert!(is_subschema(&ints, &nums));
        assert!(!is_subschema(&nums, &ints));
        assert!(interchangeable(&nums, &ints).is_ok());
    }

    #[test]
    fn test_required_fields() {
        let producer = schema(json!({
            "type": "object",
            "properties": {"X": {"type": "array"}}
        }));
        let consumer = schema(json!({
            "type": "object",
            "required": ["X", "y"],
            "properties": {"X": {"type": "array"}, "y": {"type": "array"}}
        }));
        let err = check_compatible(&producer, &consumer).unwrap_err();
        assert_eq!(err, "missing required field 'y'");
    }

    #[test]
    fn test_enum_inclusion() {
        let small = schema(json!({"enum": ["a", "b"]}));
        let large = schema(json!({"enum": ["a", "b", "c"]}));
        assert!(check_compatible(&small, &large).is_ok());
        assert!(check_compatible(&large, &small).is_err());
    }

    #[test]
    fn test_tuple_only_fits_multi_input() {
        let dataset = schema(json!({"type": "array", "items": {"type": "array", "items": {"type": "number"}}}));
        let tuple = Schema {
            kind: Some(SchemaType::Array),
            min_items: Some(2),
            max_items: Some(2),
            items: Some(Box::new(Schema {
                any_of: Some(vec![dataset.clone(), dataset.clone()]),
                ..Schema::default()
            })),
            ..Schema::default()
        };
        let concat_input = Schema::array_of(dataset.clone());

        assert!(check_compatible(&tuple, &concat_input).is_ok());
        assert!(check_compatible(&tuple, &dataset).is_err());
        assert!(check_compatible(&dataset, &concat_input).is_err());
    }

    #[test]
    fn test_unconstrained_is_compatible() {
        let anything = Schema::any();
        let strings = schema(json!({"type": "string"}));
        assert!(check_compatible(&anything, &strings).is_ok());
        assert!(check_compatible(&strings, &anything).is_ok());
    }
}
