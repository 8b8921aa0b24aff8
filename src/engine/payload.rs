//! Payload validation against an action's declared input shape.
//!
//! The input shape is a small JSON-Schema subset:
//!
//! | keyword | applies to |
//! |---|---|
//! | `type` | `object`, `string`, `number`, `integer`, `boolean`, `array` |
//! | `properties`, `required`, `additionalProperties: false` | objects |
//! | `enum` | any value |
//! | `minimum`, `maximum` | numbers |
//! | `items` | arrays |
//!
//! An empty shape (`{}`) accepts any payload. Unknown keywords are ignored.

use serde_json::{Map, Value};

use crate::core::action::Payload;
use crate::core::error::FieldError;

/// Check a payload, collecting every mismatch.
pub fn validate_payload(input_spec: &Value, payload: &Payload) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    let Some(shape) = input_spec.as_object() else {
        return Ok(());
    };
    if shape.is_empty() {
        return Ok(());
    }
    check_object(shape, payload, "", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn push(errors: &mut Vec<FieldError>, path: &str, message: impl Into<String>) {
    errors.push(FieldError {
        path: path.to_string(),
        message: message.into(),
    });
}

fn check(shape: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(shape) = shape.as_object() else {
        return;
    };

    if let Some(expected) = shape.get("type").and_then(Value::as_str) {
        if !has_type(value, expected) {
            push(errors, path, format!("expected {expected}, got {}", type_name(value)));
            return;
        }
    }

    if let Some(options) = shape.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            push(errors, path, format!("{value} is not one of {}", Value::Array(options.clone())));
        }
    }

    match value {
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = shape.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    push(errors, path, format!("must be >= {min}"));
                }
            }
            if let Some(max) = shape.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    push(errors, path, format!("must be <= {max}"));
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_shape) = shape.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_shape, item, &format!("{path}/{i}"), errors);
                }
            }
        }
        Value::Object(fields) => check_object(shape, fields, path, errors),
        _ => {}
    }
}

fn check_object(shape: &Map<String, Value>, fields: &Map<String, Value>, path: &str, errors: &mut Vec<FieldError>) {
    if let Some(expected) = shape.get("type").and_then(Value::as_str) {
        if expected != "object" {
            push(errors, path, format!("expected {expected}, got object"));
            return;
        }
    }

    let properties = shape.get("properties").and_then(Value::as_object);
    if let Some(required) = shape.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(key) {
                push(errors, &format!("{path}/{key}"), "is required");
            }
        }
    }
    let closed = shape.get("additionalProperties") == Some(&Value::Bool(false));

    for (key, value) in fields {
        let field_path = format!("{path}/{key}");
        match properties.and_then(|p| p.get(key)) {
            Some(field_shape) => check(field_shape, value, &field_path, errors),
            None if closed => push(errors, &field_path, "is not a declared field"),
            None => {}
        }
    }
}

fn has_type(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn paths(result: Result<(), Vec<FieldError>>) -> Vec<String> {
        result.unwrap_err().into_iter().map(|e| e.path).collect()
    }

    #[test]
    fn test_empty_shape_accepts_anything() {
        assert!(validate_payload(&json!({}), &payload(json!({"x": 1}))).is_ok());
    }

    #[test]
    fn test_required_and_types() {
        let shape = json!({
            "type": "object",
            "properties": {"card": {"type": "string"}, "n": {"type": "integer", "minimum": 1}},
            "required": ["card"]
        });
        assert!(validate_payload(&shape, &payload(json!({"card": "c1", "n": 2}))).is_ok());
        assert_eq!(paths(validate_payload(&shape, &payload(json!({"n": 0})))), vec!["/card", "/n"]);
        assert_eq!(paths(validate_payload(&shape, &payload(json!({"card": 3})))), vec!["/card"]);
    }

    #[test]
    fn test_enum_and_closed_objects() {
        let shape = json!({
            "type": "object",
            "properties": {"side": {"enum": ["L", "R"]}},
            "additionalProperties": false
        });
        assert!(validate_payload(&shape, &payload(json!({"side": "L"}))).is_ok());
        assert_eq!(
            paths(validate_payload(&shape, &payload(json!({"side": "M", "extra": 1})))),
            vec!["/extra", "/side"]
        );
    }

    #[test]
    fn test_nested_arrays() {
        let shape = json!({
            "type": "object",
            "properties": {"cards": {"type": "array", "items": {"type": "string"}}}
        });
        assert_eq!(
            paths(validate_payload(&shape, &payload(json!({"cards": ["a", 1]})))),
            vec!["/cards/1"]
        );
    }

    #[test]
    fn test_non_object_shape_rejects_payload() {
        let shape = json!({"type": "string"});
        assert_eq!(paths(validate_payload(&shape, &Payload::new())), vec![""]);
    }
}
