//! Parameter-schema checks for tool descriptors and tool-call arguments.
//!
//! Tools declare their arguments with a JSON Schema object. Only the subset
//! the tools actually use is understood: `type`, `properties`, `required`,
//! `enum`, `items` and `additionalProperties: false`. Anything else in a
//! schema is carried through to the model untouched and ignored here.

use serde_json::Value;

/// Check that a descriptor schema is well formed.
///
/// Run once at registration. A schema must be an object of `type: "object"`
/// whose `properties` (if present) is an object and whose `required` entries
/// all name declared properties.
pub fn validate_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "schema must be a JSON object".to_string())?;

    match obj.get("type").and_then(Value::as_str) {
        Some("object") => {}
        Some(other) => return Err(format!("top-level type must be \"object\", got \"{other}\"")),
        None => return Err("top-level schema is missing \"type\"".into()),
    }

    let properties = match obj.get("properties") {
        None => None,
        Some(Value::Object(props)) => Some(props),
        Some(_) => return Err("\"properties\" must be an object".into()),
    };

    if let Some(required) = obj.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| "\"required\" must be an array".to_string())?;
        for entry in required {
            let name = entry
                .as_str()
                .ok_or_else(|| "\"required\" entries must be strings".to_string())?;
            if !properties.is_some_and(|p| p.contains_key(name)) {
                return Err(format!("required property \"{name}\" is not declared"));
            }
        }
    }

    Ok(())
}

/// Validate tool-call arguments against a descriptor schema.
///
/// Returns a human-readable reason on the first violation found; the
/// reason is fed back to the model so it can correct the call.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    check_value(schema, arguments, "arguments")
}

fn check_value(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!(
                "{path}: expected {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} is not one of {}", Value::Array(allowed.clone())));
        }
    }

    if let Value::Object(fields) = value {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(format!("{path}: missing required property \"{name}\""));
                }
            }
        }

        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (name, field) in fields {
            match properties.and_then(|p| p.get(name)) {
                Some(field_schema) => check_value(field_schema, field, &format!("{path}.{name}"))?,
                None if closed => {
                    return Err(format!("{path}: unexpected property \"{name}\""));
                }
                None => {}
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check_value(item_schema, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
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
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
