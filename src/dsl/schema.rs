// A restricted JSON-Schema validator: enough of the vocabulary a CRD's
// `validation.openAPIV3Schema` uses — `type`, `properties`, `required`,
// `additionalProperties`, `enum`, `items`, `pattern`, numeric bounds. Not a
// general-purpose JSON Schema implementation.

use regex::Regex;
use serde_json::Value;

/// Validate `instance` against `schema`, returning every violation found
/// (not just the first) so the caller can build one `ValidationFailed`
/// message listing them all.
pub fn validate(schema: &Value, instance: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    validate_at(schema, instance, "$", &mut errors);
    errors
}

fn validate_at(schema: &Value, instance: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema_obj) = schema.as_object() else {
        return;
    };

    if let Some(expected_type) = schema_obj.get("type").and_then(Value::as_str) {
        if !type_matches(expected_type, instance) {
            errors.push(format!(
                "{path}: expected type {expected_type}, got {}",
                json_type_name(instance)
            ));
            return;
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(Value::as_array) {
        if !allowed.contains(instance) {
            errors.push(format!("{path}: value not in enum {allowed:?}"));
        }
    }

    if let Some(pattern) = schema_obj.get("pattern").and_then(Value::as_str) {
        if let Some(s) = instance.as_str() {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => errors.push(format!("{path}: does not match pattern {pattern}")),
                Ok(_) => {}
                Err(e) => errors.push(format!("{path}: invalid pattern {pattern}: {e}")),
            }
        }
    }

    if let Some(min) = schema_obj.get("minimum").and_then(Value::as_f64) {
        if let Some(n) = instance.as_f64() {
            if n < min {
                errors.push(format!("{path}: {n} is below minimum {min}"));
            }
        }
    }
    if let Some(max) = schema_obj.get("maximum").and_then(Value::as_f64) {
        if let Some(n) = instance.as_f64() {
            if n > max {
                errors.push(format!("{path}: {n} is above maximum {max}"));
            }
        }
    }

    if let Some(props) = schema_obj.get("properties").and_then(Value::as_object) {
        if let Some(obj) = instance.as_object() {
            for (key, sub_schema) in props {
                if let Some(value) = obj.get(key) {
                    validate_at(sub_schema, value, &format!("{path}.{key}"), errors);
                }
            }
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        if let Some(obj) = instance.as_object() {
            for req in required {
                if let Some(key) = req.as_str() {
                    if !obj.contains_key(key) {
                        errors.push(format!("{path}: missing required property {key}"));
                    }
                }
            }
        }
    }

    if schema_obj.get("additionalProperties") == Some(&Value::Bool(false)) {
        if let (Some(obj), Some(props)) = (instance.as_object(), schema_obj.get("properties").and_then(Value::as_object)) {
            for key in obj.keys() {
                if !props.contains_key(key) {
                    errors.push(format!("{path}: additional property {key} not allowed"));
                }
            }
        }
    }

    if let Some(item_schema) = schema_obj.get("items") {
        if let Some(arr) = instance.as_array() {
            for (i, item) in arr.iter().enumerate() {
                validate_at(item_schema, item, &format!("{path}[{i}]"), errors);
            }
        }
    }
}

fn type_matches(expected: &str, v: &Value) -> bool {
    match expected {
        "object" => v.is_object(),
        "array" => v.is_array(),
        "string" => v.is_string(),
        "number" => v.is_number(),
        "integer" => v.is_i64() || v.is_u64(),
        "boolean" => v.is_boolean(),
        "null" => v.is_null(),
        _ => true,
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
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

    #[test]
    fn required_field_missing_is_reported() {
        let schema = json!({
            "type": "object",
            "required": ["url"],
            "properties": { "url": { "type": "string" } }
        });
        let errors = validate(&schema, &json!({}));
        assert!(errors.iter().any(|e| e.contains("url")));
    }

    #[test]
    fn valid_instance_has_no_errors() {
        let schema = json!({
            "type": "object",
            "required": ["url"],
            "properties": { "url": { "type": "string" } }
        });
        let errors = validate(&schema, &json!({"url": "https://example.com"}));
        assert!(errors.is_empty());
    }

    #[test]
    fn enum_violation_is_reported() {
        let schema = json!({ "enum": ["a", "b"] });
        let errors = validate(&schema, &json!("c"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn pattern_rejects_non_matching_string() {
        let schema = json!({ "pattern": "^[a-z]+-[0-9]+$" });
        let errors = validate(&schema, &json!("Not_Matching"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("does not match pattern"));
    }

    #[test]
    fn pattern_accepts_matching_string() {
        let schema = json!({ "pattern": "^[a-z]+-[0-9]+$" });
        let errors = validate(&schema, &json!("datasource-42"));
        assert!(errors.is_empty());
    }

    #[test]
    fn invalid_pattern_is_reported_as_error_not_panic() {
        let schema = json!({ "pattern": "(unterminated" });
        let errors = validate(&schema, &json!("anything"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid pattern"));
    }
}
