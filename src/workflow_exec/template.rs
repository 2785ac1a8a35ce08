// The restricted `{{ path }}` templating and predicate grammar used by
// step input construction and `condition` steps. Dotted paths and a
// handful of comparison operators — no general expression language.

use serde_json::Value;

use crate::error::{Error, Result};

/// Walk a dotted path (`a.b.c`, with numeric segments indexing arrays)
/// against a JSON value.
pub fn extract_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value.clone();
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Object(ref map) => map.get(segment)?.clone(),
            Value::Array(ref arr) => {
                let idx: usize = segment.parse().ok()?;
                arr.get(idx)?.clone()
            }
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Replace every `{{ path }}` occurrence in `template` with the value found
/// by walking `ctx`. Unresolved paths render as an empty string.
pub fn render(template: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let path = after[..end].trim();
            let resolved = extract_path(ctx, path).map(|v| value_to_display(&v)).unwrap_or_default();
            out.push_str(&resolved);
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Evaluate a restricted boolean predicate: `<dotted-path> <op> <literal>`,
/// or a bare dotted path treated as a truthiness check. `<literal>` is a
/// number, `true`/`false`, or a single/double-quoted string.
pub fn evaluate_predicate(predicate: &str, ctx: &Value) -> Result<bool> {
    let predicate = predicate.trim();
    for (token, op) in [
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("==", Op::Eq),
        ("!=", Op::Ne),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some(idx) = predicate.find(token) {
            let lhs = predicate[..idx].trim();
            let rhs = predicate[idx + token.len()..].trim();
            let left = resolve_operand(lhs, ctx);
            let right = resolve_operand(rhs, ctx);
            return Ok(compare(&left, &right, op));
        }
    }
    Ok(truthy(&resolve_operand(predicate, ctx)))
}

fn resolve_operand(token: &str, ctx: &Value) -> Value {
    let token = token.trim();
    if let Ok(n) = token.parse::<f64>() {
        return Value::from(n);
    }
    if token == "true" {
        return Value::Bool(true);
    }
    if token == "false" {
        return Value::Bool(false);
    }
    if (token.starts_with('"') && token.ends_with('"') && token.len() >= 2) || (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2) {
        return Value::String(token[1..token.len() - 1].to_string());
    }
    extract_path(ctx, token).unwrap_or(Value::Null)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(left: &Value, right: &Value, op: Op) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            Op::Eq => l == r,
            Op::Ne => l != r,
            Op::Gt => l > r,
            Op::Lt => l < r,
            Op::Ge => l >= r,
            Op::Le => l <= r,
        };
    }
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return match op {
            Op::Eq => l == r,
            Op::Ne => l != r,
            Op::Gt => l > r,
            Op::Lt => l < r,
            Op::Ge => l >= r,
            Op::Le => l <= r,
        };
    }
    match op {
        Op::Eq => left == right,
        Op::Ne => left != right,
        _ => false,
    }
}

/// For `step.input` entries: literal values pass through; a string
/// beginning with `$` substitutes a named variable; any other string is
/// rendered as a `{{ }}` template against `ctx`.
pub fn resolve_input_value(source: &Value, variables: &std::collections::HashMap<String, Value>, ctx: &Value) -> Result<Value> {
    match source {
        Value::String(s) => {
            if let Some(var_name) = s.strip_prefix('$') {
                variables
                    .get(var_name)
                    .cloned()
                    .ok_or_else(|| Error::ValidationFailed(format!("step input references unknown variable ${var_name}")))
            } else if s.contains("{{") {
                Ok(Value::String(render(s, ctx)))
            } else {
                Ok(Value::String(s.clone()))
            }
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_path() {
        let ctx = json!({"workflow": {"input": {"x": 20}}});
        assert_eq!(render("value is {{ workflow.input.x }}", &ctx), "value is 20");
    }

    #[test]
    fn predicate_greater_than() {
        let ctx = json!({"input": {"x": 20}});
        assert!(evaluate_predicate("input.x > 10", &ctx).unwrap());
        assert!(!evaluate_predicate("input.x > 100", &ctx).unwrap());
    }

    #[test]
    fn predicate_string_equality() {
        let ctx = json!({"input": {"status": "ok"}});
        assert!(evaluate_predicate("input.status == \"ok\"", &ctx).unwrap());
    }

    #[test]
    fn dollar_variable_substitution() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("total".to_string(), json!(42));
        let resolved = resolve_input_value(&json!("$total"), &vars, &Value::Null).unwrap();
        assert_eq!(resolved, json!(42));
    }
}
