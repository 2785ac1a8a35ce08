// Environment substitution (`${env.NAME}`) and cross-document `$ref`
// resolution.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::Resource;

/// Replace every `${env.NAME}` occurrence in string leaves of `value` using
/// `env`. Unresolved names are left as-is — the loader never fails on a
/// missing env var — unresolved references are left untouched rather than
/// failing the load.
pub fn substitute_env(value: &mut Value, env: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            *s = substitute_env_str(s, env);
        }
        Value::Array(items) => {
            for item in items {
                substitute_env(item, env);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                substitute_env(v, env);
            }
        }
        _ => {}
    }
}

fn substitute_env_str(input: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${env.") {
        out.push_str(&rest[..start]);
        let after = &rest[start + "${env.".len()..];
        if let Some(end) = after.find('}') {
            let name = &after[..end];
            if let Some(value) = env.get(name) {
                out.push_str(value);
            } else {
                // Leave unresolved reference untouched.
                out.push_str("${env.");
                out.push_str(name);
                out.push('}');
            }
            rest = &after[end + 1..];
        } else {
            out.push_str("${env.");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

/// Is `value` a `{"$ref": "Kind/name"}` node?
pub fn as_ref(value: &Value) -> Option<&str> {
    value.as_object().and_then(|m| {
        if m.len() == 1 {
            m.get("$ref").and_then(Value::as_str)
        } else {
            None
        }
    })
}

/// Resolve every `$ref` node inside every resource's `spec` against the
/// batch of resources parsed together, keyed by `"Kind/name"`. Fails with
/// [`Error::DanglingReference`] if any reference doesn't resolve.
pub fn resolve_batch_refs(resources: &mut [Resource]) -> Result<()> {
    let index: HashMap<String, Value> = resources
        .iter()
        .map(|r| {
            (
                format!("{}/{}", r.kind.as_str(), r.metadata.name),
                serde_json::to_value(r).expect("Resource always serializes"),
            )
        })
        .collect();

    for r in resources.iter_mut() {
        resolve_value_refs(&mut r.spec, &index)?;
    }
    Ok(())
}

fn resolve_value_refs(value: &mut Value, index: &HashMap<String, Value>) -> Result<()> {
    if let Some(reference) = as_ref(value) {
        let resolved = index
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::DanglingReference(reference.to_string()))?;
        *value = resolved;
        return Ok(());
    }
    match value {
        Value::Array(items) => {
            for item in items {
                resolve_value_refs(item, index)?;
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                resolve_value_refs(v, index)?;
            }
        }
        _ => {}
    }
    Ok(())
}
