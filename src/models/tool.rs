// Tool resource spec.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `Tool.spec` — an opaque callable plus the JSON-schema-like shape of its
/// parameters. The callable itself is never stored in the manifest; it is
/// registered by the embedding application under `execute.ref` before the
/// tool is ever invoked (see [`crate::tool_capability`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub execute: ExecuteRef,
    #[serde(default)]
    pub parameters: Value,
}

/// Reference to an opaque callable the embedder registers by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRef {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_tool_spec() {
        let yaml = r#"
id: calculator
description: adds two numbers
execute:
  ref: builtin.calculator
parameters:
  type: object
  properties:
    a: { type: number }
    b: { type: number }
  required: [a, b]
"#;
        let spec: ToolSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.id, "calculator");
        assert_eq!(spec.execute.reference, "builtin.calculator");
    }
}
