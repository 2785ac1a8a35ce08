// CustomResourceDefinition resource spec.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Namespaced,
    Cluster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrdNames {
    pub kind: String,
    pub plural: String,
    #[serde(default)]
    pub singular: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    #[serde(rename = "openAPIV3Schema")]
    pub open_api_v3_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrdSpec {
    pub group: String,
    pub names: CrdNames,
    pub scope: Scope,
    pub validation: Validation,
}

impl CrdSpec {
    /// The registry key used by the CRD registry and the DSL loader:
    /// `"<group>/<kind>"`.
    pub fn registry_key(&self) -> String {
        format!("{}/{}", self.group, self.names.kind)
    }
}
