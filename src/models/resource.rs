// Universal resource envelope and kind-specific specs.

//! # Resource Models
//!
//! Every declarative object the runtime manages — `Tool`, `Agent`,
//! `Workflow`, `Network`, `Llm`, `CustomResourceDefinition`, or a
//! user-defined CRD instance — is wrapped in the same [`Resource`] envelope.
//! Identity is `(kind, namespace, name)`; [`Resource::key`] is the canonical
//! string form controllers and the scheduler use to serialize access to a
//! single resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::status::Status;

/// The kind of a resource, as it appears in a manifest's `kind:` field.
///
/// `Custom` carries the CRD-registered kind name for anything that isn't one
/// of the five built-in kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Kind {
    Tool,
    Agent,
    Workflow,
    Network,
    Llm,
    CustomResourceDefinition,
    MastraPod,
    #[serde(untagged)]
    Custom(String),
}

impl Kind {
    pub fn as_str(&self) -> &str {
        match self {
            Kind::Tool => "Tool",
            Kind::Agent => "Agent",
            Kind::Workflow => "Workflow",
            Kind::Network => "Network",
            Kind::Llm => "Llm",
            Kind::CustomResourceDefinition => "CustomResourceDefinition",
            Kind::MastraPod => "MastraPod",
            Kind::Custom(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Tool" => Kind::Tool,
            "Agent" => Kind::Agent,
            "Workflow" => Kind::Workflow,
            "Network" => Kind::Network,
            "Llm" => Kind::Llm,
            "CustomResourceDefinition" => Kind::CustomResourceDefinition,
            "MastraPod" => Kind::MastraPod,
            other => Kind::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `metadata` block common to every resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    /// Internal bookkeeping counter bumped on every `save` — not part of the
    /// public YAML shape, used by the store/controllers to detect lost
    /// updates without re-reading under a lock every time.
    #[serde(skip)]
    pub resource_version: u64,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            deletion_timestamp: None,
            creation_timestamp: Some(Utc::now()),
            generation: Some(1),
            resource_version: 0,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// The envelope wrapping every resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: Kind,
    pub metadata: ObjectMeta,
    pub spec: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl Resource {
    pub fn new(api_version: impl Into<String>, kind: Kind, metadata: ObjectMeta, spec: serde_json::Value) -> Self {
        Self {
            api_version: api_version.into(),
            kind,
            metadata,
            spec,
            status: None,
        }
    }

    /// Canonical identity: `"<kind>.<namespace>.<name>"`.
    pub fn key(&self) -> String {
        Self::key_for(self.kind.as_str(), &self.metadata.namespace, &self.metadata.name)
    }

    pub fn key_for(kind: &str, namespace: &str, name: &str) -> String {
        format!("{kind}.{namespace}.{name}")
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn mark_for_deletion(&mut self) {
        self.metadata.deletion_timestamp = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_kind_namespace_name() {
        let r = Resource::new(
            "mastra/v1",
            Kind::Agent,
            ObjectMeta::new("math-agent"),
            serde_json::json!({}),
        );
        assert_eq!(r.key(), "Agent.default.math-agent");
    }

    #[test]
    fn custom_kind_round_trips_through_string() {
        let k = Kind::from_str("DataSource");
        assert_eq!(k.as_str(), "DataSource");
        assert_eq!(k, Kind::Custom("DataSource".to_string()));
    }
}
