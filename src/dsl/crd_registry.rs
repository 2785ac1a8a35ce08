// Registry of compiled CRD schemas, keyed by `"<group>/<kind>"`.

use dashmap::DashMap;
use serde_json::Value;

use crate::models::CrdSpec;

#[derive(Clone)]
pub struct CompiledCrd {
    pub schema: Value,
    pub scope: crate::models::Scope,
}

#[derive(Default, Clone)]
pub struct CrdRegistry {
    entries: std::sync::Arc<DashMap<String, CompiledCrd>>,
}

impl CrdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, crd: &CrdSpec) {
        self.entries.insert(
            crd.registry_key(),
            CompiledCrd {
                schema: crd.validation.open_api_v3_schema.clone(),
                scope: crd.scope,
            },
        );
    }

    pub fn remove(&self, crd: &CrdSpec) -> bool {
        self.entries.remove(&crd.registry_key()).is_some()
    }

    /// Look up by the apiVersion's group and the resource kind.
    pub fn lookup(&self, group: &str, kind: &str) -> Option<CompiledCrd> {
        self.entries.get(&format!("{group}/{kind}")).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrdNames, Scope, Validation};

    fn crd() -> CrdSpec {
        CrdSpec {
            group: "data.example.com".into(),
            names: CrdNames {
                kind: "DataSource".into(),
                plural: "datasources".into(),
                singular: None,
            },
            scope: Scope::Namespaced,
            validation: Validation {
                open_api_v3_schema: serde_json::json!({"type": "object"}),
            },
        }
    }

    #[test]
    fn register_then_lookup_then_remove() {
        let registry = CrdRegistry::new();
        let crd = crd();
        registry.register(&crd);
        assert!(registry.lookup("data.example.com", "DataSource").is_some());
        assert!(registry.remove(&crd));
        assert!(registry.lookup("data.example.com", "DataSource").is_none());
    }
}
