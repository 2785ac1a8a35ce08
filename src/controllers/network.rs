use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{NetworkSpec, Resource};
use crate::store::StateStore;

use super::base::Controller;

#[derive(Default)]
pub struct NetworkController;

#[async_trait]
impl Controller for NetworkController {
    fn kind(&self) -> &'static str {
        "Network"
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        let spec: NetworkSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        if spec.agents.is_empty() {
            return Err(Error::ValidationFailed("network must list at least one agent".to_string()));
        }
        Ok(())
    }

    async fn resolve_dependencies(&self, resource: &Resource, store: &dyn StateStore) -> Result<()> {
        let spec: NetworkSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        let namespace = &resource.metadata.namespace;
        for entry in &spec.agents {
            let (kind, name) = entry
                .reference
                .split_once('/')
                .ok_or_else(|| Error::DependencyResolutionFailed(format!("agent {} has malformed ref {}", entry.name, entry.reference)))?;
            if store.get(kind, namespace, name).await?.is_none() {
                return Err(Error::DependencyResolutionFailed(format!("agent alias {} references missing {kind}/{name}", entry.name)));
            }
        }
        Ok(())
    }

    async fn desired_state(&self, resource: &Resource) -> Result<Value> {
        Ok(json!({ "generation": resource.metadata.generation }))
    }

    async fn current_state(&self, resource: &Resource) -> Result<Value> {
        Ok(json!({ "generation": resource.status.as_ref().and_then(|s| s.observed_generation) }))
    }

    async fn update_state(&self, _resource: &Resource, _desired: &Value, _current: &Value) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self, _resource: &Resource) -> Result<()> {
        Ok(())
    }
}
