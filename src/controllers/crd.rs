use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dsl::CrdRegistry;
use crate::error::{Error, Result};
use crate::event_bus::EventBus;
use crate::models::{CrdSpec, Resource};
use crate::store::StateStore;

use super::base::Controller;

/// Registering/removing schemas has a side effect outside the resource
/// itself (the shared [`CrdRegistry`]), so this controller holds a handle
/// to it directly rather than stashing everything in `status`.
pub struct CrdController {
    registry: CrdRegistry,
    bus: EventBus,
}

impl CrdController {
    pub fn new(registry: CrdRegistry, bus: EventBus) -> Self {
        Self { registry, bus }
    }
}

#[async_trait]
impl Controller for CrdController {
    fn kind(&self) -> &'static str {
        "CustomResourceDefinition"
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        serde_json::from_value::<CrdSpec>(resource.spec.clone())
            .map(|_| ())
            .map_err(|e| Error::ValidationFailed(e.to_string()))
    }

    async fn desired_state(&self, resource: &Resource) -> Result<Value> {
        Ok(resource.spec.clone())
    }

    async fn current_state(&self, resource: &Resource) -> Result<Value> {
        let spec: CrdSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        let (group, kind) = spec.registry_key().split_once('/').map(|(g, k)| (g.to_string(), k.to_string())).unwrap();
        Ok(self
            .registry
            .lookup(&group, &kind)
            .map(|compiled| json!({ "group": group, "kind": kind, "scope": spec.scope, "validation": { "openAPIV3Schema": compiled.schema } }))
            .unwrap_or(Value::Null))
    }

    async fn update_state(&self, resource: &Resource, desired: &Value, _current: &Value) -> Result<()> {
        let spec: CrdSpec = serde_json::from_value(desired.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        self.registry.register(&spec);
        self.bus.publish("crd.registered", json!({ "key": resource.key(), "group": spec.group, "kind": spec.names.kind }));
        Ok(())
    }

    async fn cleanup(&self, resource: &Resource) -> Result<()> {
        let spec: CrdSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        self.registry.remove(&spec);
        self.bus.publish("crd.removed", json!({ "key": resource.key(), "group": spec.group, "kind": spec.names.kind }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kind, ObjectMeta};

    fn crd_resource() -> Resource {
        Resource::new(
            "mastra/v1",
            Kind::CustomResourceDefinition,
            ObjectMeta::new("datasources.data.example.com"),
            json!({
                "group": "data.example.com",
                "names": {"kind": "DataSource", "plural": "datasources"},
                "scope": "Namespaced",
                "validation": {"openAPIV3Schema": {"type": "object", "required": ["url"], "properties": {"url": {"type": "string"}}}}
            }),
        )
    }

    #[tokio::test]
    async fn update_state_registers_schema_and_cleanup_removes_it() {
        let registry = CrdRegistry::new();
        let bus = EventBus::new();
        let controller = CrdController::new(registry.clone(), bus);
        let resource = crd_resource();

        let desired = controller.desired_state(&resource).await.unwrap();
        let current = controller.current_state(&resource).await.unwrap();
        assert_ne!(desired, current);

        controller.update_state(&resource, &desired, &current).await.unwrap();
        assert!(registry.lookup("data.example.com", "DataSource").is_some());

        controller.cleanup(&resource).await.unwrap();
        assert!(registry.lookup("data.example.com", "DataSource").is_none());
    }
}
