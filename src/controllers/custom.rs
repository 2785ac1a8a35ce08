// Reconcile logic for instances of user-registered CRDs. Mirrors
// `ToolController`'s shape (no runtime side effects of its own) but
// validates against the CRD's registered schema instead of a fixed spec
// type.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dsl::CrdRegistry;
use crate::error::{Error, Result};
use crate::models::{Resource, Scope};
use crate::store::StateStore;

use super::base::Controller;

/// One instance per reconciled custom kind; `kind()` is fixed at
/// construction since `Controller::kind` can't vary per call.
pub struct CustomResourceController {
    registry: CrdRegistry,
    kind: &'static str,
}

impl CustomResourceController {
    pub fn new(registry: CrdRegistry, kind: impl Into<String>) -> Self {
        // Leaked once per distinct custom kind encountered; these are few
        // and live for the process lifetime, same cost as `&'static str`
        // kind tags on the built-in controllers.
        Self { registry, kind: Box::leak(kind.into().into_boxed_str()) }
    }
}

#[async_trait]
impl Controller for CustomResourceController {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        let (group, _) = resource.api_version.split_once('/').unwrap_or((&resource.api_version, ""));
        let compiled = self.registry.lookup(group, &self.kind).ok_or_else(|| Error::UnknownKind(format!("{group}/{}", self.kind)))?;

        if compiled.scope == Scope::Cluster && resource.metadata.namespace != "default" {
            return Err(Error::ValidationFailed(format!("{} is cluster-scoped and must omit metadata.namespace", self.kind)));
        }

        let errors = crate::dsl::schema::validate(&compiled.schema, &resource.spec);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::ValidationFailed(errors.join("; ")))
        }
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
