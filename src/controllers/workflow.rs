use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::workflow::StepType;
use crate::models::{Resource, StepDef, WorkflowSpec};
use crate::store::StateStore;

use super::base::Controller;

#[derive(Default)]
pub struct WorkflowController;

#[async_trait]
impl Controller for WorkflowController {
    fn kind(&self) -> &'static str {
        "Workflow"
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        let spec: WorkflowSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        if spec.step(&spec.initial_step).is_none() {
            return Err(Error::ValidationFailed(format!("initialStep {} has no matching step", spec.initial_step)));
        }
        Ok(())
    }

    async fn resolve_dependencies(&self, resource: &Resource, store: &dyn StateStore) -> Result<()> {
        let spec: WorkflowSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        let namespace = &resource.metadata.namespace;
        for step in &spec.steps {
            check_step_dependencies(step, namespace, store).await?;
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

fn check_step_dependencies<'a>(
    step: &'a StepDef,
    namespace: &'a str,
    store: &'a dyn StateStore,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        match step.type_ {
            StepType::Agent => {
                if let Some(name) = &step.agent {
                    if store.get("Agent", namespace, name).await?.is_none() {
                        return Err(Error::DependencyResolutionFailed(format!("step {} references missing Agent/{name}", step.id)));
                    }
                }
            }
            StepType::Tool => {
                if let Some(name) = &step.tool {
                    if store.get("Tool", namespace, name).await?.is_none() {
                        return Err(Error::DependencyResolutionFailed(format!("step {} references missing Tool/{name}", step.id)));
                    }
                }
            }
            StepType::Parallel => {
                for sub in &step.steps {
                    check_step_dependencies(sub, namespace, store).await?;
                }
            }
            StepType::Function | StepType::Condition => {}
        }
        Ok(())
    })
}
