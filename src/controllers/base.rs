// The shared reconcile flow every per-kind controller runs through.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::event_bus::EventBus;
use crate::models::status::ConditionStatus;
use crate::models::{Phase, Resource, Status};
use crate::status_machine;
use crate::store::StateStore;

use super::retry::RetryStrategy;

/// What a per-kind controller knows how to do; `reconcile` (below) drives
/// every controller through the same lifecycle regardless of kind.
#[async_trait]
pub trait Controller: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn validate(&self, resource: &Resource) -> Result<()>;

    /// Resolve and check references the spec makes to other resources
    /// (Agent's tool bindings, Workflow's agent/tool steps, Network's agent
    /// roster). Default: no dependencies.
    async fn resolve_dependencies(&self, _resource: &Resource, _store: &dyn StateStore) -> Result<()> {
        Ok(())
    }

    /// The state this resource's spec implies should exist.
    async fn desired_state(&self, resource: &Resource) -> Result<Value>;

    /// The state actually observed (typically read back from `status`).
    async fn current_state(&self, resource: &Resource) -> Result<Value>;

    /// Drive `current` towards `desired`. Called only when they differ.
    async fn update_state(&self, resource: &Resource, desired: &Value, current: &Value) -> Result<()>;

    /// Release anything held for this resource; called once, when the
    /// resource is being torn down.
    async fn cleanup(&self, resource: &Resource) -> Result<()>;
}

/// Tracks resource keys with a reconcile in progress, so a concurrent
/// attempt on the same key is skipped rather than queued — the in-flight
/// reconcile will observe any change that triggered the second attempt.
#[derive(Default, Clone)]
pub struct ReconcileLocks {
    in_progress: std::sync::Arc<DashMap<String, ()>>,
}

impl ReconcileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, key: &str) -> bool {
        self.in_progress.insert(key.to_string(), ()).is_none()
    }

    fn release(&self, key: &str) {
        self.in_progress.remove(key);
    }
}

pub async fn reconcile(
    controller: &dyn Controller,
    store: &dyn StateStore,
    bus: &EventBus,
    locks: &ReconcileLocks,
    retry: &RetryStrategy,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let key = Resource::key_for(kind, namespace, name);
    if !locks.try_acquire(&key) {
        debug!(%key, "reconcile already in progress, skipping");
        return Ok(());
    }
    let outcome = reconcile_locked(controller, store, bus, retry, kind, namespace, name).await;
    locks.release(&key);
    outcome
}

async fn reconcile_locked(
    controller: &dyn Controller,
    store: &dyn StateStore,
    bus: &EventBus,
    retry: &RetryStrategy,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(mut resource) = store.get(kind, namespace, name).await? else {
        return Err(Error::ResourceNotFound(Resource::key_for(kind, namespace, name)));
    };

    if resource.status.is_none() {
        resource.status = Some(Status::default());
    }
    resource
        .status
        .as_mut()
        .unwrap()
        .upsert_condition("Reconciling", ConditionStatus::True, None, None);

    if resource.is_deleting() {
        status_machine::transition(&mut resource, Phase::Terminating, bus)?;
        controller.cleanup(&resource).await?;
        store.delete(kind, namespace, name).await?;
        bus.publish(&format!("{kind}.deleted"), json!({ "key": resource.key() }));
        info!(key = %resource.key(), "resource deleted");
        return Ok(());
    }

    if let Err(e) = controller.validate(&resource).await {
        fail(&mut resource, bus, "ValidationFailed", &e);
        store.save(resource).await?;
        return Err(e);
    }

    if let Err(e) = controller.resolve_dependencies(&resource, store).await {
        fail(&mut resource, bus, "DependencyResolutionFailed", &e);
        store.save(resource).await?;
        return Err(e);
    }

    let desired = controller.desired_state(&resource).await?;
    let current = controller.current_state(&resource).await?;

    if desired != current {
        if let Err(e) = controller.update_state(&resource, &desired, &current).await {
            let attempt = resource.status.as_ref().unwrap().retry_count();
            let retryable = retry.should_retry(attempt, &e);
            let to = if retryable { Phase::Degraded } else { Phase::Failed };
            let _ = status_machine::transition(&mut resource, to, bus);
            if retryable {
                resource.status.as_mut().unwrap().set_retry_count(attempt + 1);
            }
            resource
                .status
                .as_mut()
                .unwrap()
                .upsert_condition("Reconciling", ConditionStatus::False, None, None);
            store.save(resource).await?;
            bus.publish(
                &format!("{kind}.reconcile.failed"),
                json!({ "key": Resource::key_for(kind, namespace, name), "error": e.to_string() }),
            );
            if e.is_critical() {
                warn!(kind, namespace, name, error = %e, "critical error, periodic reconcile should stop for this resource");
            }
            return Err(e);
        }
    }

    {
        let status = resource.status.as_mut().unwrap();
        status.upsert_condition("Reconciling", ConditionStatus::False, None, None);
        status.set_retry_count(0);
        status.observed_generation = resource.metadata.generation;
    }
    promote_to_running(&mut resource, bus)?;

    store.save(resource.clone()).await?;
    bus.publish(&format!("{kind}.reconciled"), json!({ "key": resource.key() }));
    Ok(())
}

fn fail(resource: &mut Resource, bus: &EventBus, reason: &str, err: &Error) {
    let _ = status_machine::transition(resource, Phase::Failed, bus);
    let status = resource.status.as_mut().unwrap();
    status.upsert_condition("Error", ConditionStatus::True, Some(reason.to_string()), Some(err.to_string()));
    status.upsert_condition("Reconciling", ConditionStatus::False, None, None);
}

/// If reconcile succeeded, move the resource towards `Running` along
/// whatever edge the current phase allows — `Pending`/`Failed` pass
/// through `Initializing` first, `Degraded` goes directly.
fn promote_to_running(resource: &mut Resource, bus: &EventBus) -> Result<()> {
    let phase = resource.status.as_ref().unwrap().phase;
    match phase {
        Phase::Pending | Phase::Failed => {
            status_machine::transition(resource, Phase::Initializing, bus)?;
            status_machine::transition(resource, Phase::Running, bus)?;
        }
        Phase::Initializing | Phase::Degraded => {
            status_machine::transition(resource, Phase::Running, bus)?;
        }
        _ => {}
    }
    Ok(())
}
