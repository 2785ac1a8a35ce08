//! The embeddable entry point: one `RuntimeManager` owns the event bus,
//! state store, scheduler, per-kind controllers, and the live executors
//! materialized from reconciled `Workflow`/`Network` resources. Everything
//! else in this crate is a building block this type assembles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::warn;

use crate::agent_capability::{AgentCapability, GenerateResult};
use crate::controllers::{
    self, AgentController, Controller, CrdController, LlmController, NetworkController, ReconcileLocks, RetryStrategy, ToolController, WorkflowController,
};
use crate::dsl::{CrdRegistry, DslLoader};
use crate::error::{Error, Result};
use crate::event_bus::{Event, EventBus};
use crate::models::{AgentSpec, NetworkSpec, Resource, ToolSpec, WorkflowSpec};
use crate::network_exec::{NetworkExecuteResult, NetworkExecutionContext, NetworkExecutor, RoutingStrategy};
use crate::plugin::PluginManager;
use crate::scheduler::{MetricsSnapshot, Priority, Scheduler, SchedulerConfig, Task, TaskHandler};
use crate::store::StateStore;
use crate::tool_capability::{ToolCapability, ToolRegistry};
use crate::workflow_exec::{ExecutionContext, FunctionHandler, WorkflowExecuteResult, WorkflowExecutor};

/// Everything an embedding application registers before resources can run:
/// model-backed generation, tool callables, and workflow function steps.
/// Kept separate from the reconciled resource graph itself, the same way
/// `AgentCapability`/`ToolCapability` keep the core ignorant of what's on
/// the other side of the call.
pub struct RuntimeManager {
    store: Arc<dyn StateStore>,
    bus: EventBus,
    scheduler: Arc<Scheduler>,
    locks: ReconcileLocks,
    retry: RetryStrategy,
    crd_registry: CrdRegistry,
    dsl_loader: DslLoader,
    controllers: HashMap<&'static str, Arc<dyn Controller>>,
    /// Lazily built per custom kind the first time one reconciles, so a
    /// kind with no controller of its own still gets schema-validated
    /// reconcile instead of an unconditional `UnknownKind`.
    custom_controllers: DashMap<String, Arc<dyn Controller>>,

    /// Agent capabilities, keyed by the `Agent` resource's own name.
    agent_capabilities: DashMap<String, Arc<dyn AgentCapability>>,
    /// Model-backed capabilities keyed by a `provider/name` string, used by
    /// a `Network`'s router (which has no `Agent` resource of its own).
    llm_capabilities: DashMap<String, Arc<dyn AgentCapability>>,
    /// `execute.ref` -> callable, as registered by the embedder.
    tools: ToolRegistry,
    /// `Tool` resource name -> its resolved callable, rebuilt on reconcile.
    tools_by_alias: DashMap<String, Arc<dyn ToolCapability>>,
    functions: DashMap<String, FunctionHandler>,

    workflows: DashMap<String, Arc<WorkflowExecutor>>,
    networks: DashMap<String, Arc<NetworkExecutor>>,

    plugins: PluginManager,

    cache_ttl: Duration,

    /// One per-resource background loop, keyed by resource key, re-submitting
    /// a reconcile pass on `reconcile_interval` until the resource is gone.
    reconcile_tasks: DashMap<String, tokio::task::JoinHandle<()>>,
    reconcile_interval: Duration,
}

impl RuntimeManager {
    pub fn new(store: Arc<dyn StateStore>, scheduler_config: SchedulerConfig) -> Self {
        let bus = EventBus::new();
        let crd_registry = CrdRegistry::new();
        let dsl_loader = DslLoader::new(crd_registry.clone());
        let scheduler = Arc::new(Scheduler::new(scheduler_config));

        let mut controllers: HashMap<&'static str, Arc<dyn Controller>> = HashMap::new();
        controllers.insert("Tool", Arc::new(ToolController));
        controllers.insert("Agent", Arc::new(AgentController));
        controllers.insert("Llm", Arc::new(LlmController));
        controllers.insert("Workflow", Arc::new(WorkflowController));
        controllers.insert("Network", Arc::new(NetworkController));
        controllers.insert("CustomResourceDefinition", Arc::new(CrdController::new(crd_registry.clone(), bus.clone())));

        let locks = ReconcileLocks::new();
        let retry = RetryStrategy::default();

        // Controllers react to a dependency's lifecycle events, not just their
        // own resource's: an Agent/Workflow/Network whose referenced Tool/Llm/
        // Agent was created, updated, or deleted gets re-reconciled so a
        // newly-satisfied or newly-broken dependency is picked up without
        // waiting for the next periodic tick.
        for topic in ["*.created", "*.updated", "*.deleted"] {
            let store = store.clone();
            let scheduler = scheduler.clone();
            let bus2 = bus.clone();
            let locks2 = locks.clone();
            let retry2 = retry.clone();
            let controllers2 = controllers.clone();
            bus.subscribe(topic, move |event| {
                reconcile_dependents(event, store.clone(), scheduler.clone(), bus2.clone(), locks2.clone(), retry2.clone(), controllers2.clone());
            });
        }

        Self {
            store,
            plugins: PluginManager::new(bus.clone()),
            bus,
            scheduler,
            locks,
            retry,
            crd_registry,
            dsl_loader,
            controllers,
            custom_controllers: DashMap::new(),
            agent_capabilities: DashMap::new(),
            llm_capabilities: DashMap::new(),
            tools: ToolRegistry::new(),
            tools_by_alias: DashMap::new(),
            functions: DashMap::new(),
            workflows: DashMap::new(),
            networks: DashMap::new(),
            cache_ttl: Duration::from_secs(300),
            reconcile_tasks: DashMap::new(),
            reconcile_interval: Duration::from_secs(60),
        }
    }

    /// Override the default 60s periodic reconcile interval (mainly for tests).
    pub fn set_reconcile_interval(&mut self, interval: Duration) {
        self.reconcile_interval = interval;
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn scheduler_metrics(&self) -> MetricsSnapshot {
        self.scheduler.metrics()
    }

    pub fn crd_registry(&self) -> &CrdRegistry {
        &self.crd_registry
    }

    pub fn dsl_loader(&self) -> &DslLoader {
        &self.dsl_loader
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn set_cache_ttl(&mut self, ttl: Duration) {
        self.cache_ttl = ttl;
    }

    pub fn register_agent_capability(&self, name: impl Into<String>, capability: Arc<dyn AgentCapability>) {
        self.agent_capabilities.insert(name.into(), capability);
    }

    pub fn register_llm_capability(&self, model_key: impl Into<String>, capability: Arc<dyn AgentCapability>) {
        self.llm_capabilities.insert(model_key.into(), capability);
    }

    pub fn register_tool_capability(&self, reference: impl Into<String>, capability: Arc<dyn ToolCapability>) {
        self.tools.register(reference, capability);
    }

    pub fn register_function(&self, name: impl Into<String>, handler: FunctionHandler) {
        self.functions.insert(name.into(), handler);
    }

    /// Save a resource, then reconcile it through the scheduler so every
    /// reconcile pass — user-triggered or controller-internal — shares the
    /// same accounting path. On success, refreshes any live executor the
    /// resource backs and (re)starts its periodic reconcile loop.
    pub async fn add_resource(&self, resource: Resource) -> Result<Resource> {
        let kind = resource.kind.as_str().to_string();
        let namespace = resource.metadata.namespace.clone();
        let name = resource.metadata.name.clone();
        let key = Resource::key_for(&kind, &namespace, &name);
        let existed = self.store.get(&kind, &namespace, &name).await?.is_some();

        let saved = self.store.save(resource).await?;
        let event_verb = if existed { "updated" } else { "created" };
        self.bus.publish(&format!("{kind}.{event_verb}"), json!({ "key": saved.key() }));

        let controller = self.controller_for(&kind);
        let task = reconcile_task(controller, self.store.clone(), self.bus.clone(), self.locks.clone(), self.retry.clone(), kind.clone(), namespace.clone(), name.clone());
        self.scheduler.submit(task).await?;

        let reconciled = self
            .store
            .get(&kind, &namespace, &name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(Resource::key_for(&kind, &namespace, &name)))?;
        self.materialize(&reconciled)?;
        self.spawn_reconcile_loop(key, kind, namespace, name);
        Ok(reconciled)
    }

    /// Start (if not already running) a background loop that re-submits a
    /// reconcile pass for this resource every `reconcile_interval`, backing
    /// off per [`RetryStrategy::next_delay`] after a failed attempt and
    /// resetting to the full interval after a success. Stops itself once the
    /// resource is no longer in the store.
    fn spawn_reconcile_loop(&self, key: String, kind: String, namespace: String, name: String) {
        if let Some(existing) = self.reconcile_tasks.get(&key) {
            if !existing.is_finished() {
                return;
            }
        }
        let controller = self.controller_for(&kind);
        let store = self.store.clone();
        let bus = self.bus.clone();
        let locks = self.locks.clone();
        let retry = self.retry.clone();
        let scheduler = self.scheduler.clone();
        let interval = self.reconcile_interval;
        let loop_key = key.clone();

        let handle = tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                let wait = if attempt == 0 { interval } else { retry.next_delay(attempt) };
                tokio::time::sleep(wait).await;

                match store.get(&kind, &namespace, &name).await {
                    Ok(None) => break,
                    Err(_) => break,
                    Ok(Some(_)) => {}
                }

                let task = reconcile_task(controller.clone(), store.clone(), bus.clone(), locks.clone(), retry.clone(), kind.clone(), namespace.clone(), name.clone());
                match scheduler.submit(task).await {
                    Ok(_) => attempt = 0,
                    Err(e) if e.is_critical() => {
                        warn!(key = %loop_key, error = %e, "critical reconcile error, stopping periodic loop for this resource");
                        break;
                    }
                    Err(e) => {
                        warn!(key = %loop_key, error = %e, "periodic reconcile failed, backing off");
                        attempt = (attempt + 1).min(retry.max_retries);
                    }
                }
            }
        });
        self.reconcile_tasks.insert(key, handle);
    }

    /// Resolve the controller for `kind`: one of the five built-ins, or a
    /// cached [`controllers::CustomResourceController`] for anything else —
    /// its own `validate` is what actually rejects a kind no
    /// `CustomResourceDefinition` has registered, with `UnknownKind`.
    fn controller_for(&self, kind: &str) -> Arc<dyn Controller> {
        if let Some(controller) = self.controllers.get(kind) {
            return controller.clone();
        }
        if let Some(controller) = self.custom_controllers.get(kind) {
            return controller.clone();
        }
        let controller: Arc<dyn Controller> = Arc::new(crate::controllers::CustomResourceController::new(self.crd_registry.clone(), kind.to_string()));
        self.custom_controllers.insert(kind.to_string(), controller.clone());
        controller
    }

    /// Remove a resource: runs its controller's `cleanup`, drops any live
    /// executor backing it, then deletes it from the store.
    pub async fn delete_resource(&self, kind: &str, namespace: &str, name: &str) -> Result<bool> {
        let key = Resource::key_for(kind, namespace, name);
        if let Some(controller) = self.controllers.get(kind) {
            if let Some(resource) = self.store.get(kind, namespace, name).await? {
                controller.cleanup(&resource).await?;
            }
        }
        self.workflows.remove(&key);
        self.networks.remove(&key);
        if let Some((_, handle)) = self.reconcile_tasks.remove(&key) {
            handle.abort();
        }
        let removed = self.store.delete(kind, namespace, name).await?;
        if removed {
            self.bus.publish(&format!("{kind}.deleted"), json!({ "key": key }));
        }
        Ok(removed)
    }

    pub async fn get_resource(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<Resource>> {
        self.store.get(kind, namespace, name).await
    }

    pub async fn list_resources(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Resource>> {
        self.store.list(kind, namespace).await
    }

    /// Rebuild whatever derived state a kind needs beyond its stored spec:
    /// a `Tool`'s resolved callable, a `Workflow`/`Network`'s live executor.
    fn materialize(&self, resource: &Resource) -> Result<()> {
        match resource.kind.as_str() {
            "Tool" => {
                let spec: ToolSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
                if let Some(capability) = self.tools.get(&spec.execute.reference) {
                    self.tools_by_alias.insert(resource.metadata.name.clone(), capability);
                }
            }
            "Workflow" => {
                let spec: WorkflowSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
                self.workflows.insert(resource.key(), Arc::new(WorkflowExecutor::new(spec)));
            }
            "Network" => {
                let spec: NetworkSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
                self.networks.insert(resource.key(), Arc::new(NetworkExecutor::new(spec)));
            }
            _ => {}
        }
        Ok(())
    }

    /// Thin dispatch to a registered agent capability, carrying the
    /// resource's own instructions/model/tool bindings as context.
    pub async fn run_agent(&self, namespace: &str, name: &str, prompt: &str) -> Result<GenerateResult> {
        let resource = self
            .store
            .get("Agent", namespace, name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound(Resource::key_for("Agent", namespace, name)))?;
        let spec: AgentSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        let capability = self.agent_capabilities.get(name).map(|c| c.clone()).ok_or_else(|| Error::AgentNotFound(name.to_string()))?;

        let context = json!({
            "instructions": spec.instructions,
            "model": { "provider": spec.model.provider, "name": spec.model.name, "llmRef": spec.model.llm_ref },
            "tools": spec.tools.keys().collect::<Vec<_>>(),
        });
        capability.generate(prompt, &context).await
    }

    pub async fn call_tool(&self, reference: &str, params: &Value) -> Result<Value> {
        let capability = self.tools.get(reference).ok_or_else(|| Error::ToolNotFound(reference.to_string()))?;
        capability.call(params).await
    }

    pub async fn run_workflow(&self, namespace: &str, name: &str, input: Value) -> Result<WorkflowExecuteResult> {
        let key = Resource::key_for("Workflow", namespace, name);
        let executor = self.workflows.get(&key).map(|e| e.clone()).ok_or_else(|| Error::ResourceNotFound(key))?;
        let ctx = ExecutionContext {
            agents: self.agent_capabilities.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
            tools: self.tools_by_alias.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
            functions: self.functions.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
            cache_ttl: self.cache_ttl,
        };
        Ok(executor.run(input, &ctx).await)
    }

    /// Runs one `generate` against a reconciled network, resolving its
    /// router (by `router.model`) and member roster (by `Kind/name` ref,
    /// same convention `AgentController` uses for tool bindings) fresh each
    /// call so newly registered capabilities are always picked up.
    pub async fn run_network(&self, namespace: &str, name: &str, input: &str, strategy: RoutingStrategy, tracing: bool) -> Result<NetworkExecuteResult> {
        let key = Resource::key_for("Network", namespace, name);
        let executor = self.networks.get(&key).map(|e| e.clone()).ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        let resource = self.store.get("Network", namespace, name).await?.ok_or(Error::ResourceNotFound(key))?;
        let spec: NetworkSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;

        let router = self
            .llm_capabilities
            .get(&spec.router.model)
            .map(|c| c.clone())
            .ok_or_else(|| Error::AgentNotFound(spec.router.model.clone()))?;

        let mut agents: HashMap<String, Arc<dyn AgentCapability>> = HashMap::new();
        for entry in &spec.agents {
            let agent_name = entry.reference.split_once('/').map(|(_, n)| n).unwrap_or(entry.reference.as_str());
            if let Some(capability) = self.agent_capabilities.get(agent_name) {
                agents.insert(entry.name.clone(), capability.clone());
            }
        }

        let ctx = NetworkExecutionContext { router, agents, strategy };
        Ok(executor.generate(input, &ctx, tracing).await)
    }

    pub fn network_state(&self, namespace: &str, name: &str, key: &str) -> Option<Value> {
        self.networks.get(&Resource::key_for("Network", namespace, name))?.get_state(key)
    }

    pub fn set_network_state(&self, namespace: &str, name: &str, key: impl Into<String>, value: Value) {
        if let Some(executor) = self.networks.get(&Resource::key_for("Network", namespace, name)) {
            executor.set_state(key, value);
        }
    }

    /// Stop the scheduler's dispatcher, every resource's periodic reconcile
    /// loop, and release the state store's resources. Does not remove any
    /// reconciled resource.
    pub async fn shutdown(&self) -> Result<()> {
        for entry in self.reconcile_tasks.iter() {
            entry.value().abort();
        }
        self.reconcile_tasks.clear();
        self.scheduler.shutdown().await;
        self.store.close().await
    }
}

/// Build the `scheduler::Task` one reconcile pass submits, shared by
/// user-triggered (`add_resource`), periodic, and event-reactive reconciles
/// so all three go through the same accounting path.
fn reconcile_task(
    controller: Arc<dyn Controller>,
    store: Arc<dyn StateStore>,
    bus: EventBus,
    locks: ReconcileLocks,
    retry: RetryStrategy,
    kind: String,
    namespace: String,
    name: String,
) -> Task {
    let task_id = format!("reconcile-{}", Resource::key_for(&kind, &namespace, &name));
    let resource_key = Resource::key_for(&kind, &namespace, &name);
    let handler: TaskHandler = Box::new(move |_cancel| {
        Box::pin(async move {
            controllers::reconcile(controller.as_ref(), store.as_ref(), &bus, &locks, &retry, &kind, &namespace, &name).await?;
            Ok(Value::Null)
        })
    });
    Task::new(task_id, "reconcile", resource_key, handler).with_priority(Priority::Normal)
}

/// Event-reactive half of §4.7's controller loop: a `<kind>.created|updated|
/// deleted` event re-reconciles every `Agent`/`Workflow`/`Network` in the
/// same namespace, since those are the kinds whose `resolve_dependencies`
/// can newly succeed or fail when a `Tool`/`Llm`/`Agent` they reference
/// changes. Runs detached from the publishing call; best-effort.
fn reconcile_dependents(
    event: &Event,
    store: Arc<dyn StateStore>,
    scheduler: Arc<Scheduler>,
    bus: EventBus,
    locks: ReconcileLocks,
    retry: RetryStrategy,
    controllers: HashMap<&'static str, Arc<dyn Controller>>,
) {
    let Some(changed_kind) = event.topic.split('.').next() else { return };
    let changed_kind = changed_kind.to_string();
    let namespace = event
        .payload
        .get("key")
        .and_then(Value::as_str)
        .and_then(|k| k.split('.').nth(1))
        .unwrap_or("default")
        .to_string();

    tokio::spawn(async move {
        for dependent_kind in ["Agent", "Workflow", "Network"] {
            if dependent_kind == changed_kind {
                continue;
            }
            let Some(controller) = controllers.get(dependent_kind).cloned() else { continue };
            let Ok(resources) = store.list(dependent_kind, Some(&namespace)).await else { continue };
            for resource in resources {
                let task = reconcile_task(
                    controller.clone(),
                    store.clone(),
                    bus.clone(),
                    locks.clone(),
                    retry.clone(),
                    resource.kind.as_str().to_string(),
                    resource.metadata.namespace.clone(),
                    resource.metadata.name.clone(),
                );
                let _ = scheduler.submit(task).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kind, ObjectMeta};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Canned(Value);

    #[async_trait]
    impl AgentCapability for Canned {
        async fn generate(&self, _prompt: &str, _context: &Value) -> Result<GenerateResult> {
            Ok(GenerateResult { raw: self.0.clone() })
        }
    }

    fn tool_resource() -> Resource {
        Resource::new(
            "v1",
            Kind::Tool,
            ObjectMeta::new("adder"),
            json!({ "id": "adder", "execute": { "ref": "builtin.adder" }, "parameters": {} }),
        )
    }

    fn agent_resource() -> Resource {
        Resource::new(
            "v1",
            Kind::Agent,
            ObjectMeta::new("greeter"),
            json!({ "instructions": "Greet the user", "model": { "provider": "openai", "name": "gpt-4" } }),
        )
    }

    struct Adder;

    #[async_trait]
    impl ToolCapability for Adder {
        async fn call(&self, params: &Value) -> Result<Value> {
            let a = params.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = params.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(json!({ "sum": a + b }))
        }
    }

    #[tokio::test]
    async fn add_resource_reconciles_and_run_agent_dispatches_to_its_capability() {
        let runtime = RuntimeManager::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
        runtime.register_agent_capability("greeter", Arc::new(Canned(json!({"text": "hello there"}))));

        let saved = runtime.add_resource(agent_resource()).await.unwrap();
        assert_eq!(saved.status.unwrap().phase, crate::models::Phase::Running);

        let result = runtime.run_agent("default", "greeter", "hi").await.unwrap();
        assert_eq!(result.extract_text(), "hello there");
    }

    #[tokio::test]
    async fn add_resource_materializes_tool_alias_and_call_tool_dispatches() {
        let runtime = RuntimeManager::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
        runtime.register_tool_capability("builtin.adder", Arc::new(Adder));
        runtime.add_resource(tool_resource()).await.unwrap();

        let result = runtime.call_tool("builtin.adder", &json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(result["sum"], 5.0);
    }

    #[tokio::test]
    async fn a_kind_with_no_registered_crd_fails_unknown_kind() {
        let runtime = RuntimeManager::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
        let resource = Resource::new("widgets.example.com/v1", Kind::Custom("Widget".to_string()), ObjectMeta::new("w1"), json!({}));
        assert!(matches!(runtime.add_resource(resource).await, Err(Error::UnknownKind(_))));
    }

    /// Deleting a Tool an Agent depends on should, without any further user
    /// action, knock the Agent from Running to Failed: the `Tool.deleted`
    /// event drives a fresh reconcile that re-runs `resolve_dependencies`
    /// and finds the binding broken.
    #[tokio::test]
    async fn deleting_a_dependency_reconciles_the_dependent_to_failed() {
        let runtime = RuntimeManager::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
        runtime.register_tool_capability("builtin.adder", Arc::new(Adder));
        runtime.add_resource(tool_resource()).await.unwrap();

        let agent = Resource::new(
            "v1",
            Kind::Agent,
            ObjectMeta::new("calculator-agent"),
            json!({
                "instructions": "Do math",
                "model": { "provider": "openai", "name": "gpt-4" },
                "tools": { "add": { "ref": "Tool/adder" } }
            }),
        );
        let saved = runtime.add_resource(agent).await.unwrap();
        assert_eq!(saved.status.unwrap().phase, crate::models::Phase::Running);

        runtime.delete_resource("Tool", "default", "adder").await.unwrap();

        let mut phase = None;
        for _ in 0..50 {
            let current = runtime.get_resource("Agent", "default", "calculator-agent").await.unwrap().unwrap();
            phase = current.status.map(|s| s.phase);
            if phase == Some(crate::models::Phase::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(phase, Some(crate::models::Phase::Failed));
    }

    /// `add_resource` starts exactly one periodic reconcile loop per
    /// resource key, and `delete_resource` tears it down.
    #[tokio::test]
    async fn periodic_reconcile_loop_runs_and_stops_on_delete() {
        let mut runtime = RuntimeManager::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
        runtime.set_reconcile_interval(Duration::from_millis(20));
        runtime.register_tool_capability("builtin.adder", Arc::new(Adder));
        runtime.add_resource(tool_resource()).await.unwrap();

        let key = Resource::key_for("Tool", "default", "adder");
        assert!(runtime.reconcile_tasks.contains_key(&key));
        assert!(!runtime.reconcile_tasks.get(&key).unwrap().is_finished());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!runtime.reconcile_tasks.get(&key).unwrap().is_finished());

        runtime.delete_resource("Tool", "default", "adder").await.unwrap();
        assert!(!runtime.reconcile_tasks.contains_key(&key));
    }
}
