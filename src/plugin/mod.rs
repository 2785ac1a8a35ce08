//! The plugin system: third-party code installs hooks and commands into the
//! running process without the core knowing anything about their internals
//! — the same "opaque callable at the boundary" shape as `AgentCapability`
//! and `ToolCapability`, just registered in bulk by one `init(ctx)` call
//! instead of per-resource.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::event_bus::EventBus;

pub type HookHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
pub type CommandHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A unit of third-party behavior. Identified by a unique id; `init` wires
/// up whatever hooks/commands/config it needs via the context it's handed.
pub trait Plugin: Send + Sync {
    fn id(&self) -> &str;
    fn init(&self, ctx: &PluginContext) -> Result<()>;
    /// Called during `PluginManager::uninstall`, before hooks/commands/config
    /// are torn down. Default no-op.
    fn uninstall(&self, _ctx: &PluginContext) {}
}

/// Handed to a plugin's `init`/`uninstall`. Config keys are namespaced by
/// the plugin's own id so `uninstall` can sweep them without touching other
/// plugins' state.
pub struct PluginContext<'a> {
    plugin_id: String,
    manager: &'a PluginManager,
}

impl<'a> PluginContext<'a> {
    pub fn register_hook(&self, name: impl Into<String>, handler: HookHandler) {
        self.manager.register_hook(&self.plugin_id, name.into(), handler);
    }

    pub fn register_command(&self, name: impl Into<String>, handler: CommandHandler) {
        self.manager.register_command(&self.plugin_id, name.into(), handler);
    }

    pub fn get_config(&self, key: &str) -> Option<Value> {
        self.manager.get_config(&self.plugin_id, key)
    }

    pub fn set_config(&self, key: impl Into<String>, value: Value) {
        self.manager.set_config(&self.plugin_id, key.into(), value);
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.manager.bus
    }
}

#[derive(Default)]
pub struct PluginManager {
    plugins: DashMap<String, Arc<dyn Plugin>>,
    hooks: DashMap<String, Vec<(String, HookHandler)>>,
    commands: DashMap<String, (String, CommandHandler)>,
    config: DashMap<String, Value>,
    bus: EventBus,
}

impl PluginManager {
    pub fn new(bus: EventBus) -> Self {
        Self { bus, ..Default::default() }
    }

    pub fn install(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let id = plugin.id().to_string();
        let ctx = PluginContext { plugin_id: id.clone(), manager: self };
        plugin.init(&ctx)?;
        self.plugins.insert(id, plugin);
        Ok(())
    }

    fn register_hook(&self, plugin_id: &str, name: String, handler: HookHandler) {
        self.hooks.entry(name).or_default().push((plugin_id.to_string(), handler));
    }

    fn register_command(&self, plugin_id: &str, name: String, handler: CommandHandler) {
        self.commands.insert(name, (plugin_id.to_string(), handler));
    }

    fn get_config(&self, plugin_id: &str, key: &str) -> Option<Value> {
        self.config.get(&format!("{plugin_id}:{key}")).map(|v| v.clone())
    }

    fn set_config(&self, plugin_id: &str, key: String, value: Value) {
        self.config.insert(format!("{plugin_id}:{key}"), value);
    }

    /// Pipe `data` through every hook registered for `name`, in registration
    /// order. A hook that errors is skipped — its error is logged and
    /// published on `hook.error` — and the pipeline continues with the
    /// value from before that hook ran.
    pub async fn execute_hook(&self, name: &str, data: Value) -> Value {
        let mut current = data;
        let Some(handlers) = self.hooks.get(name) else {
            return current;
        };
        for (plugin_id, handler) in handlers.value().iter() {
            match handler(current.clone()).await {
                Ok(next) => current = next,
                Err(e) => {
                    tracing::warn!(plugin = %plugin_id, hook = %name, error = %e, "hook failed");
                    self.bus.publish("hook.error", json!({ "plugin": plugin_id, "hook": name, "error": e.to_string() }));
                }
            }
        }
        current
    }

    pub async fn execute_command(&self, name: &str, args: Value) -> Result<Value> {
        let entry = self.commands.get(name).ok_or_else(|| Error::UnknownCommand(name.to_string()))?;
        let (_plugin_id, handler) = entry.value().clone();
        drop(entry);
        handler(args).await
    }

    /// Calls the plugin's own `uninstall`, then strips every hook, command,
    /// and config key it registered, and publishes `plugin.uninstalled`.
    pub fn uninstall(&self, id: &str) {
        if let Some((_, plugin)) = self.plugins.remove(id) {
            let ctx = PluginContext { plugin_id: id.to_string(), manager: self };
            plugin.uninstall(&ctx);
        }
        for mut entry in self.hooks.iter_mut() {
            entry.value_mut().retain(|(pid, _)| pid != id);
        }
        self.commands.retain(|_, (pid, _)| pid != id);
        let prefix = format!("{id}:");
        self.config.retain(|k, _| !k.starts_with(&prefix));
        self.bus.publish("plugin.uninstalled", json!({ "id": id }));
    }
}
