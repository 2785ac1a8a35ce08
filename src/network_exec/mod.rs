//! The multi-agent network executor: a router capability (or an algorithmic
//! strategy standing in for one) dispatches to member agents, with optional
//! tracing of every call made along the way.
//!
//! `Default` strategy hands the routing decision to the router capability's
//! own reasoning and lets it keep delegating (up to `maxSteps`) until it
//! answers without naming another agent. The algorithmic strategies
//! (`RoundRobin`, `HistoryBased`, `SemanticMatching`, `Custom`) pick the
//! agent themselves and dispatch exactly one hop — a router call recording
//! the decision, then the chosen agent's response is the answer.

mod state;
mod strategy;
mod trace;

pub use state::NetworkState;
pub use strategy::{CustomSelector, RoutingStrategy};
pub use trace::{NetworkExecuteResult, TraceRecord, TraceSummary};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agent_capability::AgentCapability;
use crate::models::NetworkSpec;

use strategy::RoutingState;

pub struct NetworkExecutionContext {
    pub router: Arc<dyn AgentCapability>,
    pub agents: HashMap<String, Arc<dyn AgentCapability>>,
    pub strategy: RoutingStrategy,
}

pub struct NetworkExecutor {
    spec: NetworkSpec,
    state: Mutex<NetworkState>,
    routing: RoutingState,
}

impl NetworkExecutor {
    pub fn new(spec: NetworkSpec) -> Self {
        let ttl = spec.state.as_ref().and_then(|s| s.ttl).map(Duration::from_millis);
        Self { spec, state: Mutex::new(NetworkState::new(ttl)), routing: RoutingState::default() }
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.lock().unwrap().get(key)
    }

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.state.lock().unwrap().set(key, value);
    }

    pub async fn generate(&self, input: &str, ctx: &NetworkExecutionContext, tracing: bool) -> NetworkExecuteResult {
        let mut trace = Vec::new();
        let answer = match &ctx.strategy {
            RoutingStrategy::Default => self.run_default_loop(input, ctx, &mut trace).await,
            _ => self.run_single_hop(input, ctx, &mut trace).await,
        };

        let steps = trace.len() as u32;
        let trace_summary = tracing.then(|| trace::summarize(&trace));
        let trace = tracing.then_some(trace);
        NetworkExecuteResult { answer, steps, trace, trace_summary }
    }

    async fn run_single_hop(&self, input: &str, ctx: &NetworkExecutionContext, trace: &mut Vec<TraceRecord>) -> String {
        let snapshot = self.state.lock().unwrap().snapshot();
        let Some(alias) = self.routing.select(&ctx.strategy, &self.spec.agents, input, &snapshot) else {
            return "no agent available to route to".to_string();
        };

        let now = Utc::now();
        trace.push(TraceRecord {
            id: Uuid::new_v4().to_string(),
            step: 1,
            agent_id: None,
            input: json!(input),
            output: json!({ "routedTo": alias }),
            start_time: now,
            end_time: now,
            latency_ms: 0,
            is_router_call: true,
            state_changes: Vec::new(),
        });

        let Some(capability) = ctx.agents.get(&alias) else {
            return format!("no capability registered for agent '{alias}'");
        };

        let agent_ctx = self.call_context(&alias);
        let started = Utc::now();
        let start_instant = Instant::now();
        let result = capability.generate(input, &agent_ctx).await;
        let ended = Utc::now();
        let latency = start_instant.elapsed().as_millis() as i64;

        match result {
            Ok(generated) => {
                self.routing.record_call(&alias, latency, false);
                let state_changes = self.apply_state_patch(&generated.raw);
                let text = generated.extract_text();
                trace.push(TraceRecord {
                    id: Uuid::new_v4().to_string(),
                    step: 2,
                    agent_id: Some(alias),
                    input: json!(input),
                    output: json!(text),
                    start_time: started,
                    end_time: ended,
                    latency_ms: latency,
                    is_router_call: false,
                    state_changes,
                });
                text
            }
            Err(e) => {
                self.routing.record_call(&alias, latency, true);
                format!("agent '{alias}' failed: {e}")
            }
        }
    }

    async fn run_default_loop(&self, input: &str, ctx: &NetworkExecutionContext, trace: &mut Vec<TraceRecord>) -> String {
        let mut current_message = input.to_string();
        let max_steps = self.spec.router.max_steps;
        let mut step = 0u32;

        loop {
            step += 1;
            if step > max_steps {
                return current_message;
            }

            let router_ctx = self.router_context(&current_message, trace);
            let started = Utc::now();
            let start_instant = Instant::now();
            let result = ctx.router.generate(&current_message, &router_ctx).await;
            let ended = Utc::now();
            let latency = start_instant.elapsed().as_millis() as i64;

            let generated = match result {
                Ok(g) => g,
                Err(e) => return format!("router error: {e}"),
            };
            let state_changes = self.apply_state_patch(&generated.raw);
            trace.push(TraceRecord {
                id: Uuid::new_v4().to_string(),
                step,
                agent_id: None,
                input: json!(current_message),
                output: generated.raw.clone(),
                start_time: started,
                end_time: ended,
                latency_ms: latency,
                is_router_call: true,
                state_changes,
            });

            match route_decision_from(&generated.raw) {
                Some((alias, message)) => {
                    let Some(capability) = ctx.agents.get(&alias) else {
                        return format!("no capability registered for agent '{alias}'");
                    };
                    let agent_ctx = self.call_context(&alias);
                    let a_started = Utc::now();
                    let a_start_instant = Instant::now();
                    let a_result = capability.generate(&message, &agent_ctx).await;
                    let a_ended = Utc::now();
                    let a_latency = a_start_instant.elapsed().as_millis() as i64;
                    match a_result {
                        Ok(agent_generated) => {
                            self.routing.record_call(&alias, a_latency, false);
                            let agent_state_changes = self.apply_state_patch(&agent_generated.raw);
                            let text = agent_generated.extract_text();
                            trace.push(TraceRecord {
                                id: Uuid::new_v4().to_string(),
                                step,
                                agent_id: Some(alias),
                                input: json!(message),
                                output: json!(text),
                                start_time: a_started,
                                end_time: a_ended,
                                latency_ms: a_latency,
                                is_router_call: false,
                                state_changes: agent_state_changes,
                            });
                            current_message = text;
                        }
                        Err(e) => {
                            self.routing.record_call(&alias, a_latency, true);
                            return format!("agent '{alias}' failed: {e}");
                        }
                    }
                }
                None => return generated.extract_text(),
            }
        }
    }

    fn apply_state_patch(&self, raw: &Value) -> Vec<String> {
        let Some(patch) = raw.get("statePatch").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut state = self.state.lock().unwrap();
        let mut changed = Vec::new();
        for (k, v) in patch {
            state.set(k.clone(), v.clone());
            changed.push(k.clone());
        }
        changed
    }

    fn roster(&self) -> Value {
        Value::Array(self.spec.agents.iter().map(|a| json!({ "alias": a.name, "role": a.role, "specialties": a.specialties })).collect())
    }

    fn router_context(&self, message: &str, trace_so_far: &[TraceRecord]) -> Value {
        json!({
            "instructions": self.spec.instructions,
            "agents": self.roster(),
            "state": self.state.lock().unwrap().snapshot(),
            "message": message,
            "trace": trace_so_far,
        })
    }

    fn call_context(&self, alias: &str) -> Value {
        json!({
            "network": self.spec.instructions,
            "agent": alias,
            "state": self.state.lock().unwrap().snapshot(),
        })
    }
}

/// The router's own routing decision, recognized from its structured
/// output: `{"routeTo": "<alias>", "message": "<text>"}`. Anything else is
/// treated as a final answer.
fn route_decision_from(raw: &Value) -> Option<(String, String)> {
    let alias = raw.get("routeTo").and_then(Value::as_str)?.to_string();
    let message = raw.get("message").and_then(Value::as_str)?.to_string();
    Some((alias, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_capability::GenerateResult;
    use async_trait::async_trait;

    struct Canned(Value);

    #[async_trait]
    impl AgentCapability for Canned {
        async fn generate(&self, _prompt: &str, _context: &Value) -> crate::error::Result<GenerateResult> {
            Ok(GenerateResult { raw: self.0.clone() })
        }
    }

    fn network_spec() -> NetworkSpec {
        serde_yaml::from_str(
            r#"
instructions: "Route support tickets"
agents:
  - name: technical
    ref: Agent/technical-agent
    specialties: [hardware, software]
  - name: billing
    ref: Agent/billing-agent
    specialties: [payment, refund]
router:
  model: openai/gpt-4
  maxSteps: 5
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn semantic_matching_routes_to_billing_in_one_hop() {
        let executor = NetworkExecutor::new(network_spec());
        let mut agents: HashMap<String, Arc<dyn AgentCapability>> = HashMap::new();
        agents.insert("technical".into(), Arc::new(Canned(json!({"text": "reset your router"}))));
        agents.insert("billing".into(), Arc::new(Canned(json!({"text": "refund issued"}))));
        let ctx = NetworkExecutionContext { router: Arc::new(Canned(Value::Null)), agents, strategy: RoutingStrategy::SemanticMatching };

        let result = executor.generate("my payment was not processed", &ctx, true).await;
        assert_eq!(result.answer, "refund issued");
        let trace = result.trace.unwrap();
        assert_eq!(trace.len(), 2);
        assert!(trace[0].is_router_call);
        assert_eq!(trace[1].agent_id.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn default_strategy_follows_router_delegation_then_stops() {
        let executor = NetworkExecutor::new(network_spec());
        let mut agents: HashMap<String, Arc<dyn AgentCapability>> = HashMap::new();
        agents.insert("billing".into(), Arc::new(Canned(json!({"text": "refund issued"}))));
        let router = Canned(json!({"routeTo": "billing", "message": "please help with a refund"}));
        let ctx = NetworkExecutionContext { router: Arc::new(router), agents, strategy: RoutingStrategy::Default };

        let result = executor.generate("I want a refund", &ctx, true).await;
        assert_eq!(result.answer, "refund issued");
        assert_eq!(result.steps, 2);
    }

    #[tokio::test]
    async fn default_strategy_terminates_when_router_answers_directly() {
        let executor = NetworkExecutor::new(network_spec());
        let router = Canned(json!({"text": "here is the answer"}));
        let ctx = NetworkExecutionContext { router: Arc::new(router), agents: HashMap::new(), strategy: RoutingStrategy::Default };

        let result = executor.generate("what time is it", &ctx, false).await;
        assert_eq!(result.answer, "here is the answer");
        assert_eq!(result.steps, 1);
        assert!(result.trace.is_none());
    }
}
