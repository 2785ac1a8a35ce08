//! The workflow DAG executor: walks a `Workflow.spec` from `initialStep`
//! until `END` (or a step with no `next`), dispatching each step by type and
//! folding every attempt into a history. A run never propagates an error —
//! failures become a `Failed`/`Timeout` [`WorkflowExecuteResult`] instead.

mod history;
mod template;

pub use history::{ExecutionStatus, StepExecutionRecord, StepStatus, WorkflowExecuteResult};

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use serde_json::{json, Value};

use crate::agent_capability::AgentCapability;
use crate::error::{Error, Result};
use crate::models::{NextSpec, StepDef, StepType, WorkflowSpec};
use crate::tool_capability::ToolCapability;

/// An opaque callable a `function` step invokes by name — registered by the
/// embedding application, the same pattern as [`AgentCapability`] and
/// [`ToolCapability`].
pub type FunctionHandler = Arc<dyn Fn(Value, HashMap<String, Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

const MAX_STEPS_PER_RUN: usize = 10_000;

/// Everything a [`WorkflowExecutor`] needs from the outside world to run one
/// workflow: resolved capabilities keyed by the alias a step references them
/// by, plus the per-run cache's time-to-live.
#[derive(Clone)]
pub struct ExecutionContext {
    pub agents: HashMap<String, Arc<dyn AgentCapability>>,
    pub tools: HashMap<String, Arc<dyn ToolCapability>>,
    pub functions: HashMap<String, FunctionHandler>,
    pub cache_ttl: Duration,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            agents: HashMap::new(),
            tools: HashMap::new(),
            functions: HashMap::new(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

pub struct WorkflowExecutor {
    spec: WorkflowSpec,
}

impl WorkflowExecutor {
    pub fn new(spec: WorkflowSpec) -> Self {
        Self { spec }
    }

    /// Run the DAG to completion (or failure). State is entirely local to
    /// this call — nothing here is shared with a previous or later `run`.
    pub async fn run(&self, input: Value, ctx: &ExecutionContext) -> WorkflowExecuteResult {
        let mut variables: HashMap<String, Value> = HashMap::new();
        variables.insert("input".to_string(), input);
        let mut step_results: HashMap<String, Value> = HashMap::new();
        let mut cache: HashMap<String, (Value, Instant)> = HashMap::new();
        let mut history = Vec::new();
        let mut output = Value::Null;

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(self.spec.initial_step.clone());
        let mut steps_run = 0usize;

        while let Some(step_id) = queue.pop_front() {
            if step_id == crate::models::END {
                continue;
            }
            steps_run += 1;
            if steps_run > MAX_STEPS_PER_RUN {
                return WorkflowExecuteResult::failed(history, output, "exceeded maximum step count (possible cycle)");
            }

            let Some(step) = self.spec.step(&step_id) else {
                return WorkflowExecuteResult::failed(history, output, format!("step not found: {step_id}"));
            };

            let outcome = self.run_node(step, &step_id, ctx, variables, step_results, cache).await;
            history.extend(outcome.history);
            variables = outcome.variables;
            step_results = outcome.step_results;
            cache = outcome.cache;

            match outcome.failure {
                // A step timeout aborts the run with an overall `Failed` status; the
                // step's own record is what carries `status=timeout`.
                Some(NodeFailure::Timeout(msg)) => return WorkflowExecuteResult::failed(history, output, msg),
                Some(NodeFailure::Failed(msg)) => return WorkflowExecuteResult::failed(history, output, msg),
                None => {}
            }

            output = outcome.value.clone();
            if let Some(target) = resolve_next(step, &outcome.value) {
                match target {
                    NextTarget::One(id) => queue.push_back(id),
                    NextTarget::Many(ids) => queue.extend(ids),
                }
            }
        }

        WorkflowExecuteResult::completed(history, output)
    }

    /// Run one step (input construction, cache check, timeout+retry,
    /// output-variable extraction) and, for `parallel` steps, recurse into
    /// its sub-steps. Boxed because it recurses through an async fn.
    fn run_node<'a>(
        &'a self,
        step: &'a StepDef,
        full_id: &'a str,
        ctx: &'a ExecutionContext,
        variables: HashMap<String, Value>,
        step_results: HashMap<String, Value>,
        cache: HashMap<String, (Value, Instant)>,
    ) -> Pin<Box<dyn Future<Output = NodeOutcome> + Send + 'a>> {
        Box::pin(async move {
            let mut history = Vec::new();
            let template_ctx = build_template_ctx(&variables, &step_results);

            let input = match build_input(step, &variables, &template_ctx) {
                Ok(v) => v,
                Err(e) => {
                    let now = Utc::now();
                    history.push(record(full_id, 1, StepStatus::Failed, now, now, None, Some(e.to_string()), false));
                    return NodeOutcome { value: Value::Null, history, variables, step_results, cache, failure: Some(NodeFailure::Failed(e.to_string())) };
                }
            };

            let cacheable = step.cacheable != Some(false);
            let key = cache_key(&step.id, &input);
            let mut cache = cache;
            if cacheable {
                if let Some((cached_value, inserted)) = cache.get(&key).cloned() {
                    if inserted.elapsed() < ctx.cache_ttl {
                        let now = Utc::now();
                        history.push(record(full_id, 1, StepStatus::Completed, now, now, Some(cached_value.clone()), None, true));
                        let (variables, step_results) = apply_output(step, &cached_value, variables, step_results);
                        return NodeOutcome { value: cached_value, history, variables, step_results, cache, failure: None };
                    }
                    cache.remove(&key);
                }
            }

            let max_retries = step.retries.unwrap_or(0);
            let retry_delay = Duration::from_millis(step.retry_delay_ms.unwrap_or(0));
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;
                let started = Utc::now();
                let fut = self.dispatch(step, full_id, ctx, variables.clone(), step_results.clone(), cache.clone(), &input, &template_ctx);

                let timed = match step.timeout_ms {
                    Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut).await,
                    None => Ok(fut.await),
                };

                match timed {
                    Err(_elapsed) => {
                        let ended = Utc::now();
                        history.push(record(full_id, attempt, StepStatus::Timeout, started, ended, None, Some("step timed out".to_string()), false));
                        return NodeOutcome {
                            value: Value::Null,
                            history,
                            variables,
                            step_results,
                            cache,
                            failure: Some(NodeFailure::Timeout(format!("step {full_id} timed out"))),
                        };
                    }
                    Ok(Ok(dispatched)) => {
                        let ended = Utc::now();
                        history.push(record(full_id, attempt, StepStatus::Completed, started, ended, Some(dispatched.value.clone()), None, false));
                        history.extend(dispatched.extra_history);
                        let mut cache = dispatched.cache;
                        if cacheable {
                            cache.insert(key.clone(), (dispatched.value.clone(), Instant::now()));
                        }
                        let (variables, step_results) = apply_output(step, &dispatched.value, dispatched.variables, dispatched.step_results);
                        return NodeOutcome { value: dispatched.value, history, variables, step_results, cache, failure: None };
                    }
                    Ok(Err(e)) => {
                        let ended = Utc::now();
                        history.push(record(full_id, attempt, StepStatus::Failed, started, ended, None, Some(e.to_string()), false));
                        if attempt <= max_retries {
                            if !retry_delay.is_zero() {
                                tokio::time::sleep(retry_delay).await;
                            }
                            continue;
                        }
                        return NodeOutcome { value: Value::Null, history, variables, step_results, cache, failure: Some(NodeFailure::Failed(e.to_string())) };
                    }
                }
            }
        })
    }

    /// Perform the actual step work for one attempt — no retry/timeout/cache
    /// bookkeeping here, that's `run_node`'s job.
    fn dispatch<'a>(
        &'a self,
        step: &'a StepDef,
        full_id: &'a str,
        ctx: &'a ExecutionContext,
        variables: HashMap<String, Value>,
        step_results: HashMap<String, Value>,
        cache: HashMap<String, (Value, Instant)>,
        input: &'a Value,
        template_ctx: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<DispatchOutcome>> + Send + 'a>> {
        Box::pin(async move {
            match step.type_ {
                StepType::Agent => {
                    let alias = step.agent.as_deref().ok_or_else(|| Error::ValidationFailed(format!("step {} missing agent reference", step.id)))?;
                    let capability = ctx.agents.get(alias).ok_or_else(|| Error::AgentNotFound(alias.to_string()))?;
                    let prompt = derive_prompt(input);
                    let result = capability.generate(&prompt, template_ctx).await?;
                    Ok(DispatchOutcome { value: Value::String(result.extract_text()), variables, step_results, cache, extra_history: Vec::new() })
                }
                StepType::Tool => {
                    let alias = step.tool.as_deref().ok_or_else(|| Error::ValidationFailed(format!("step {} missing tool reference", step.id)))?;
                    let capability = ctx.tools.get(alias).ok_or_else(|| Error::ToolNotFound(alias.to_string()))?;
                    let value = capability.call(input).await?;
                    Ok(DispatchOutcome { value, variables, step_results, cache, extra_history: Vec::new() })
                }
                StepType::Function => {
                    let name = step.function.as_deref().ok_or_else(|| Error::ValidationFailed(format!("step {} missing function reference", step.id)))?;
                    let handler = ctx.functions.get(name).ok_or_else(|| Error::StepNotFound(format!("unregistered function: {name}")))?;
                    let value = handler(input.clone(), variables.clone()).await?;
                    Ok(DispatchOutcome { value, variables, step_results, cache, extra_history: Vec::new() })
                }
                StepType::Condition => {
                    let predicate = step.predicate.as_deref().unwrap_or("true");
                    let result = template::evaluate_predicate(predicate, template_ctx)?;
                    Ok(DispatchOutcome { value: Value::Bool(result), variables, step_results, cache, extra_history: Vec::new() })
                }
                StepType::Parallel => {
                    let sub_futures = step.steps.iter().map(|sub| {
                        let variables = variables.clone();
                        let step_results = step_results.clone();
                        let cache = cache.clone();
                        async move {
                            let sub_id = format!("{full_id}.{}", sub.id);
                            self.run_node(sub, &sub_id, ctx, variables, step_results, cache).await
                        }
                    });
                    let results = join_all(sub_futures).await;

                    let mut merged_vars = variables;
                    let mut merged_results = step_results;
                    let mut merged_cache = cache;
                    let mut extra_history = Vec::new();
                    let mut values = Vec::with_capacity(results.len());
                    let mut first_failure: Option<String> = None;

                    for outcome in results {
                        extra_history.extend(outcome.history);
                        merged_vars.extend(outcome.variables);
                        merged_results.extend(outcome.step_results);
                        merged_cache.extend(outcome.cache);
                        values.push(outcome.value);
                        if first_failure.is_none() {
                            if let Some(failure) = outcome.failure {
                                first_failure = Some(failure.message().to_string());
                            }
                        }
                    }

                    if let Some(msg) = first_failure {
                        return Err(Error::Internal(msg));
                    }

                    Ok(DispatchOutcome { value: Value::Array(values), variables: merged_vars, step_results: merged_results, cache: merged_cache, extra_history })
                }
            }
        })
    }
}

struct DispatchOutcome {
    value: Value,
    variables: HashMap<String, Value>,
    step_results: HashMap<String, Value>,
    cache: HashMap<String, (Value, Instant)>,
    extra_history: Vec<StepExecutionRecord>,
}

struct NodeOutcome {
    value: Value,
    history: Vec<StepExecutionRecord>,
    variables: HashMap<String, Value>,
    step_results: HashMap<String, Value>,
    cache: HashMap<String, (Value, Instant)>,
    failure: Option<NodeFailure>,
}

enum NodeFailure {
    Failed(String),
    Timeout(String),
}

impl NodeFailure {
    fn message(&self) -> &str {
        match self {
            NodeFailure::Failed(m) | NodeFailure::Timeout(m) => m,
        }
    }
}

enum NextTarget {
    One(String),
    Many(Vec<String>),
}

fn resolve_next(step: &StepDef, result: &Value) -> Option<NextTarget> {
    match step.next.as_ref()? {
        NextSpec::Single(id) if id == crate::models::END => None,
        NextSpec::Single(id) => Some(NextTarget::One(id.clone())),
        NextSpec::Sequence(ids) => {
            let filtered: Vec<String> = ids.iter().filter(|id| id.as_str() != crate::models::END).cloned().collect();
            if filtered.is_empty() {
                None
            } else {
                Some(NextTarget::Many(filtered))
            }
        }
        NextSpec::Conditional(map) => {
            let key = match result.as_bool() {
                Some(true) => "true",
                Some(false) => "false",
                None => return None,
            };
            map.get(key).filter(|id| id.as_str() != crate::models::END).cloned().map(NextTarget::One)
        }
    }
}

fn apply_output(step: &StepDef, value: &Value, mut variables: HashMap<String, Value>, mut step_results: HashMap<String, Value>) -> (HashMap<String, Value>, HashMap<String, Value>) {
    step_results.insert(step.id.clone(), value.clone());
    for (var_name, path) in &step.output {
        if let Some(v) = template::extract_path(value, path) {
            variables.insert(var_name.clone(), v);
        }
    }
    (variables, step_results)
}

fn build_template_ctx(variables: &HashMap<String, Value>, step_results: &HashMap<String, Value>) -> Value {
    let steps: serde_json::Map<String, Value> = step_results.iter().map(|(k, v)| (k.clone(), json!({ "result": v }))).collect();
    json!({
        "workflow": { "input": variables.get("input").cloned().unwrap_or(Value::Null) },
        "step": Value::Object(steps),
        "context": Value::Object(Default::default()),
    })
}

fn build_input(step: &StepDef, variables: &HashMap<String, Value>, template_ctx: &Value) -> Result<Value> {
    if step.input.is_empty() {
        return Ok(Value::Null);
    }
    let mut map = serde_json::Map::new();
    for (k, source) in &step.input {
        map.insert(k.clone(), template::resolve_input_value(source, variables, template_ctx)?);
    }
    Ok(Value::Object(map))
}

fn derive_prompt(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            for key in ["prompt", "message", "text", "input"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return s.clone();
                }
            }
            input.to_string()
        }
        other => other.to_string(),
    }
}

fn cache_key(step_id: &str, input: &Value) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    step_id.hash(&mut hasher);
    serde_json::to_string(input).unwrap_or_default().hash(&mut hasher);
    format!("{step_id}:{:x}", hasher.finish())
}

#[allow(clippy::too_many_arguments)]
fn record(step_id: &str, attempt: u32, status: StepStatus, started: DateTime<Utc>, ended: DateTime<Utc>, result: Option<Value>, error: Option<String>, from_cache: bool) -> StepExecutionRecord {
    StepExecutionRecord {
        step_id: step_id.to_string(),
        attempt,
        status,
        started_at: started,
        ended_at: ended,
        duration_ms: (ended - started).num_milliseconds(),
        result,
        error,
        from_cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_handler<F>(f: F) -> FunctionHandler
    where
        F: Fn(Value, HashMap<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Arc::new(move |input, vars| {
            let result = f(input, vars);
            Box::pin(async move { result }) as BoxFuture<'static, Result<Value>>
        })
    }

    #[tokio::test]
    async fn linear_workflow_runs_function_steps_to_completion() {
        let spec: WorkflowSpec = serde_yaml::from_str(
            r#"
initialStep: s1
steps:
  - id: s1
    type: function
    function: double
    output:
      doubled: doubled
    next: END
"#,
        )
        .unwrap();
        let mut ctx = ExecutionContext::default();
        ctx.functions.insert(
            "double".to_string(),
            make_handler(|_input, _vars| Ok(json!({ "doubled": 84 }))),
        );

        let result = WorkflowExecutor::new(spec).run(json!({"n": 42}), &ctx).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output, json!({"doubled": 84}));
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn condition_step_branches_on_predicate() {
        let spec: WorkflowSpec = serde_yaml::from_str(
            r#"
initialStep: check
steps:
  - id: check
    type: condition
    predicate: "workflow.input.x > 10"
    next:
      "true": big
      "false": small
  - id: big
    type: function
    function: label
    input:
      which: "big"
    next: END
  - id: small
    type: function
    function: label
    input:
      which: "small"
    next: END
"#,
        )
        .unwrap();
        let mut ctx = ExecutionContext::default();
        ctx.functions.insert("label".to_string(), make_handler(|input, _vars| Ok(input)));

        let result = WorkflowExecutor::new(spec).run(json!({"x": 20}), &ctx).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output, json!({"which": "big"}));
        assert_eq!(result.history.iter().filter(|r| r.step_id == "small").count(), 0);
    }

    #[tokio::test]
    async fn step_timeout_is_recorded_without_retry() {
        let spec: WorkflowSpec = serde_yaml::from_str(
            r#"
initialStep: slow
steps:
  - id: slow
    type: function
    function: sleepy
    timeout: 5
    retries: 3
    next: END
"#,
        )
        .unwrap();
        let mut ctx = ExecutionContext::default();
        ctx.functions.insert(
            "sleepy".to_string(),
            Arc::new(|_input, _vars| Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Value::Null)
            }) as BoxFuture<'static, Result<Value>>),
        );

        let result = WorkflowExecutor::new(spec).run(Value::Null, &ctx).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].status, StepStatus::Timeout);
        assert_eq!(result.history[0].attempt, 1);
    }

    #[tokio::test]
    async fn failing_step_retries_then_fails() {
        let spec: WorkflowSpec = serde_yaml::from_str(
            r#"
initialStep: flaky
steps:
  - id: flaky
    type: function
    function: alwaysFails
    retries: 2
    next: END
"#,
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut ctx = ExecutionContext::default();
        ctx.functions.insert(
            "alwaysFails".to_string(),
            Arc::new(move |_input, _vars| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Err(Error::Internal("boom".to_string())) }) as BoxFuture<'static, Result<Value>>
            }),
        );

        let result = WorkflowExecutor::new(spec).run(Value::Null, &ctx).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.history.len(), 3);
        assert!(result.history.iter().all(|r| r.status == StepStatus::Failed));
    }

    #[tokio::test]
    async fn parallel_step_runs_substeps_and_merges_history() {
        let spec: WorkflowSpec = serde_yaml::from_str(
            r#"
initialStep: fanout
steps:
  - id: fanout
    type: parallel
    steps:
      - id: left
        type: function
        function: echoLeft
      - id: right
        type: function
        function: echoRight
    next: END
"#,
        )
        .unwrap();
        let mut ctx = ExecutionContext::default();
        ctx.functions.insert("echoLeft".to_string(), make_handler(|_i, _v| Ok(json!("L"))));
        ctx.functions.insert("echoRight".to_string(), make_handler(|_i, _v| Ok(json!("R"))));

        let result = WorkflowExecutor::new(spec).run(Value::Null, &ctx).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output, json!(["L", "R"]));
        assert!(result.history.iter().any(|r| r.step_id == "fanout.left"));
        assert!(result.history.iter().any(|r| r.step_id == "fanout.right"));
    }

    #[tokio::test]
    async fn cache_is_scoped_to_a_single_run() {
        let spec: WorkflowSpec = serde_yaml::from_str(
            r#"
initialStep: counted
steps:
  - id: counted
    type: function
    function: incr
    next: END
"#,
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut ctx = ExecutionContext::default();
        ctx.functions.insert(
            "incr".to_string(),
            Arc::new(move |_input, _vars| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Ok(Value::Null) }) as BoxFuture<'static, Result<Value>>
            }),
        );

        let executor = WorkflowExecutor::new(spec);
        executor.run(Value::Null, &ctx).await;
        executor.run(Value::Null, &ctx).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
