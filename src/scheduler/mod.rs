//! Priority + concurrency-bounded task executor. Controllers submit their
//! reconcile passes here alongside user-requested work so both share one
//! accounting path: the same metrics, the same per-resource exclusion lock.

mod metrics;

pub use metrics::{MetricsSnapshot, TaskMetrics};

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, Notify, Semaphore};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    Reject,
    Wait,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub max_queue_length: usize,
    pub queue_policy: QueuePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_queue_length: 1000,
            queue_policy: QueuePolicy::Reject,
        }
    }
}

/// Cooperative cancellation signal handed to a running task's handler.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub type TaskHandler = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<Value>> + Send>;

/// A unit of work submitted to the scheduler.
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub priority: Priority,
    pub resource_key: String,
    pub timeout_ms: Option<u64>,
    pub context: Value,
    pub handler: TaskHandler,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, resource_key: impl Into<String>, handler: TaskHandler) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            priority: Priority::Normal,
            resource_key: resource_key.into(),
            timeout_ms: None,
            context: Value::Null,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

struct QueueItem {
    priority: Priority,
    seq: u64,
    task: Task,
    result_tx: oneshot::Sender<Result<Value>>,
    cancel: CancellationToken,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    /// `BinaryHeap` is a max-heap: higher priority pops first, and among
    /// equal priorities the earlier submission (smaller `seq`) pops first —
    /// so `seq` compares in reverse.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    config: SchedulerConfig,
    queue: Mutex<BinaryHeap<QueueItem>>,
    queue_notify: Notify,
    permits: Semaphore,
    resource_locks: DashMap<String, Arc<Mutex<()>>>,
    cancelled_ids: DashMap<String, ()>,
    seq: AtomicU64,
    metrics: TaskMetrics,
    shutting_down: AtomicBool,
}

/// Bounded-concurrency, priority-aware task executor.
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let inner = Arc::new(Inner {
            permits: Semaphore::new(config.max_concurrency),
            queue: Mutex::new(BinaryHeap::new()),
            queue_notify: Notify::new(),
            resource_locks: DashMap::new(),
            cancelled_ids: DashMap::new(),
            seq: AtomicU64::new(0),
            metrics: TaskMetrics::new(),
            shutting_down: AtomicBool::new(false),
            config,
        });
        let dispatcher = inner.clone();
        tokio::spawn(async move { run_dispatcher(dispatcher).await });
        Self { inner }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub async fn submit(&self, task: Task) -> Result<Value> {
        let queue_len = {
            let q = self.inner.queue.lock().await;
            q.len()
        };

        if queue_len >= self.inner.config.max_queue_length {
            match self.inner.config.queue_policy {
                QueuePolicy::Reject => return Err(Error::QueueFull),
                QueuePolicy::Wait => {
                    loop {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        let q = self.inner.queue.lock().await;
                        if q.len() < self.inner.config.max_queue_length {
                            break;
                        }
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let task_type = task.task_type.clone();
        let item = QueueItem {
            priority: task.priority,
            seq,
            task,
            result_tx: tx,
            cancel: CancellationToken::default(),
        };

        {
            let mut q = self.inner.queue.lock().await;
            q.push(item);
        }
        self.inner.metrics.record_submitted(&task_type);
        self.inner.queue_notify.notify_one();

        rx.await.map_err(|_| Error::Internal("task dropped before completion".to_string()))?
    }

    /// Remove a still-pending task from the queue, rejecting it with
    /// `Cancelled`. In-flight tasks cannot be force-cancelled.
    pub fn cancel(&self, task_id: &str) {
        self.inner.cancelled_ids.insert(task_id.to_string(), ());
    }

    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.queue_notify.notify_waiters();
    }
}

async fn run_dispatcher(inner: Arc<Inner>) {
    loop {
        if inner.shutting_down.load(Ordering::SeqCst) {
            let mut q = inner.queue.lock().await;
            while let Some(item) = q.pop() {
                let _ = item.result_tx.send(Err(Error::Cancelled));
            }
            return;
        }

        let item = loop {
            {
                let mut q = inner.queue.lock().await;
                if let Some(item) = q.pop() {
                    break item;
                }
            }
            inner.queue_notify.notified().await;
            if inner.shutting_down.load(Ordering::SeqCst) {
                return;
            }
        };

        if inner.cancelled_ids.remove(&item.task.id).is_some() {
            inner.metrics.record_cancelled();
            let _ = item.result_tx.send(Err(Error::Cancelled));
            continue;
        }

        let permit = match inner.permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };
        let inner2 = inner.clone();
        tokio::spawn(async move {
            run_task(inner2, item).await;
            drop(permit);
        });
    }
}

async fn run_task(inner: Arc<Inner>, item: QueueItem) {
    let QueueItem { task, result_tx, cancel, .. } = item;
    let lock = inner
        .resource_locks
        .entry(task.resource_key.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    let started = std::time::Instant::now();
    let handler = task.handler;
    let fut = handler(cancel.clone());

    let outcome = match task.timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(Error::Timeout)
            }
        },
        None => fut.await,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(_) => inner.metrics.record_completed(&task.task_type, elapsed_ms),
        Err(Error::Timeout) => inner.metrics.record_timeout(&task.task_type, elapsed_ms),
        Err(_) => inner.metrics.record_failed(&task.task_type, elapsed_ms),
    }
    debug!(task_id = %task.id, task_type = %task.task_type, elapsed_ms, "task completed");

    if result_tx.send(outcome).is_err() {
        warn!(task_id = %task.id, "submitter dropped result receiver");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn immediate_handler(value: Value) -> TaskHandler {
        Box::new(move |_cancel| Box::pin(async move { Ok(value) }))
    }

    #[tokio::test]
    async fn runs_submitted_task_and_returns_result() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let task = Task::new("t1", "test", "Tool.default.x", immediate_handler(Value::from(42)));
        let result = scheduler.submit(task).await.unwrap();
        assert_eq!(result, Value::from(42));
    }

    #[tokio::test]
    async fn priority_and_submission_order_determines_completion_order() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig {
            max_concurrency: 1,
            ..SchedulerConfig::default()
        }));
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let o1 = order.clone();
        let a = Task::new(
            "A",
            "test",
            "r1",
            Box::new(move |_c| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    o1.lock().await.push("A");
                    Ok(Value::Null)
                })
            }),
        )
        .with_priority(Priority::Normal);

        let s2 = scheduler.clone();
        let o2 = order.clone();
        let handle_b = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let b = Task::new(
                "B",
                "test",
                "r2",
                Box::new(move |_c| {
                    Box::pin(async move {
                        o2.lock().await.push("B");
                        Ok(Value::Null)
                    })
                }),
            )
            .with_priority(Priority::High);
            s2.submit(b).await.unwrap();
        });

        let s3 = scheduler.clone();
        let o3 = order.clone();
        let handle_c = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let c = Task::new(
                "C",
                "test",
                "r3",
                Box::new(move |_c| {
                    Box::pin(async move {
                        o3.lock().await.push("C");
                        Ok(Value::Null)
                    })
                }),
            )
            .with_priority(Priority::Normal);
            s3.submit(c).await.unwrap();
        });

        scheduler.submit(a).await.unwrap();
        handle_b.await.unwrap();
        handle_c.await.unwrap();

        let final_order = order.lock().await.clone();
        assert_eq!(final_order, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn tasks_on_same_resource_key_never_run_concurrently() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig {
            max_concurrency: 4,
            ..SchedulerConfig::default()
        }));
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let s = scheduler.clone();
            let c = concurrent.clone();
            let m = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let task = Task::new(
                    format!("t{i}"),
                    "test",
                    "Agent.default.shared",
                    Box::new(move |_cancel| {
                        Box::pin(async move {
                            let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                            m.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            c.fetch_sub(1, Ordering::SeqCst);
                            Ok(Value::Null)
                        })
                    }),
                );
                s.submit(task).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queue_full_is_rejected_under_reject_policy() {
        let scheduler = Scheduler::new(SchedulerConfig {
            max_concurrency: 1,
            max_queue_length: 0,
            queue_policy: QueuePolicy::Reject,
        });
        let slow = Task::new(
            "slow",
            "test",
            "r1",
            Box::new(|_c| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(Value::Null)
                })
            }),
        );
        let s2 = Arc::new(scheduler);
        let s3 = s2.clone();
        let handle = tokio::spawn(async move { s3.submit(slow).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = Task::new("second", "test", "r2", immediate_handler(Value::Null));
        let result = s2.submit(second).await;
        assert!(matches!(result, Err(Error::QueueFull)));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn task_exceeding_timeout_fails_with_timeout_error() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let task = Task::new(
            "slow",
            "test",
            "r1",
            Box::new(|_c| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(Value::Null)
                })
            }),
        )
        .with_timeout_ms(20);
        let result = scheduler.submit(task).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
