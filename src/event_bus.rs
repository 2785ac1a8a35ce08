// Process-local topic-based publish/subscribe bus.

//! # Event Bus
//!
//! Synchronous, in-topic-FIFO delivery to a snapshot of subscribers taken
//! before dispatch (so a handler may unsubscribe itself mid-delivery
//! without affecting the event it's currently handling), wildcard
//! `"*.<suffix>"` topics, and per-subscriber panic isolation.
//!
//! Subscribers are expected to return quickly — anything that does real
//! work dispatches to the [`crate::scheduler::Scheduler`] instead of
//! blocking here. There is no backpressure: a slow or wedged subscriber
//! only slows its own topic's dispatch, never the publisher.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

/// A single published event.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    exact: DashMap<String, Vec<Subscription>>,
    /// Keyed by the suffix after `"*."`.
    wildcard: DashMap<String, Vec<Subscription>>,
    next_id: AtomicU64,
}

/// Handle returned from [`EventBus::subscribe`]; call [`Unsubscribe::call`]
/// (or just drop it and call [`EventBus::unsubscribe`] with the id) to stop
/// receiving events.
pub struct Unsubscribe {
    bus: Arc<Inner>,
    is_wildcard: bool,
    key: String,
    id: u64,
}

impl Unsubscribe {
    pub fn call(self) {
        let table = if self.is_wildcard {
            &self.bus.wildcard
        } else {
            &self.bus.exact
        };
        if let Some(mut subs) = table.get_mut(&self.key) {
            subs.retain(|s| s.id != self.id);
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Subscribe a handler to `topic`. `topic` may be a wildcard of the form
    /// `"*.<suffix>"`.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Unsubscribe
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let sub = Subscription {
            id,
            handler: Arc::new(handler),
        };
        if let Some(suffix) = topic.strip_prefix("*.") {
            self.inner
                .wildcard
                .entry(suffix.to_string())
                .or_default()
                .push(sub);
            Unsubscribe {
                bus: self.inner.clone(),
                is_wildcard: true,
                key: suffix.to_string(),
                id,
            }
        } else {
            self.inner
                .exact
                .entry(topic.to_string())
                .or_default()
                .push(sub);
            Unsubscribe {
                bus: self.inner.clone(),
                is_wildcard: false,
                key: topic.to_string(),
                id,
            }
        }
    }

    /// Publish `payload` on `topic`, dispatching synchronously to a
    /// snapshot of matching subscribers in subscription order.
    pub fn publish(&self, topic: &str, payload: Value) {
        let event = Event {
            topic: topic.to_string(),
            payload,
        };

        let mut snapshot: Vec<Handler> = Vec::new();
        if let Some(subs) = self.inner.exact.get(topic) {
            snapshot.extend(subs.iter().map(|s| s.handler.clone()));
        }
        if let Some(dot) = topic.find('.') {
            if dot > 0 {
                let suffix = &topic[dot + 1..];
                if let Some(subs) = self.inner.wildcard.get(suffix) {
                    snapshot.extend(subs.iter().map(|s| s.handler.clone()));
                }
            }
        }

        for handler in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if result.is_err() {
                warn!(topic = %event.topic, "event bus subscriber panicked; isolated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.subscribe("tool.created", move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.subscribe("tool.created", move |_| o2.lock().unwrap().push(2));
        bus.publish("tool.created", serde_json::json!({}));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn wildcard_matches_any_leading_segment() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe("*.created", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("Agent.created", serde_json::json!({}));
        bus.publish("Workflow.created", serde_json::json!({}));
        bus.publish("Workflow.updated", serde_json::json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));
        bus.subscribe("x", |_| panic!("boom"));
        let r = ran.clone();
        bus.subscribe("x", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("x", serde_json::json!(null));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_delivery_stops_future_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        // Subscriber removes itself on first delivery via a shared cell.
        let bus2 = bus.clone();
        let handle: Arc<std::sync::Mutex<Option<Unsubscribe>>> = Arc::new(std::sync::Mutex::new(None));
        let handle2 = handle.clone();
        let c = count.clone();
        let unsub = bus2.subscribe("y", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(u) = handle2.lock().unwrap().take() {
                u.call();
            }
        });
        *handle.lock().unwrap() = Some(unsub);
        bus.publish("y", serde_json::json!(null));
        bus.publish("y", serde_json::json!(null));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
