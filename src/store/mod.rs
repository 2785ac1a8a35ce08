// Abstract CRUD + watch contract over typed resources, plus the shared
// watcher-dispatch plumbing every backend uses.

//! # State Store
//!
//! `get`/`save`/`delete`/`list`/`watch` over resources keyed by
//! `(kind, namespace, name)`. Three backends are provided: [`memory`]
//! (direct callback dispatch), [`file`] (one JSON file per resource, atomic
//! write-temp + rename) and [`journaled`] (single JSON document, throttled
//! flush). All three share [`WatcherRegistry`] so watch semantics (ADDED
//! precedes MODIFIED of the same key, DELETED terminates a key's stream,
//! at-least-once delivery for changes made after subscription) are
//! implemented once.

pub mod file;
pub mod journaled;
pub mod memory;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::models::Resource;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    pub resource: Option<Resource>,
}

pub type WatchHandler = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

/// Unsubscribe handle for [`WatcherRegistry::watch`].
pub struct WatchUnsubscribe {
    registry: Arc<WatcherRegistryInner>,
    resource_kind: String,
    id: u64,
}

impl WatchUnsubscribe {
    pub fn call(self) {
        if let Some(mut subs) = self.registry.subs.get_mut(&self.resource_kind) {
            subs.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Default)]
struct WatcherRegistryInner {
    subs: DashMap<String, Vec<(u64, WatchHandler)>>,
    next_id: AtomicU64,
}

/// Shared per-kind watcher dispatch used by every store backend.
#[derive(Clone, Default)]
pub struct WatcherRegistry {
    inner: Arc<WatcherRegistryInner>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch<F>(&self, resource_kind: &str, handler: F) -> WatchUnsubscribe
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subs
            .entry(resource_kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        WatchUnsubscribe {
            registry: self.inner.clone(),
            resource_kind: resource_kind.to_string(),
            id,
        }
    }

    /// Dispatch in subscription order, snapshotting first (same rationale
    /// as `EventBus::publish`).
    pub fn notify(&self, resource_kind: &str, event: WatchEvent) {
        if let Some(subs) = self.inner.subs.get(resource_kind) {
            let snapshot: Vec<WatchHandler> = subs.iter().map(|(_, h)| h.clone()).collect();
            drop(subs);
            for handler in snapshot {
                handler(&event);
            }
        }
    }
}

/// The storage contract every backend implements.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<Resource>>;
    async fn save(&self, resource: Resource) -> Result<Resource>;
    async fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<bool>;
    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Resource>>;
    /// Subscribe to ADDED/MODIFIED/DELETED events for `kind`. Takes an
    /// already-boxed handler (`Arc<dyn Fn...>`) rather than a generic `F` so
    /// the trait stays object-safe and callers can hold `Arc<dyn
    /// StateStore>` and swap backends at runtime.
    fn watch(&self, kind: &str, handler: WatchHandler) -> WatchUnsubscribe;
    /// Flush any buffered state and release resources. A no-op for purely
    /// in-memory backends.
    async fn close(&self) -> Result<()>;
}
