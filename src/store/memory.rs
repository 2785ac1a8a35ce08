// In-memory state store: a DashMap keyed by canonical key, with direct
// callback dispatch to watchers.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{StateStore, WatchEvent, WatchEventKind, WatchHandler, WatchUnsubscribe, WatcherRegistry};
use crate::error::Result;
use crate::models::Resource;

#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, Resource>,
    watchers: WatcherRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<Resource>> {
        let key = Resource::key_for(kind, namespace, name);
        Ok(self.data.get(&key).map(|r| r.clone()))
    }

    async fn save(&self, mut resource: Resource) -> Result<Resource> {
        let key = resource.key();
        resource.metadata.resource_version += 1;
        let kind = resource.kind.as_str().to_string();
        let existed = self.data.contains_key(&key);
        self.data.insert(key.clone(), resource.clone());

        self.watchers.notify(
            &kind,
            WatchEvent {
                kind: if existed {
                    WatchEventKind::Modified
                } else {
                    WatchEventKind::Added
                },
                key,
                resource: Some(resource.clone()),
            },
        );
        Ok(resource)
    }

    async fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<bool> {
        let key = Resource::key_for(kind, namespace, name);
        let removed = self.data.remove(&key);
        let existed = removed.is_some();
        if existed {
            self.watchers.notify(
                kind,
                WatchEvent {
                    kind: WatchEventKind::Deleted,
                    key,
                    resource: removed.map(|(_, r)| r),
                },
            );
        }
        Ok(existed)
    }

    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Resource>> {
        Ok(self
            .data
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.kind.as_str() == kind)
            .filter(|r| namespace.map(|ns| r.metadata.namespace == ns).unwrap_or(true))
            .collect())
    }

    fn watch(&self, kind: &str, handler: WatchHandler) -> WatchUnsubscribe {
        self.watchers.watch(kind, move |e| handler(e))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kind, ObjectMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tool(name: &str) -> Resource {
        Resource::new("mastra/v1", Kind::Tool, ObjectMeta::new(name), serde_json::json!({}))
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = MemoryStore::new();
        let saved = store.save(tool("calc")).await.unwrap();
        let fetched = store.get("Tool", "default", "calc").await.unwrap().unwrap();
        assert_eq!(fetched.metadata.name, saved.metadata.name);
    }

    #[tokio::test]
    async fn added_then_modified_events_fire_in_order() {
        let store = MemoryStore::new();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let e = events.clone();
        let _unsub = store.watch(
            "Tool",
            Arc::new(move |ev: &WatchEvent| e.lock().unwrap().push(ev.kind)),
        );
        store.save(tool("calc")).await.unwrap();
        store.save(tool("calc")).await.unwrap();
        let got = events.lock().unwrap().clone();
        assert_eq!(got, vec![WatchEventKind::Added, WatchEventKind::Modified]);
    }

    #[tokio::test]
    async fn delete_emits_deleted_and_removes() {
        let store = MemoryStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _unsub = store.watch(
            "Tool",
            Arc::new(move |ev: &WatchEvent| {
                if ev.kind == WatchEventKind::Deleted {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        store.save(tool("calc")).await.unwrap();
        assert!(store.delete("Tool", "default", "calc").await.unwrap());
        assert!(!store.delete("Tool", "default", "calc").await.unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
