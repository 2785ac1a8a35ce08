// Journaled state store: a single JSON document holding the full resource
// set, backed by an in-memory cache and a throttled background flush.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::warn;

use super::{WatchEvent, WatchEventKind, WatchHandler, WatchUnsubscribe, WatcherRegistry};
use crate::error::Result;
use crate::models::Resource;
use crate::store::StateStore;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

struct Inner {
    db_path: PathBuf,
    cache: DashMap<String, Resource>,
    watchers: WatcherRegistry,
    dirty: AtomicBool,
    shutdown: Notify,
    shutdown_ack: Notify,
}

pub struct JournaledStore {
    inner: Arc<Inner>,
}

impl JournaledStore {
    /// Open (or create) the journal at `db_path`. A corrupt existing file
    /// is logged and treated as empty rather than failing startup.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_interval(db_path, DEFAULT_FLUSH_INTERVAL).await
    }

    pub async fn open_with_interval(db_path: impl Into<PathBuf>, flush_interval: Duration) -> Result<Self> {
        let db_path = db_path.into();
        let cache = DashMap::new();

        match tokio::fs::read(&db_path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Resource>>(&bytes) {
                Ok(resources) => {
                    for r in resources {
                        cache.insert(r.key(), r);
                    }
                }
                Err(e) => {
                    warn!(path = %db_path.display(), error = %e, "journal file corrupt, starting empty");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "journal file unreadable, starting empty");
            }
        }

        let inner = Arc::new(Inner {
            db_path,
            cache,
            watchers: WatcherRegistry::new(),
            dirty: AtomicBool::new(false),
            shutdown: Notify::new(),
            shutdown_ack: Notify::new(),
        });

        let bg = inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(flush_interval) => {
                        if bg.dirty.swap(false, Ordering::SeqCst) {
                            let _ = flush(&bg).await;
                        }
                    }
                    _ = bg.shutdown.notified() => {
                        let _ = flush(&bg).await;
                        bg.shutdown_ack.notify_one();
                        break;
                    }
                }
            }
        });

        Ok(Self { inner })
    }
}

async fn flush(inner: &Inner) -> Result<()> {
    let snapshot: Vec<Resource> = inner.cache.iter().map(|e| e.value().clone()).collect();
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    let tmp = inner.db_path.with_extension("json.tmp");
    if let Some(parent) = inner.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &inner.db_path).await?;
    Ok(())
}

#[async_trait]
impl StateStore for JournaledStore {
    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<Resource>> {
        let key = Resource::key_for(kind, namespace, name);
        Ok(self.inner.cache.get(&key).map(|r| r.clone()))
    }

    async fn save(&self, mut resource: Resource) -> Result<Resource> {
        resource.metadata.resource_version += 1;
        let key = resource.key();
        let kind = resource.kind.as_str().to_string();
        let existed = self.inner.cache.contains_key(&key);
        self.inner.cache.insert(key.clone(), resource.clone());
        self.inner.dirty.store(true, Ordering::SeqCst);

        self.inner.watchers.notify(
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
        let removed = self.inner.cache.remove(&key);
        let existed = removed.is_some();
        if existed {
            self.inner.dirty.store(true, Ordering::SeqCst);
            self.inner.watchers.notify(
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
            .inner
            .cache
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.kind.as_str() == kind)
            .filter(|r| namespace.map(|ns| r.metadata.namespace == ns).unwrap_or(true))
            .collect())
    }

    fn watch(&self, kind: &str, handler: WatchHandler) -> WatchUnsubscribe {
        self.inner.watchers.watch(kind, move |e| handler(e))
    }

    async fn close(&self) -> Result<()> {
        self.inner.shutdown.notify_one();
        self.inner.shutdown_ack.notified().await;
        Ok(())
    }
}
