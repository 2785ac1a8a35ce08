// File-backed state store: one JSON file per resource under
// `<root>/<kindLower>/<namespace>/<name>.json`, written atomically via
// write-temp + rename.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{WatchEvent, WatchEventKind, WatchHandler, WatchUnsubscribe, WatcherRegistry};
use crate::error::{Error, Result};
use crate::models::Resource;
use crate::store::StateStore;

pub struct FileStore {
    root: PathBuf,
    watchers: WatcherRegistry,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            watchers: WatcherRegistry::new(),
        }
    }

    fn path_for(&self, kind: &str, namespace: &str, name: &str) -> PathBuf {
        self.root
            .join(kind.to_lowercase())
            .join(namespace)
            .join(format!("{name}.json"))
    }

    fn dir_for(&self, kind: &str, namespace: Option<&str>) -> PathBuf {
        match namespace {
            Some(ns) => self.root.join(kind.to_lowercase()).join(ns),
            None => self.root.join(kind.to_lowercase()),
        }
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<Resource>> {
        let path = self.path_for(kind, namespace, name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn save(&self, mut resource: Resource) -> Result<Resource> {
        resource.metadata.resource_version += 1;
        let kind = resource.kind.as_str().to_string();
        let path = self.path_for(&kind, &resource.metadata.namespace, &resource.metadata.name);
        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        let bytes = serde_json::to_vec_pretty(&resource)?;
        Self::write_atomic(&path, &bytes).await?;

        self.watchers.notify(
            &kind,
            WatchEvent {
                kind: if existed {
                    WatchEventKind::Modified
                } else {
                    WatchEventKind::Added
                },
                key: resource.key(),
                resource: Some(resource.clone()),
            },
        );
        Ok(resource)
    }

    async fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<bool> {
        let path = self.path_for(kind, namespace, name);
        let previous = self.get(kind, namespace, name).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.watchers.notify(
                    kind,
                    WatchEvent {
                        kind: WatchEventKind::Deleted,
                        key: Resource::key_for(kind, namespace, name),
                        resource: previous,
                    },
                );
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Resource>> {
        let dir = self.dir_for(kind, namespace);
        let mut out = Vec::new();
        collect_json_files(&dir, &mut out).await?;
        let mut resources = Vec::with_capacity(out.len());
        for path in out {
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(r) = serde_json::from_slice::<Resource>(&bytes) {
                    resources.push(r);
                }
            }
        }
        Ok(resources)
    }

    fn watch(&self, kind: &str, handler: WatchHandler) -> WatchUnsubscribe {
        self.watchers.watch(kind, move |e| handler(e))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Recursively collect `*.json` files under `dir` (namespaces are one level
/// deep, but we don't assume that to stay robust to a missing-namespace
/// listing).
fn collect_json_files<'a>(
    dir: &'a Path,
    out: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                collect_json_files(&path, out).await?;
            } else if path.extension().map(|e| e == "json").unwrap_or(false) {
                out.push(path);
            }
        }
        Ok(())
    })
}
