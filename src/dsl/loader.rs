// YAML -> typed Resource loading: parseContent / parseFile / scanDirectory
// / parseMastraPod.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::crd_registry::CrdRegistry;
use super::refs::{resolve_batch_refs, substitute_env};
use super::schema;
use crate::error::{Error, Result};
use crate::models::{AgentSpec, CrdSpec, Kind, LlmSpec, NetworkSpec, Resource, ToolSpec, WorkflowSpec};

/// `{kind: MastraPod, config: {...}, resources: [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastraPod {
    pub version: String,
    #[serde(default)]
    pub metadata: Option<crate::models::ObjectMeta>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub resources: Vec<Value>,
}

/// One entry of a [`MastraPod`]'s `resources` list once `file`/`directory`
/// inclusion has been expanded: either a concrete resource, or a `$ref`
/// still waiting on the rest of the pod's batch to be known.
enum PodEntry {
    Resource(Resource),
    Ref(String),
}

/// Replace every [`PodEntry::Ref`] with the resource it names, looked up
/// among the [`PodEntry::Resource`]s gathered in the same pod batch. Fails
/// with [`Error::DanglingReference`] if a reference doesn't resolve.
fn resolve_pod_entries(entries: Vec<PodEntry>) -> Result<Vec<Resource>> {
    let index: HashMap<String, Resource> = entries
        .iter()
        .filter_map(|entry| match entry {
            PodEntry::Resource(r) => Some((format!("{}/{}", r.kind.as_str(), r.metadata.name), r.clone())),
            PodEntry::Ref(_) => None,
        })
        .collect();

    entries
        .into_iter()
        .map(|entry| match entry {
            PodEntry::Resource(r) => Ok(r),
            PodEntry::Ref(reference) => index.get(&reference).cloned().ok_or(Error::DanglingReference(reference)),
        })
        .collect()
}

pub struct DslLoader {
    pub crd_registry: CrdRegistry,
}

impl DslLoader {
    pub fn new(crd_registry: CrdRegistry) -> Self {
        Self { crd_registry }
    }

    /// Parse a (possibly multi-document) YAML string into resources,
    /// substituting `env`, resolving `$ref`s within this batch, and
    /// validating each resource.
    pub fn parse_content(&self, yaml: &str, env: &HashMap<String, String>) -> Result<Vec<Resource>> {
        let mut resources = parse_documents(yaml, env)?;
        resolve_batch_refs(&mut resources)?;
        for r in &resources {
            self.validate(r)?;
        }
        Ok(resources)
    }

    pub async fn parse_file(&self, path: &Path, env: &HashMap<String, String>) -> Result<Vec<Resource>> {
        let mut stack = Vec::new();
        self.parse_file_inner(path, env, &mut stack).await
    }

    async fn parse_file_inner(
        &self,
        path: &Path,
        env: &HashMap<String, String>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Vec<Resource>> {
        let canon = canonicalize_best_effort(path);
        if stack.contains(&canon) {
            return Err(Error::CircularReference(canon.display().to_string()));
        }
        stack.push(canon.clone());

        let content = tokio::fs::read_to_string(path).await?;
        let raw_docs = parse_documents_raw(&content, env)?;

        let mut resources = Vec::new();
        for doc in raw_docs {
            if is_mastra_pod(&doc) {
                let pod: MastraPod = serde_json::from_value(doc)?;
                let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
                let entries = self.load_pod_resources(&pod, base_dir, env, stack).await?;
                resources.extend(resolve_pod_entries(entries)?);
            } else {
                resources.push(doc_to_resource(doc)?);
            }
        }

        stack.pop();
        Ok(resources)
    }

    /// Scan `dir` for manifests matching `pattern` (default `*.yaml`),
    /// parsing and batch-resolving refs/validating across the whole
    /// directory.
    pub async fn scan_directory(&self, dir: &Path, pattern: Option<&str>, env: &HashMap<String, String>) -> Result<Vec<Resource>> {
        let mut stack = Vec::new();
        let mut resources = self.scan_directory_raw(dir, pattern, env, &mut stack).await?;
        resolve_batch_refs(&mut resources)?;
        for r in &resources {
            self.validate(r)?;
        }
        Ok(resources)
    }

    async fn scan_directory_raw(
        &self,
        dir: &Path,
        pattern: Option<&str>,
        env: &HashMap<String, String>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Vec<Resource>> {
        let pattern = pattern.unwrap_or("*.yaml");
        let glob_pattern = dir.join(pattern);
        let mut resources = Vec::new();
        let paths: Vec<PathBuf> = glob::glob(&glob_pattern.to_string_lossy())
            .map_err(|e| Error::Internal(e.to_string()))?
            .filter_map(|p| p.ok())
            .collect();
        for path in paths {
            let found = self.parse_file_inner(&path, env, stack).await?;
            resources.extend(found);
        }
        Ok(resources)
    }

    /// Parse a MastraPod document at `path`, returning its free-form
    /// `config` and the fully resolved/validated resource batch.
    pub async fn parse_mastra_pod(&self, path: &Path, env: &HashMap<String, String>) -> Result<(Value, Vec<Resource>)> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut doc: Value = serde_yaml::from_str(&content)?;
        substitute_env(&mut doc, env);
        if !is_mastra_pod(&doc) {
            return Err(Error::ValidationFailed("expected kind: MastraPod".to_string()));
        }
        let pod: MastraPod = serde_json::from_value(doc.clone())?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut stack = vec![canonicalize_best_effort(path)];
        let entries = self.load_pod_resources(&pod, base_dir, env, &mut stack).await?;
        let mut resources = resolve_pod_entries(entries)?;
        resolve_batch_refs(&mut resources)?;
        for r in &resources {
            self.validate(r)?;
        }
        Ok((pod.config, resources))
    }

    /// Expand a MastraPod's `resources` list: inline resources, `{file}`,
    /// `{directory, pattern?}` are fully resolved into concrete resources
    /// here; `{$ref}` entries are left as [`PodEntry::Ref`] placeholders for
    /// [`resolve_pod_entries`] to fill in once the whole list is known (a
    /// `$ref` may point at a resource pulled in by a later `file`/`directory`
    /// entry of the same pod).
    #[allow(clippy::only_used_in_recursion)]
    fn load_pod_resources<'a>(
        &'a self,
        pod: &'a MastraPod,
        base_dir: &'a Path,
        env: &'a HashMap<String, String>,
        stack: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<PodEntry>>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = Vec::new();
            for entry in &pod.resources {
                if let Some(file) = entry.get("file").and_then(Value::as_str) {
                    let full = base_dir.join(file);
                    let found = self.parse_file_inner(&full, env, stack).await?;
                    entries.extend(found.into_iter().map(PodEntry::Resource));
                } else if let Some(directory) = entry.get("directory").and_then(Value::as_str) {
                    let pattern = entry.get("pattern").and_then(Value::as_str);
                    let full = base_dir.join(directory);
                    let found = self.scan_directory_raw(&full, pattern, env, stack).await?;
                    entries.extend(found.into_iter().map(PodEntry::Resource));
                } else if let Some(reference) = entry.get("$ref").and_then(Value::as_str) {
                    entries.push(PodEntry::Ref(reference.to_string()));
                } else {
                    entries.push(PodEntry::Resource(doc_to_resource(entry.clone())?));
                }
            }
            Ok(entries)
        })
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        match resource.kind.as_str() {
            "Tool" => deserialize_or_fail::<ToolSpec>(&resource.spec),
            "Agent" => deserialize_or_fail::<AgentSpec>(&resource.spec),
            "Workflow" => deserialize_or_fail::<WorkflowSpec>(&resource.spec),
            "Network" => deserialize_or_fail::<NetworkSpec>(&resource.spec),
            "Llm" => deserialize_or_fail::<LlmSpec>(&resource.spec),
            "CustomResourceDefinition" => deserialize_or_fail::<CrdSpec>(&resource.spec),
            other => {
                let (group, _) = resource.api_version.split_once('/').unwrap_or((&resource.api_version, ""));
                match self.crd_registry.lookup(group, other) {
                    Some(compiled) => {
                        if compiled.scope == crate::models::Scope::Cluster
                            && resource.metadata.namespace != "default"
                        {
                            return Err(Error::ValidationFailed(format!(
                                "{other} is cluster-scoped and must omit metadata.namespace"
                            )));
                        }
                        let errors = schema::validate(&compiled.schema, &resource.spec);
                        if errors.is_empty() {
                            Ok(())
                        } else {
                            Err(Error::ValidationFailed(errors.join("; ")))
                        }
                    }
                    None => Err(Error::UnknownKind(other.to_string())),
                }
            }
        }
    }
}

fn deserialize_or_fail<T: serde::de::DeserializeOwned>(spec: &Value) -> Result<()> {
    serde_json::from_value::<T>(spec.clone())
        .map(|_| ())
        .map_err(|e| Error::ValidationFailed(e.to_string()))
}

fn is_mastra_pod(doc: &Value) -> bool {
    doc.get("kind").and_then(Value::as_str) == Some("MastraPod")
}

fn parse_documents(yaml: &str, env: &HashMap<String, String>) -> Result<Vec<Resource>> {
    parse_documents_raw(yaml, env)?
        .into_iter()
        .map(doc_to_resource)
        .collect()
}

fn parse_documents_raw(yaml: &str, env: &HashMap<String, String>) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for doc_str in split_yaml_documents(yaml) {
        if doc_str.trim().is_empty() {
            continue;
        }
        let mut value: Value = serde_yaml::from_str(&doc_str)?;
        substitute_env(&mut value, env);
        docs.push(value);
    }
    Ok(docs)
}

fn split_yaml_documents(yaml: &str) -> Vec<String> {
    yaml.split("\n---\n")
        .flat_map(|s| if let Some(rest) = s.strip_prefix("---\n") { vec![rest.to_string()] } else { vec![s.to_string()] })
        .collect()
}

fn doc_to_resource(doc: Value) -> Result<Resource> {
    let kind = doc
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ValidationFailed("missing kind".to_string()))?
        .to_string();
    let api_version = doc
        .get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or("mastra/v1")
        .to_string();
    let metadata: crate::models::ObjectMeta = doc
        .get("metadata")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .ok_or_else(|| Error::ValidationFailed("missing metadata".to_string()))?;
    let spec = doc.get("spec").cloned().unwrap_or(Value::Object(Default::default()));
    let status = doc
        .get("status")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?;

    Ok(Resource {
        api_version,
        kind: Kind::from_str(&kind),
        metadata,
        spec,
        status,
    })
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_document() {
        let loader = DslLoader::new(CrdRegistry::new());
        let yaml = r#"
apiVersion: mastra/v1
kind: Tool
metadata:
  name: calculator
spec:
  id: calculator
  execute:
    ref: builtin.calculator
"#;
        let resources = loader.parse_content(yaml, &HashMap::new()).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind.as_str(), "Tool");
    }

    #[test]
    fn unregistered_custom_kind_fails_unknown_kind() {
        let loader = DslLoader::new(CrdRegistry::new());
        let yaml = r#"
apiVersion: data.example.com/v1
kind: DataSource
metadata:
  name: x
spec:
  url: https://example.com
"#;
        let err = loader.parse_content(yaml, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownKind(_)));
    }

    #[test]
    fn registered_crd_validates_required_field() {
        let registry = CrdRegistry::new();
        let crd = CrdSpec {
            group: "data.example.com".into(),
            names: crate::models::CrdNames {
                kind: "DataSource".into(),
                plural: "datasources".into(),
                singular: None,
            },
            scope: crate::models::Scope::Namespaced,
            validation: crate::models::Validation {
                open_api_v3_schema: serde_json::json!({
                    "type": "object",
                    "required": ["url"],
                    "properties": { "url": { "type": "string" } }
                }),
            },
        };
        registry.register(&crd);
        let loader = DslLoader::new(registry);

        let missing_url = r#"
apiVersion: data.example.com/v1
kind: DataSource
metadata:
  name: x
spec: {}
"#;
        assert!(matches!(
            loader.parse_content(missing_url, &HashMap::new()).unwrap_err(),
            Error::ValidationFailed(_)
        ));

        let ok = r#"
apiVersion: data.example.com/v1
kind: DataSource
metadata:
  name: x
spec:
  url: https://example.com
"#;
        assert!(loader.parse_content(ok, &HashMap::new()).is_ok());
    }

    #[tokio::test]
    async fn pod_ref_entry_resolves_to_sibling_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tool.yaml"),
            r#"
apiVersion: mastra/v1
kind: Tool
metadata:
  name: calculator
spec:
  id: calculator
  execute:
    ref: builtin.calculator
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("pod.yaml"),
            r#"
version: "1"
kind: MastraPod
resources:
  - file: tool.yaml
  - $ref: Tool/calculator
"#,
        )
        .unwrap();

        let loader = DslLoader::new(CrdRegistry::new());
        let (_config, resources) = loader
            .parse_mastra_pod(&dir.path().join("pod.yaml"), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(resources.len(), 2);
        assert!(resources.iter().all(|r| r.kind.as_str() == "Tool" && r.metadata.name == "calculator"));
    }

    #[tokio::test]
    async fn pod_ref_entry_to_missing_resource_is_dangling_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pod.yaml"),
            r#"
version: "1"
kind: MastraPod
resources:
  - $ref: Tool/nonexistent
"#,
        )
        .unwrap();

        let loader = DslLoader::new(CrdRegistry::new());
        let err = loader
            .parse_mastra_pod(&dir.path().join("pod.yaml"), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DanglingReference(_)));
    }

    #[test]
    fn multi_document_yaml_splits_on_separator() {
        let loader = DslLoader::new(CrdRegistry::new());
        let yaml = r#"
apiVersion: mastra/v1
kind: Tool
metadata:
  name: a
spec:
  id: a
  execute: { ref: x }
---
apiVersion: mastra/v1
kind: Tool
metadata:
  name: b
spec:
  id: b
  execute: { ref: y }
"#;
        let resources = loader.parse_content(yaml, &HashMap::new()).unwrap();
        assert_eq!(resources.len(), 2);
    }
}
