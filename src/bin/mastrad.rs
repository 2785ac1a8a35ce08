// Demo binary: load a MastraPod manifest, apply every resource it
// contains, run the first Workflow it finds, and print the result as JSON.
// Not a CLI — argument parsing, multi-command dispatch, and anything else
// a real operator tool would need are explicitly out of scope here.

use std::env;
use std::fs;
use std::sync::Arc;

use mastra_rt::dsl::DslLoader;
use mastra_rt::models::Kind;
use mastra_rt::runtime::RuntimeManager;
use mastra_rt::scheduler::SchedulerConfig;
use mastra_rt::store::MemoryStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let path = env::args().nth(1).unwrap_or_else(|| "pod.yaml".to_string());
    let yaml = fs::read_to_string(&path).unwrap_or_else(|e| {
        eprintln!("failed to read {path}: {e}");
        std::process::exit(1);
    });

    let runtime = RuntimeManager::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
    let loader = DslLoader::new(runtime.crd_registry().clone());
    let env_vars: std::collections::HashMap<String, String> = env::vars().collect();

    let resources = match loader.parse_content(&yaml, &env_vars) {
        Ok(resources) => resources,
        Err(e) => {
            eprintln!("failed to parse {path}: {e}");
            std::process::exit(1);
        }
    };

    let mut first_workflow = None;
    for resource in resources {
        let kind = resource.kind.clone();
        let key = resource.key();
        match runtime.add_resource(resource).await {
            Ok(applied) => {
                tracing::info!(%key, phase = ?applied.status.as_ref().map(|s| s.phase), "applied");
                if kind == Kind::Workflow && first_workflow.is_none() {
                    first_workflow = Some((applied.metadata.namespace.clone(), applied.metadata.name.clone()));
                }
            }
            Err(e) => eprintln!("failed to reconcile {key}: {e}"),
        }
    }

    if let Some((namespace, name)) = first_workflow {
        match runtime.run_workflow(&namespace, &name, serde_json::json!({})).await {
            Ok(result) => println!("{}", serde_json::to_string_pretty(&result).unwrap()),
            Err(e) => eprintln!("workflow run failed: {e}"),
        }
    }

    if let Err(e) = runtime.shutdown().await {
        eprintln!("shutdown error: {e}");
    }
}
