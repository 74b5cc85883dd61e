//! Process wiring: logging, definition loading and executor assembly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::ValueEnum;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use engine::{
    validate_definition, BranchTargetPolicy, DefinitionSource, ExecutionStore, ExecutorConfig,
    StatsSink, TriggerDispatcher, WorkflowDefinition, WorkflowExecutor,
};
use steps::dry_run::DryRunBackend;
use steps::StepRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub fn executor_config(max_wait_secs: u64, branch_target_policy: BranchTargetPolicy) -> ExecutorConfig {
    ExecutorConfig {
        max_wait: Duration::from_secs(max_wait_secs),
        branch_target_policy,
        ..ExecutorConfig::default()
    }
}

/// Dispatcher over the built-in handlers, all backed by the dry-run
/// collaborators.
pub fn build_dispatcher<S>(store: Arc<S>, config: ExecutorConfig) -> TriggerDispatcher
where
    S: ExecutionStore + StatsSink + DefinitionSource + 'static,
{
    let backend = Arc::new(DryRunBackend::new());
    let registry = StepRegistry::with_builtins(
        backend.clone(),
        backend.clone(),
        backend,
        config.max_wait,
    );
    debug!(?registry, "step registry ready");

    let executor = Arc::new(WorkflowExecutor::new(registry, store.clone(), store.clone(), config));
    TriggerDispatcher::new(executor, store)
}

/// Parse and validate one definition file.
pub fn load_definition(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let definition: WorkflowDefinition = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid workflow definition", path.display()))?;
    validate_definition(&definition)
        .with_context(|| format!("{} failed validation", path.display()))?;
    Ok(definition)
}

/// Load a single file, or every `*.json` file in a directory (sorted by name).
pub fn load_definitions(path: &Path) -> anyhow::Result<Vec<WorkflowDefinition>> {
    if path.is_file() {
        return Ok(vec![load_definition(path)?]);
    }
    if !path.is_dir() {
        bail!("{} is neither a file nor a directory", path.display());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path).with_context(|| format!("cannot list {}", path.display()))? {
        let file = entry?.path();
        if file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();

    let definitions = files
        .iter()
        .map(|file| load_definition(file))
        .collect::<anyhow::Result<Vec<_>>>()?;
    info!(count = definitions.len(), dir = %path.display(), "loaded workflow definitions");
    Ok(definitions)
}
